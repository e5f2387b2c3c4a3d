use deckform_core::models::{
    Assembly, AssemblyMember, AssemblySnapshot, Comment, MemberRole,
};
use deckform_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::transaction::TransactionGuard;

const ASSEMBLY_COLUMNS: &str = "id, tenant_id, title, created_by, created_at, updated_at";

/// Repository for assemblies: the ordered item list, membership grants, and
/// comments. Order rewrites are transactional so the gap-free invariant holds
/// at every commit point.
#[derive(Clone)]
pub struct AssemblyRepository {
    pool: PgPool,
}

impl AssemblyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an assembly; the creator becomes its first `edit` member.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        created_by: Uuid,
        title: &str,
    ) -> Result<Assembly, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool)
            .await
            .map_err(|e| AppError::InternalWithSource {
                message: "Failed to begin create-assembly transaction".to_string(),
                source: e,
            })?;

        let assembly = sqlx::query_as::<_, Assembly>(&format!(
            r#"
            INSERT INTO assemblies (tenant_id, title, created_by)
            VALUES ($1, $2, $3)
            RETURNING {ASSEMBLY_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(title)
        .bind(created_by)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO assembly_members (assembly_id, tenant_id, user_id, role)
            VALUES ($1, $2, $3, 'edit')
            "#,
        )
        .bind(assembly.id)
        .bind(tenant_id)
        .bind(created_by)
        .execute(&mut **tx)
        .await?;

        tx.commit().await.map_err(|e| AppError::InternalWithSource {
            message: "Failed to commit create-assembly transaction".to_string(),
            source: e,
        })?;

        Ok(assembly)
    }

    pub async fn get(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
    ) -> Result<Option<Assembly>, AppError> {
        let assembly = sqlx::query_as::<_, Assembly>(&format!(
            r#"
            SELECT {ASSEMBLY_COLUMNS}
            FROM assemblies
            WHERE id = $1 AND tenant_id = $2
            "#
        ))
        .bind(assembly_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(assembly)
    }

    /// Full current state: order, members, comments. The pull-side complement
    /// of the push channel; clients resynchronize through this after missing
    /// events.
    pub async fn snapshot(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
    ) -> Result<Option<AssemblySnapshot>, AppError> {
        let Some(assembly) = self.get(tenant_id, assembly_id).await? else {
            return Ok(None);
        };

        let order = self.load_order(tenant_id, assembly_id).await?;

        let members = sqlx::query_as::<_, AssemblyMember>(
            r#"
            SELECT assembly_id, tenant_id, user_id, role, created_at
            FROM assembly_members
            WHERE assembly_id = $1 AND tenant_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(assembly_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, tenant_id, assembly_id, slide_id, author_id, body, created_at
            FROM comments
            WHERE assembly_id = $1 AND tenant_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(assembly_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(AssemblySnapshot {
            assembly,
            order,
            members,
            comments,
        }))
    }

    pub async fn member_role(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<MemberRole>, AppError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT role FROM assembly_members
            WHERE assembly_id = $1 AND tenant_id = $2 AND user_id = $3
            "#,
        )
        .bind(assembly_id)
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((role,)) => Ok(Some(role.parse().map_err(|e: anyhow::Error| {
                AppError::Internal(format!("Invalid role in database: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    pub async fn upsert_member(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO assembly_members (assembly_id, tenant_id, user_id, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (assembly_id, user_id)
            DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(assembly_id)
        .bind(tenant_id)
        .bind(user_id)
        .bind(role.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_order(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT slide_id FROM assembly_items
            WHERE assembly_id = $1 AND tenant_id = $2
            ORDER BY position
            "#,
        )
        .bind(assembly_id)
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Atomically replace the assembly's order with positions `0..n-1`.
    /// Delete-then-insert inside one transaction keeps the unique position
    /// constraint satisfied at commit.
    pub async fn store_order(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
        order: &[Uuid],
    ) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool)
            .await
            .map_err(|e| AppError::InternalWithSource {
                message: "Failed to begin order rewrite".to_string(),
                source: e,
            })?;

        sqlx::query("DELETE FROM assembly_items WHERE assembly_id = $1 AND tenant_id = $2")
            .bind(assembly_id)
            .bind(tenant_id)
            .execute(&mut **tx)
            .await?;

        for (position, slide_id) in order.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO assembly_items (assembly_id, tenant_id, slide_id, position)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(assembly_id)
            .bind(tenant_id)
            .bind(slide_id)
            .bind(position as i32)
            .execute(&mut **tx)
            .await?;
        }

        sqlx::query("UPDATE assemblies SET updated_at = NOW() WHERE id = $1 AND tenant_id = $2")
            .bind(assembly_id)
            .bind(tenant_id)
            .execute(&mut **tx)
            .await?;

        tx.commit().await.map_err(|e| AppError::InternalWithSource {
            message: "Failed to commit order rewrite".to_string(),
            source: e,
        })?;

        Ok(())
    }

    pub async fn add_comment(
        &self,
        tenant_id: Uuid,
        assembly_id: Uuid,
        slide_id: Option<Uuid>,
        author_id: Uuid,
        body: &str,
    ) -> Result<Comment, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (tenant_id, assembly_id, slide_id, author_id, body)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tenant_id, assembly_id, slide_id, author_id, body, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(assembly_id)
        .bind(slide_id)
        .bind(author_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        Ok(comment)
    }

    pub async fn get_comment(
        &self,
        tenant_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, tenant_id, assembly_id, slide_id, author_id, body, created_at
            FROM comments
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(comment_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        tenant_id: Uuid,
        comment_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1 AND tenant_id = $2")
            .bind(comment_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
