use deckform_core::models::{Tenant, TenantStatus};
use deckform_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for tenant rows - the isolation boundary everything else hangs
/// off. Lookups here gate every request before it touches tenant data.
#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<Tenant, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name)
            VALUES ($1)
            RETURNING id, name, status, created_at, updated_at
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant)
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, status, created_at, updated_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Load a tenant and require it to be active; the standard request gate.
    pub async fn get_active(&self, tenant_id: Uuid) -> Result<Tenant, AppError> {
        let tenant = self
            .get(tenant_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Unknown tenant".to_string()))?;

        if !tenant.is_active() {
            return Err(AppError::Forbidden(format!(
                "Tenant is {}",
                tenant.status
            )));
        }

        Ok(tenant)
    }

    pub async fn set_status(
        &self,
        tenant_id: Uuid,
        status: TenantStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
