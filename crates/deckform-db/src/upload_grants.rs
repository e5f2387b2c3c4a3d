use chrono::{DateTime, Utc};
use deckform_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for upload grants - the short-lived handle issued by
/// RequestUpload and consumed by the confirm endpoint.
#[derive(Clone)]
pub struct UploadGrantRepository {
    pool: PgPool,
}

impl UploadGrantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        storage_key: &str,
        filename: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO upload_grants (storage_key, tenant_id, user_id, filename, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(storage_key)
        .bind(tenant_id)
        .bind(user_id)
        .bind(filename)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a grant by key alone. Used by the byte-sink endpoint, where the
    /// caller authenticates with the signed upload token rather than a tenant
    /// context; the returned row carries the owning tenant.
    pub async fn get(&self, storage_key: &str) -> Result<Option<UploadGrant>, AppError> {
        let grant = sqlx::query_as::<_, UploadGrant>(
            r#"
            SELECT storage_key, tenant_id, user_id, filename, expires_at, created_at
            FROM upload_grants
            WHERE storage_key = $1
            "#,
        )
        .bind(storage_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(grant)
    }

    /// Remove expired grants that were never confirmed. Confirmed keys live on
    /// as upload_jobs rows, so grants are pure scratch state.
    pub async fn delete_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM upload_grants
            WHERE expires_at < NOW()
              AND storage_key NOT IN (SELECT storage_key FROM upload_jobs)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Upload grant record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UploadGrant {
    pub storage_key: String,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UploadGrant {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
