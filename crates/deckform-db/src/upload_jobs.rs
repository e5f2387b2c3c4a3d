use chrono::{DateTime, Utc};
use deckform_core::models::{Task, TaskKind, UploadJob};
use deckform_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::transaction::TransactionGuard;

/// Channel name for PostgreSQL NOTIFY when a new upload job is confirmed.
pub const UPLOAD_NOTIFY_CHANNEL: &str = "deckform_new_upload";

/// Result of a confirm call: the job plus whether this call created it.
/// A duplicate confirm resolves to the already-existing job (idempotent).
#[derive(Debug)]
pub struct ConfirmOutcome {
    pub job: UploadJob,
    pub created: bool,
}

/// Repository for upload jobs. The `upload_jobs` table doubles as the durable
/// ingestion queue: confirm inserts a `pending` row, workers claim the oldest
/// pending row with an atomic status CAS.
#[derive(Clone)]
pub struct UploadJobRepository {
    pool: PgPool,
}

impl UploadJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the upload job and its task handle in one transaction, then
    /// notify the worker pool. Write-then-wake ordering: the row is durably
    /// committed before any notification, so a crash in between only delays
    /// processing.
    ///
    /// Duplicate confirms for the same storage key roll back and return the
    /// existing job (unique constraint on storage_key).
    pub async fn confirm(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        storage_key: &str,
        filename: &str,
    ) -> Result<ConfirmOutcome, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool)
            .await
            .map_err(|e| AppError::InternalWithSource {
                message: "Failed to begin confirm transaction".to_string(),
                source: e,
            })?;

        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (tenant_id, user_id, kind, status)
            VALUES ($1, $2, $3, 'queued')
            RETURNING id, tenant_id, user_id, kind, status, progress, message, result,
                      error_message, cancel_requested, started_at, finished_at,
                      created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(TaskKind::IngestDeck.to_string())
        .fetch_one(&mut **tx)
        .await?;

        let inserted = sqlx::query_as::<_, UploadJob>(
            r#"
            INSERT INTO upload_jobs (tenant_id, user_id, storage_key, filename, status, task_id)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            ON CONFLICT (storage_key) DO NOTHING
            RETURNING id, tenant_id, user_id, storage_key, filename, status, slide_count,
                      error_message, task_id, claimed_at, created_at, updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(storage_key)
        .bind(filename)
        .bind(task.id)
        .fetch_optional(&mut **tx)
        .await?;

        match inserted {
            Some(job) => {
                tx.commit().await.map_err(|e| AppError::InternalWithSource {
                    message: "Failed to commit confirm transaction".to_string(),
                    source: e,
                })?;
                self.notify_new_upload(job.id).await;
                Ok(ConfirmOutcome { job, created: true })
            }
            None => {
                // Duplicate confirm: drop the orphan task insert with the
                // transaction and hand back the original job.
                tx.rollback()
                    .await
                    .map_err(|e| AppError::InternalWithSource {
                        message: "Failed to roll back duplicate confirm".to_string(),
                        source: e,
                    })?;

                let existing = self
                    .find_by_storage_key(tenant_id, storage_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Conflict(format!(
                            "Storage key {} is already confirmed by another tenant",
                            storage_key
                        ))
                    })?;

                Ok(ConfirmOutcome {
                    job: existing,
                    created: false,
                })
            }
        }
    }

    /// Wake the worker pool. Best effort: the poll loop covers lost notifies.
    async fn notify_new_upload(&self, job_id: Uuid) {
        let result = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(UPLOAD_NOTIFY_CHANNEL)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, job_id = %job_id, "Failed to notify worker pool");
        }
    }

    /// Claim the oldest pending job: the atomic `pending -> processing`
    /// transition that guarantees at most one processor per job. SKIP LOCKED
    /// keeps concurrent workers from blocking on each other.
    pub async fn claim_next(&self) -> Result<Option<UploadJob>, AppError> {
        let job = sqlx::query_as::<_, UploadJob>(
            r#"
            WITH next AS (
                SELECT id FROM upload_jobs
                WHERE status = 'pending'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE upload_jobs j
            SET status = 'processing', claimed_at = NOW(), updated_at = NOW()
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.tenant_id, j.user_id, j.storage_key, j.filename, j.status,
                      j.slide_count, j.error_message, j.task_id, j.claimed_at,
                      j.created_at, j.updated_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Liveness signal while a worker holds the claim; the reconciler treats a
    /// stale `updated_at` on a processing job as a dead worker.
    pub async fn touch(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE upload_jobs SET updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn complete(&self, job_id: Uuid, slide_count: i32) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'completed', slide_count = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id)
        .bind(slide_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail(&self, job_id: Uuid, reason: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, tenant_id: Uuid, job_id: Uuid) -> Result<Option<UploadJob>, AppError> {
        let job = sqlx::query_as::<_, UploadJob>(
            r#"
            SELECT id, tenant_id, user_id, storage_key, filename, status, slide_count,
                   error_message, task_id, claimed_at, created_at, updated_at
            FROM upload_jobs
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(job_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    pub async fn find_by_storage_key(
        &self,
        tenant_id: Uuid,
        storage_key: &str,
    ) -> Result<Option<UploadJob>, AppError> {
        let job = sqlx::query_as::<_, UploadJob>(
            r#"
            SELECT id, tenant_id, user_id, storage_key, filename, status, slide_count,
                   error_message, task_id, claimed_at, created_at, updated_at
            FROM upload_jobs
            WHERE storage_key = $1 AND tenant_id = $2
            "#,
        )
        .bind(storage_key)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Force-fail processing jobs with no liveness signal for longer than the
    /// ceiling. Returns the reaped jobs so the caller can fail their tasks and
    /// publish terminal progress events.
    pub async fn reap_stale(
        &self,
        ceiling_secs: i64,
    ) -> Result<Vec<UploadJob>, AppError> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::seconds(ceiling_secs);

        let reaped = sqlx::query_as::<_, UploadJob>(
            r#"
            UPDATE upload_jobs
            SET status = 'failed',
                error_message = 'worker presumed dead (no progress before ceiling)',
                updated_at = NOW()
            WHERE status = 'processing' AND updated_at < $1
            RETURNING id, tenant_id, user_id, storage_key, filename, status, slide_count,
                      error_message, task_id, claimed_at, created_at, updated_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(reaped)
    }

    /// Pending jobs older than the confirm-to-claim timeout; the reconciler
    /// re-announces them in case the original NOTIFY was lost.
    pub async fn stuck_pending(&self, older_than_secs: i64) -> Result<Vec<Uuid>, AppError> {
        let cutoff: DateTime<Utc> = Utc::now() - chrono::Duration::seconds(older_than_secs);

        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM upload_jobs
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Re-announce a pending job to the pool.
    pub async fn renotify(&self, job_id: Uuid) -> Result<(), AppError> {
        self.notify_new_upload(job_id).await;
        Ok(())
    }
}
