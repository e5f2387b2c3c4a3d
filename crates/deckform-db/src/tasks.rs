use deckform_core::models::{Task, TaskKind, TaskListQuery, TaskStats};
use deckform_core::AppError;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, tenant_id, user_id, kind, status, progress, message, result, \
                            error_message, cancel_requested, started_at, finished_at, \
                            created_at, updated_at";

/// Repository for the task registry - the single source of truth polled or
/// pushed to clients for every asynchronous operation.
///
/// Terminal transitions are enforced with guarded UPDATEs: a task that has
/// reached `completed` or `failed` matches no further writes, so late updates
/// from a presumed-dead worker degrade to logged no-ops.
#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, tenant_id: Uuid, task_id: Uuid) -> Result<Option<Task>, AppError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE id = $1 AND tenant_id = $2
            "#
        ))
        .bind(task_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        query: TaskListQuery,
    ) -> Result<Vec<Task>, AppError> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE tenant_id = "
        ));
        builder.push_bind(tenant_id);

        if let Some(status) = query.status {
            builder.push(" AND status = ");
            builder.push_bind(status.to_string());
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind.to_string());
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(query.limit.unwrap_or(50).clamp(1, 500));
        builder.push(" OFFSET ");
        builder.push_bind(query.offset.unwrap_or(0).max(0));

        let tasks = builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await?;

        Ok(tasks)
    }

    pub async fn stats(&self, tenant_id: Uuid) -> Result<TaskStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                   COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM tasks
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskStats {
            total: row.get("total"),
            queued: row.get("queued"),
            processing: row.get("processing"),
            completed: row.get("completed"),
            failed: row.get("failed"),
        })
    }

    /// Transition `queued -> processing` when a worker picks the task up.
    pub async fn mark_started(&self, tenant_id: Uuid, task_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'processing', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status = 'queued'
            "#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Incremental progress write. Returns false (and the caller logs) when
    /// the task is already terminal - terminal states never change again.
    pub async fn update_progress(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        progress: f64,
        message: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET progress = $3, message = $4, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .bind(progress.clamp(0.0, 1.0))
        .bind(message)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if !updated {
            tracing::warn!(
                task_id = %task_id,
                "Ignoring progress update for terminal task"
            );
        }
        Ok(updated)
    }

    /// The single allowed success transition; a compare-and-set on status.
    /// Idempotent: completing an already-terminal task is a no-op.
    pub async fn complete(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        result: serde_json::Value,
    ) -> Result<bool, AppError> {
        let outcome = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'completed', progress = 1.0, result = $3,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .bind(result)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    /// The single allowed failure transition; same CAS guard as `complete`.
    pub async fn fail(
        &self,
        tenant_id: Uuid,
        task_id: Uuid,
        reason: &str,
    ) -> Result<bool, AppError> {
        let outcome = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'failed', error_message = $3, message = $3,
                finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() > 0)
    }

    /// Flag a non-terminal task for cooperative cancellation. The worker
    /// checks the flag between slides; cancellation is not preemptive.
    pub async fn request_cancel(&self, tenant_id: Uuid, task_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET cancel_requested = TRUE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND status IN ('queued', 'processing')
            "#,
        )
        .bind(task_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Fresh read of the cancellation flag, polled by workers between slides.
    pub async fn cancel_requested(&self, task_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancel_requested FROM tasks WHERE id = $1")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(flag,)| flag).unwrap_or(false))
    }
}
