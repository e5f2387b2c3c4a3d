use deckform_core::models::Slide;
use deckform_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for slides - the content items extracted from an upload job.
#[derive(Clone)]
pub struct SlideRepository {
    pool: PgPool,
}

impl SlideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one extracted slide at its stable position within the job.
    pub async fn insert(
        &self,
        tenant_id: Uuid,
        upload_job_id: Uuid,
        position: i32,
        heading: &str,
        body: &str,
        artifact_key: Option<&str>,
    ) -> Result<Slide, AppError> {
        let slide = sqlx::query_as::<_, Slide>(
            r#"
            INSERT INTO slides (tenant_id, upload_job_id, position, heading, body, artifact_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tenant_id, upload_job_id, position, heading, body,
                      artifact_key, analysis, created_at
            "#,
        )
        .bind(tenant_id)
        .bind(upload_job_id)
        .bind(position)
        .bind(heading)
        .bind(body)
        .bind(artifact_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(slide)
    }

    /// Attach the analysis result produced by the analysis function.
    pub async fn set_analysis(
        &self,
        tenant_id: Uuid,
        slide_id: Uuid,
        analysis: serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE slides
            SET analysis = $3
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(slide_id)
        .bind(tenant_id)
        .bind(analysis)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_job(
        &self,
        tenant_id: Uuid,
        upload_job_id: Uuid,
    ) -> Result<Vec<Slide>, AppError> {
        let slides = sqlx::query_as::<_, Slide>(
            r#"
            SELECT id, tenant_id, upload_job_id, position, heading, body,
                   artifact_key, analysis, created_at
            FROM slides
            WHERE tenant_id = $1 AND upload_job_id = $2
            ORDER BY position
            "#,
        )
        .bind(tenant_id)
        .bind(upload_job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(slides)
    }

    /// Number of the given slide ids that exist within this tenant. Used to
    /// validate insert-item mutations before they reach the order.
    pub async fn count_existing(
        &self,
        tenant_id: Uuid,
        slide_ids: &[Uuid],
    ) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM slides
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(tenant_id)
        .bind(slide_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}
