use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A content item extracted from an upload job, ordered by a stable sequence
/// number within the job. `analysis` stays null until the analysis function
/// has run for this slide.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Slide {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub upload_job_id: Uuid,
    pub position: i32,
    pub heading: String,
    pub body: String,
    /// Opaque storage key of the derived text artifact.
    pub artifact_key: Option<String>,
    pub analysis: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
