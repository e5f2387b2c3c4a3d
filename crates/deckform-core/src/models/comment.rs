use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment on an assembly, optionally attached to a specific slide.
/// Immutable once created, except for deletion by its author or a tenant admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub assembly_id: Uuid,
    pub slide_id: Option<Uuid>,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
