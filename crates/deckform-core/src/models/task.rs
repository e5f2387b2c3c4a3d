use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of asynchronous operation a task tracks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    IngestDeck,
    AnalyzeSlides,
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskKind::IngestDeck => write!(f, "ingest_deck"),
            TaskKind::AnalyzeSlides => write!(f, "analyze_slides"),
        }
    }
}

impl FromStr for TaskKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest_deck" => Ok(TaskKind::IngestDeck),
            "analyze_slides" => Ok(TaskKind::AnalyzeSlides),
            _ => Err(anyhow::anyhow!("Invalid task kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal tasks accept no further updates (idempotent terminal-write).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// The externally observable handle for an asynchronous operation.
///
/// This registry row is the single source of truth polled or pushed to
/// clients; queue and worker internals are never exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Progress fraction in [0, 1].
    pub progress: f64,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    /// Cooperative cancellation flag; workers check it between slides.
    pub cancel_requested: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Task {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Task {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            user_id: row.get("user_id"),
            kind: row
                .get::<String, _>("kind")
                .parse()
                .map_err(|e| sqlx::Error::Decode(format!("Failed to parse kind: {}", e).into()))?,
            status: row
                .get::<String, _>("status")
                .parse()
                .map_err(|e| sqlx::Error::Decode(format!("Failed to parse status: {}", e).into()))?,
            progress: row.get("progress"),
            message: row.get("message"),
            result: row.get("result"),
            error_message: row.get("error_message"),
            cancel_requested: row.get("cancel_requested"),
            started_at: row.get("started_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

/// Response model for task endpoints.
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: f64,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            kind: task.kind,
            status: task.status,
            progress: task.progress,
            message: task.message,
            result: task.result,
            error_message: task.error_message,
            cancel_requested: task.cancel_requested,
            started_at: task.started_at,
            finished_at: task.finished_at,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Aggregated task counts for a tenant.
#[derive(Debug, Serialize)]
pub struct TaskStats {
    pub total: i64,
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Filters for listing tasks.
#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub kind: Option<TaskKind>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Default for TaskListQuery {
    fn default() -> Self {
        Self {
            status: None,
            kind: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_and_parse() {
        assert_eq!(TaskKind::IngestDeck.to_string(), "ingest_deck");
        assert_eq!(
            "ingest_deck".parse::<TaskKind>().unwrap(),
            TaskKind::IngestDeck
        );
        assert_eq!(
            "analyze_slides".parse::<TaskKind>().unwrap(),
            TaskKind::AnalyzeSlides
        );
        assert!("transcode".parse::<TaskKind>().is_err());
    }

    #[test]
    fn status_display_and_parse() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn task_list_query_default() {
        let query = TaskListQuery::default();
        assert_eq!(query.status, None);
        assert_eq!(query.kind, None);
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset, Some(0));
    }
}
