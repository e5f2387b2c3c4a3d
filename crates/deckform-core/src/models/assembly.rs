use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::comment::Comment;
use crate::order::OrderOp;

/// A shared, ordered, collaboratively edited list of slide references.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assembly {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub title: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission level on an assembly. Only `edit` members may mutate order,
/// membership, or comments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    View,
    Edit,
}

impl MemberRole {
    pub fn can_edit(&self) -> bool {
        matches!(self, MemberRole::Edit)
    }
}

impl Display for MemberRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MemberRole::View => write!(f, "view"),
            MemberRole::Edit => write!(f, "edit"),
        }
    }
}

impl FromStr for MemberRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(MemberRole::View),
            "edit" => Ok(MemberRole::Edit),
            _ => Err(anyhow::anyhow!("Invalid member role: {}", s)),
        }
    }
}

/// Membership grant on an assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMember {
    pub assembly_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for AssemblyMember {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(AssemblyMember {
            assembly_id: row.get("assembly_id"),
            tenant_id: row.get("tenant_id"),
            user_id: row.get("user_id"),
            role: row
                .get::<String, _>("role")
                .parse()
                .map_err(|e| sqlx::Error::Decode(format!("Failed to parse role: {}", e).into()))?,
            created_at: row.get("created_at"),
        })
    }
}

/// A mutation request against an assembly. Order ops change positions;
/// `AddComment` attaches a comment without touching the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AssemblyMutation {
    InsertItem { slide_id: Uuid, position: usize },
    MoveItem { from: usize, to: usize },
    RemoveItem { position: usize },
    AddComment { slide_id: Option<Uuid>, body: String },
}

impl AssemblyMutation {
    /// The position-changing component of this mutation, if any.
    pub fn as_order_op(&self) -> Option<OrderOp> {
        match self {
            AssemblyMutation::InsertItem { slide_id, position } => Some(OrderOp::InsertItem {
                slide_id: *slide_id,
                position: *position,
            }),
            AssemblyMutation::MoveItem { from, to } => Some(OrderOp::MoveItem {
                from: *from,
                to: *to,
            }),
            AssemblyMutation::RemoveItem { position } => {
                Some(OrderOp::RemoveItem { position: *position })
            }
            AssemblyMutation::AddComment { .. } => None,
        }
    }
}

/// Full current state of an assembly: order, comments, members.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblySnapshot {
    pub assembly: Assembly,
    pub order: Vec<Uuid>,
    pub members: Vec<AssemblyMember>,
    pub comments: Vec<Comment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_and_gates_editing() {
        assert_eq!("edit".parse::<MemberRole>().unwrap(), MemberRole::Edit);
        assert_eq!("view".parse::<MemberRole>().unwrap(), MemberRole::View);
        assert!("owner".parse::<MemberRole>().is_err());
        assert!(MemberRole::Edit.can_edit());
        assert!(!MemberRole::View.can_edit());
    }

    #[test]
    fn mutation_json_shape() {
        let op: AssemblyMutation =
            serde_json::from_str(r#"{"op":"move_item","from":3,"to":0}"#).unwrap();
        match op {
            AssemblyMutation::MoveItem { from, to } => {
                assert_eq!(from, 3);
                assert_eq!(to, 0);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn add_comment_has_no_order_component() {
        let op = AssemblyMutation::AddComment {
            slide_id: None,
            body: "nice slide".into(),
        };
        assert!(op.as_order_op().is_none());
        let op = AssemblyMutation::RemoveItem { position: 2 };
        assert!(op.as_order_op().is_some());
    }
}
