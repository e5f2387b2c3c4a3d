use serde::Serialize;
use uuid::Uuid;

use super::comment::Comment;
use super::task::TaskStatus;

/// Delivery scope of a hub event, narrower than the tenant when set.
///
/// An event reaches a connection iff the connection's tenant matches and
/// (the scope is `Tenant`, or the connection holds an active interest in the
/// narrower scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventScope {
    Tenant,
    Assembly(Uuid),
    Task(Uuid),
}

/// Events fanned out over the push channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubEvent {
    TaskProgress {
        task_id: Uuid,
        status: TaskStatus,
        progress: f64,
        message: Option<String>,
    },
    AssemblyChanged {
        assembly_id: Uuid,
        resulting_order: Vec<Uuid>,
        changed_by: Uuid,
    },
    CommentAdded {
        assembly_id: Uuid,
        comment: Comment,
    },
    PresenceChanged {
        assembly_id: Uuid,
        active_users: Vec<Uuid>,
    },
}

impl HubEvent {
    /// The scope an event targets is implied by its payload.
    pub fn scope(&self) -> EventScope {
        match self {
            HubEvent::TaskProgress { task_id, .. } => EventScope::Task(*task_id),
            HubEvent::AssemblyChanged { assembly_id, .. }
            | HubEvent::CommentAdded { assembly_id, .. }
            | HubEvent::PresenceChanged { assembly_id, .. } => EventScope::Assembly(*assembly_id),
        }
    }

    /// Wire name of the event, used as the SSE event field.
    pub fn kind(&self) -> &'static str {
        match self {
            HubEvent::TaskProgress { .. } => "TASK_PROGRESS",
            HubEvent::AssemblyChanged { .. } => "ASSEMBLY_CHANGED",
            HubEvent::CommentAdded { .. } => "COMMENT_ADDED",
            HubEvent::PresenceChanged { .. } => "PRESENCE_CHANGED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_events_are_task_scoped() {
        let task_id = Uuid::new_v4();
        let event = HubEvent::TaskProgress {
            task_id,
            status: TaskStatus::Processing,
            progress: 0.5,
            message: None,
        };
        assert_eq!(event.scope(), EventScope::Task(task_id));
        assert_eq!(event.kind(), "TASK_PROGRESS");
    }

    #[test]
    fn assembly_events_are_assembly_scoped() {
        let assembly_id = Uuid::new_v4();
        let event = HubEvent::PresenceChanged {
            assembly_id,
            active_users: vec![],
        };
        assert_eq!(event.scope(), EventScope::Assembly(assembly_id));
    }

    #[test]
    fn wire_format_uses_screaming_snake_case_tag() {
        let event = HubEvent::AssemblyChanged {
            assembly_id: Uuid::new_v4(),
            resulting_order: vec![],
            changed_by: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ASSEMBLY_CHANGED");
        assert!(json["resulting_order"].is_array());
    }
}
