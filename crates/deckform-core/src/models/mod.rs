pub mod assembly;
pub mod comment;
pub mod event;
pub mod slide;
pub mod task;
pub mod tenant;
pub mod upload_job;

pub use assembly::{
    Assembly, AssemblyMember, AssemblyMutation, AssemblySnapshot, MemberRole,
};
pub use comment::Comment;
pub use event::{EventScope, HubEvent};
pub use slide::Slide;
pub use task::{Task, TaskKind, TaskListQuery, TaskResponse, TaskStats, TaskStatus};
pub use tenant::{Tenant, TenantStatus};
pub use upload_job::{JobStatus, UploadJob};
