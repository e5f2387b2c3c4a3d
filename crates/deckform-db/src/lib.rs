//! Database repositories for the data access layer
//!
//! Each repository owns one domain entity and provides tenant-scoped CRUD and
//! the specialized atomic operations (claim, guarded terminal writes, order
//! rewrites) that the pipeline's exactly-one-winner guarantees reduce to.

pub mod assemblies;
pub mod slides;
pub mod tasks;
pub mod tenants;
pub mod transaction;
pub mod upload_grants;
pub mod upload_jobs;

pub use assemblies::AssemblyRepository;
pub use slides::SlideRepository;
pub use tasks::TaskRepository;
pub use tenants::TenantRepository;
pub use transaction::TransactionGuard;
pub use upload_grants::{UploadGrant, UploadGrantRepository};
pub use upload_jobs::{ConfirmOutcome, UploadJobRepository, UPLOAD_NOTIFY_CHANNEL};
