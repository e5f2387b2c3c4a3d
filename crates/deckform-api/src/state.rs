use std::sync::Arc;

use sqlx::PgPool;

use deckform_core::Config;
use deckform_db::{
    AssemblyRepository, SlideRepository, TaskRepository, TenantRepository, UploadGrantRepository,
    UploadJobRepository,
};
use deckform_realtime::{CollaborationCoordinator, NotificationHub};
use deckform_storage::{Storage, UploadTokenSigner};
use deckform_worker::IngestPool;

/// Shared application state, one instance behind an `Arc` in every handler.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub tenants: TenantRepository,
    pub jobs: UploadJobRepository,
    pub tasks: TaskRepository,
    pub slides: SlideRepository,
    pub grants: UploadGrantRepository,
    pub assemblies: AssemblyRepository,
    pub storage: Arc<dyn Storage>,
    pub signer: UploadTokenSigner,
    pub hub: Arc<NotificationHub>,
    pub coordinator: Arc<CollaborationCoordinator>,
    /// Owns the background loops; dropping these shuts them down.
    pub ingest_pool: IngestPool,
    pub reconciler_shutdown: tokio::sync::mpsc::Sender<()>,
}
