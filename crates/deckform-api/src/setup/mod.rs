//! Application setup and initialization, extracted from main.rs.

pub mod database;
pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};

use deckform_core::Config;
use deckform_db::{
    AssemblyRepository, SlideRepository, TaskRepository, TenantRepository, UploadGrantRepository,
    UploadJobRepository,
};
use deckform_realtime::{CollaborationCoordinator, NotificationHub};
use deckform_storage::{LocalStorage, Storage, UploadTokenSigner};
use deckform_worker::{IngestContext, IngestPool, IngestPoolConfig, KeywordAnalyzer, Reconciler};

use crate::state::AppState;

/// Initialize the entire application: telemetry, database, storage, the
/// in-process ingestion pool and reconciler, and the router.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry();
    tracing::info!("Configuration loaded and validated");

    let pool = database::setup_database(&config).await?;

    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.storage_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open storage root: {}", e))?,
    );
    let signer = UploadTokenSigner::new(config.upload_token_secret.as_bytes());

    let tenants = TenantRepository::new(pool.clone());
    let jobs = UploadJobRepository::new(pool.clone());
    let tasks = TaskRepository::new(pool.clone());
    let slides = SlideRepository::new(pool.clone());
    let grants = UploadGrantRepository::new(pool.clone());
    let assemblies = AssemblyRepository::new(pool.clone());

    let hub = Arc::new(NotificationHub::new(config.connection_buffer));
    let coordinator = Arc::new(CollaborationCoordinator::new(
        tenants.clone(),
        assemblies.clone(),
        slides.clone(),
        Arc::clone(&hub),
    ));

    let ingest_context = IngestContext {
        jobs: jobs.clone(),
        tasks: tasks.clone(),
        slides: slides.clone(),
        storage: Arc::clone(&storage),
        analyzer: Arc::new(KeywordAnalyzer::new()),
        hub: Arc::clone(&hub),
    };
    let ingest_pool = IngestPool::start(
        pool.clone(),
        ingest_context,
        IngestPoolConfig::from_config(&config),
    );

    let reconciler = Reconciler::new(
        jobs.clone(),
        tasks.clone(),
        grants.clone(),
        Arc::clone(&hub),
        config.stale_claim_ceiling_secs,
        config.pending_requeue_after_secs,
    );
    let reconciler_shutdown = reconciler.spawn(config.reconcile_interval_secs);

    let state = Arc::new(AppState {
        config: config.clone(),
        pool,
        tenants,
        jobs,
        tasks,
        slides,
        grants,
        assemblies,
        storage,
        signer,
        hub,
        coordinator,
        ingest_pool,
        reconciler_shutdown,
    });

    let router = routes::setup_routes(&config, state.clone());

    Ok((state, router))
}
