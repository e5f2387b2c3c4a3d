//! Ingestion pool: worker loop, LISTEN/NOTIFY wake-up with polling fallback,
//! transient retry, and job processing.
//!
//! Shutdown: [`IngestPool::shutdown`] signals the pool to stop claiming; it
//! does not wait for in-flight jobs. A job interrupted mid-flight is reaped
//! by the reconciler once its liveness signal goes stale.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use deckform_core::models::{HubEvent, TaskStatus, UploadJob};
use deckform_core::worker_error::is_transient;
use deckform_core::{Config, WorkerError};
use deckform_db::{SlideRepository, TaskRepository, UploadJobRepository, UPLOAD_NOTIFY_CHANNEL};
use deckform_realtime::NotificationHub;
use deckform_storage::{artifact_key, Storage, StorageError};

use crate::analyzer::SlideAnalyzer;
use crate::deck::decompose;

/// Maximum delay in seconds between transient retries of one job step.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 60;

/// Failure reason recorded when a task is stopped by a cancel request.
pub const CANCELLED_REASON: &str = "cancelled";

/// Backoff in seconds for a given attempt number (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempt: u32) -> u64 {
    2_u64.pow(attempt.min(16)).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct IngestPoolConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Concurrent analysis calls allowed within one job.
    pub per_job_analysis_limit: usize,
    /// Attempts per transient step before the job fails.
    pub infra_max_attempts: u32,
    pub max_slides_per_deck: usize,
}

impl IngestPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.worker_max_workers,
            poll_interval_ms: config.worker_poll_interval_ms,
            per_job_analysis_limit: config.per_job_analysis_limit,
            infra_max_attempts: config.infra_max_attempts,
            max_slides_per_deck: config.max_slides_per_deck,
        }
    }
}

impl Default for IngestPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            per_job_analysis_limit: 2,
            infra_max_attempts: 5,
            max_slides_per_deck: 500,
        }
    }
}

/// Everything a worker needs to process one claimed job.
#[derive(Clone)]
pub struct IngestContext {
    pub jobs: UploadJobRepository,
    pub tasks: TaskRepository,
    pub slides: SlideRepository,
    pub storage: Arc<dyn Storage>,
    pub analyzer: Arc<dyn SlideAnalyzer>,
    pub hub: Arc<NotificationHub>,
}

pub struct IngestPool {
    shutdown_tx: mpsc::Sender<()>,
}

impl IngestPool {
    /// Start the pool. The worker wakes on PostgreSQL NOTIFY for new uploads
    /// and additionally polls at `poll_interval_ms` so a lost notification
    /// only delays a job, never strands it.
    pub fn start(pool: sqlx::PgPool, context: IngestContext, config: IngestPoolConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            Self::worker_pool(pool, context, config, shutdown_rx).await;
        });

        Self { shutdown_tx }
    }

    /// Signals the pool to stop claiming new jobs and exit the main loop.
    /// Returns immediately; already-spawned jobs run to completion.
    pub async fn shutdown(&self) {
        info!("Initiating ingest pool shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn worker_pool(
        pool: sqlx::PgPool,
        context: IngestContext,
        config: IngestPoolConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Ingest pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Wake the main loop when LISTEN receives a NOTIFY.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        {
            let pool = pool.clone();
            tokio::spawn(async move {
                loop {
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(UPLOAD_NOTIFY_CHANNEL).await {
                                warn!(error = %e, "LISTEN failed, will retry");
                                sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = notify_tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "PgListener connect failed, will retry");
                            sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Ingest pool shutting down");
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(&context, &config, &semaphore).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&context, &config, &semaphore).await;
                }
            }
        }

        info!("Ingest pool stopped");
    }

    async fn claim_and_dispatch_one(
        context: &IngestContext,
        config: &IngestPoolConfig,
        semaphore: &Arc<Semaphore>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!("No workers available, skipping claim");
                return;
            }
        };

        match context.jobs.claim_next().await {
            Ok(Some(job)) => {
                let ctx = context.clone();
                let cfg = config.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_job(ctx, cfg, job).await;
                });
            }
            Ok(None) => {
                drop(permit);
                trace!("No uploads waiting");
            }
            Err(e) => {
                drop(permit);
                error!(error = %e, "Failed to claim upload job");
            }
        }
    }
}

/// Process one claimed job and record its outcome. Terminal writes are
/// guarded in the repositories, so a racing reaper and a slow worker cannot
/// both land a terminal state.
#[tracing::instrument(skip(context, config, job), fields(job.id = %job.id, tenant.id = %job.tenant_id))]
pub async fn run_job(context: IngestContext, config: IngestPoolConfig, job: UploadJob) {
    let job_id = job.id;
    let tenant_id = job.tenant_id;
    let task_id = job.task_id;

    match process_job(&context, &config, &job).await {
        Ok(slide_count) => {
            info!(slide_count, "Upload job completed");
        }
        Err(e) => {
            let transient = is_transient(&e);
            error!(error = %e, transient, "Upload job failed");
            let reason = e.to_string();
            if let Err(e) = context.jobs.fail(job_id, &reason).await {
                error!(error = %e, "Failed to record job failure");
            }
            match context.tasks.fail(tenant_id, task_id, &reason).await {
                Ok(true) => {}
                Ok(false) => warn!("Task already terminal when recording failure"),
                Err(e) => error!(error = %e, "Failed to record task failure"),
            }
            context.hub.publish(
                tenant_id,
                HubEvent::TaskProgress {
                    task_id,
                    status: TaskStatus::Failed,
                    progress: 0.0,
                    message: Some(reason),
                },
            );
        }
    }
}

async fn process_job(
    context: &IngestContext,
    config: &IngestPoolConfig,
    job: &UploadJob,
) -> Result<usize> {
    let started = context
        .tasks
        .mark_started(job.tenant_id, job.task_id)
        .await
        .context("Failed to mark task started")?;
    if !started {
        warn!(task_id = %job.task_id, "Task not in queued state, continuing");
    }
    context.hub.publish(
        job.tenant_id,
        HubEvent::TaskProgress {
            task_id: job.task_id,
            status: TaskStatus::Processing,
            progress: 0.0,
            message: Some(format!("Ingesting {}", job.filename)),
        },
    );

    let data = download_with_retry(context, &job.storage_key, config.infra_max_attempts).await?;
    let slides = decompose(&data, config.max_slides_per_deck)?;
    let total = slides.len();

    // Analysis runs concurrently within the job, bounded by this semaphore,
    // while slide extraction itself stays sequential to keep positions and
    // progress monotonic.
    let analysis_limit = Arc::new(Semaphore::new(config.per_job_analysis_limit.max(1)));
    let mut analysis_handles = Vec::with_capacity(total);

    for (index, slide) in slides.into_iter().enumerate() {
        if context
            .tasks
            .cancel_requested(job.task_id)
            .await
            .context("Failed to read cancel flag")?
        {
            // The fixed reason string clients match on to distinguish
            // cancellation from genuine failures.
            return Err(WorkerError::fatal(anyhow!(CANCELLED_REASON)).into());
        }

        let artifact = artifact_key();
        let artifact_body = serde_json::to_vec(&json!({
            "heading": slide.heading,
            "body": slide.body,
            "notes": slide.notes,
        }))
        .context("Failed to encode slide artifact")?;
        put_with_retry(
            context,
            &artifact,
            Bytes::from(artifact_body),
            config.infra_max_attempts,
        )
        .await?;

        let stored = context
            .slides
            .insert(
                job.tenant_id,
                job.id,
                index as i32,
                &slide.heading,
                &slide.body,
                Some(&artifact),
            )
            .await
            .context("Failed to store slide")?;

        // Analysis is best-effort: a failure leaves the slide unanalyzed
        // rather than failing the whole deck.
        let analysis_input = match &slide.notes {
            Some(notes) => format!("{}\n{}", slide.body, notes),
            None => slide.body.clone(),
        };
        let permit = analysis_limit
            .clone()
            .acquire_owned()
            .await
            .context("Analysis limiter closed")?;
        let analyzer = Arc::clone(&context.analyzer);
        let slide_repo = context.slides.clone();
        let tenant_id = job.tenant_id;
        let slide_id = stored.id;
        let heading = slide.heading.clone();
        analysis_handles.push(tokio::spawn(async move {
            let _permit = permit;
            match analyzer.analyze(&heading, &analysis_input).await {
                Ok(analysis) => match serde_json::to_value(&analysis) {
                    Ok(value) => {
                        if let Err(e) = slide_repo.set_analysis(tenant_id, slide_id, value).await {
                            warn!(slide_id = %slide_id, error = %e, "Failed to store analysis");
                        }
                    }
                    Err(e) => {
                        warn!(slide_id = %slide_id, error = %e, "Failed to encode analysis");
                    }
                },
                Err(e) => {
                    warn!(slide_id = %slide_id, error = %e, "Slide analysis failed, skipping");
                }
            }
        }));

        let progress = (index + 1) as f64 / total as f64;
        context
            .tasks
            .update_progress(
                job.tenant_id,
                job.task_id,
                progress,
                &format!("Processed slide {}/{}", index + 1, total),
            )
            .await
            .context("Failed to update progress")?;
        context
            .jobs
            .touch(job.id)
            .await
            .context("Failed to refresh claim liveness")?;
        context.hub.publish(
            job.tenant_id,
            HubEvent::TaskProgress {
                task_id: job.task_id,
                status: TaskStatus::Processing,
                progress,
                message: None,
            },
        );
    }

    for handle in analysis_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Analysis task panicked");
        }
    }

    context
        .jobs
        .complete(job.id, total as i32)
        .await
        .context("Failed to mark job completed")?;
    let recorded = context
        .tasks
        .complete(
            job.tenant_id,
            job.task_id,
            json!({ "slide_count": total }),
        )
        .await
        .context("Failed to mark task completed")?;
    if !recorded {
        warn!(task_id = %job.task_id, "Task already terminal, completion not recorded");
    }
    context.hub.publish(
        job.tenant_id,
        HubEvent::TaskProgress {
            task_id: job.task_id,
            status: TaskStatus::Completed,
            progress: 1.0,
            message: Some(format!("Extracted {} slides", total)),
        },
    );

    Ok(total)
}

/// Fetch the uploaded bytes, retrying transient store failures with capped
/// backoff. A missing blob is fatal: the upload was confirmed against a key
/// that no longer resolves, and waiting will not bring it back.
async fn download_with_retry(
    context: &IngestContext,
    key: &str,
    max_attempts: u32,
) -> Result<Bytes> {
    let mut attempt = 0u32;
    loop {
        match context.storage.get(key).await {
            Ok(data) => return Ok(data),
            Err(StorageError::NotFound(_)) => {
                return Err(
                    WorkerError::fatal(anyhow!("uploaded bytes missing at key {}", key)).into(),
                );
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(WorkerError::transient(
                        anyhow::Error::new(e)
                            .context(format!("download failed after {} attempts", attempt)),
                    )
                    .into());
                }
                let backoff = compute_retry_backoff_seconds(attempt);
                warn!(error = %e, attempt, backoff_secs = backoff, "Download failed, retrying");
                sleep(Duration::from_secs(backoff)).await;
            }
        }
    }
}

async fn put_with_retry(
    context: &IngestContext,
    key: &str,
    data: Bytes,
    max_attempts: u32,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        match context.storage.put(key, data.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(WorkerError::transient(
                        anyhow::Error::new(e)
                            .context(format!("artifact write failed after {} attempts", attempt)),
                    )
                    .into());
                }
                let backoff = compute_retry_backoff_seconds(attempt);
                warn!(error = %e, attempt, backoff_secs = backoff, "Artifact write failed, retrying");
                sleep(Duration::from_secs(backoff)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(5), 32);
        assert_eq!(compute_retry_backoff_seconds(6), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(40), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn cancellation_reports_as_fatal_with_fixed_reason() {
        let err: anyhow::Error = WorkerError::fatal(anyhow!(CANCELLED_REASON)).into();
        assert!(!is_transient(&err));
        // Clients match on this exact string to tell cancellation apart
        // from genuine failures.
        assert_eq!(format!("{err}"), "cancelled");
    }

    #[test]
    fn storage_timeouts_report_as_transient() {
        let err: anyhow::Error =
            WorkerError::transient(anyhow!("store unavailable")).into();
        assert!(is_transient(&err));
    }
}
