//! Reconciliation loop: converges database state with reality after crashes
//! and lost notifications. Everything here is idempotent; running a pass
//! twice is safe.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use deckform_core::models::{HubEvent, TaskStatus};
use deckform_db::{TaskRepository, UploadGrantRepository, UploadJobRepository};
use deckform_realtime::NotificationHub;

pub struct Reconciler {
    jobs: UploadJobRepository,
    tasks: TaskRepository,
    grants: UploadGrantRepository,
    hub: Arc<NotificationHub>,
    /// Processing claims with no liveness signal for this long are reaped.
    stale_claim_ceiling_secs: i64,
    /// Pending jobs older than this are re-announced to the pool.
    pending_requeue_after_secs: i64,
}

impl Reconciler {
    pub fn new(
        jobs: UploadJobRepository,
        tasks: TaskRepository,
        grants: UploadGrantRepository,
        hub: Arc<NotificationHub>,
        stale_claim_ceiling_secs: i64,
        pending_requeue_after_secs: i64,
    ) -> Self {
        Self {
            jobs,
            tasks,
            grants,
            hub,
            stale_claim_ceiling_secs,
            pending_requeue_after_secs,
        }
    }

    /// Run the loop until shutdown. Returns a sender; dropping it or sending
    /// on it stops the loop after the current pass.
    pub fn spawn(self, interval_secs: u64) -> mpsc::Sender<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_secs, "Reconciler started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Reconciliation pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Reconciler stopped");
                        break;
                    }
                }
            }
        });
        shutdown_tx
    }

    /// One reconciliation pass: reap dead claims, re-announce stranded
    /// pending jobs, drop expired upload grants.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        let reaped = self.jobs.reap_stale(self.stale_claim_ceiling_secs).await?;
        for job in &reaped {
            warn!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                "Reaped stale processing claim"
            );
            let reason = job
                .error_message
                .as_deref()
                .unwrap_or("worker presumed dead");
            match self.tasks.fail(job.tenant_id, job.task_id, reason).await {
                Ok(true) => {
                    self.hub.publish(
                        job.tenant_id,
                        HubEvent::TaskProgress {
                            task_id: job.task_id,
                            status: TaskStatus::Failed,
                            progress: 0.0,
                            message: Some(reason.to_string()),
                        },
                    );
                }
                // the worker got there first with a real terminal state
                Ok(false) => debug!(task_id = %job.task_id, "Task already terminal"),
                Err(e) => error!(error = %e, task_id = %job.task_id, "Failed to fail reaped task"),
            }
        }

        let stranded = self
            .jobs
            .stuck_pending(self.pending_requeue_after_secs)
            .await?;
        for job_id in &stranded {
            debug!(job_id = %job_id, "Re-announcing stranded pending job");
            if let Err(e) = self.jobs.renotify(*job_id).await {
                warn!(error = %e, job_id = %job_id, "Renotify failed");
            }
        }

        let expired = self.grants.delete_expired().await?;
        if !reaped.is_empty() || !stranded.is_empty() || expired > 0 {
            info!(
                reaped = reaped.len(),
                renotified = stranded.len(),
                expired_grants = expired,
                "Reconciliation pass applied changes"
            );
        }

        Ok(())
    }
}
