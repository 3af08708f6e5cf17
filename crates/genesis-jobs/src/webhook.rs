//! Webhook job processing.
//!
//! The processor drives each job through the log's state machine:
//! claim with a compare-and-set to `processing`, dispatch through the
//! handler registry, then settle as `completed` or `failed`. Failed
//! jobs are redelivered with exponential backoff until the attempt
//! budget runs out, at which point an alert fires.

use std::sync::Arc;

use async_trait::async_trait;
use genesis_core::{CoreError, WebhookLog, WebhookStatus};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::{JobError, Result},
    queue::{JobQueue, WebhookJob},
    registry::HandlerRegistry,
    retry::{RetryDecision, RetryPolicy},
    storage::JobStorage,
};

/// Notification target for webhooks that exhausted their retries.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Reports a permanently failed webhook.
    async fn permanent_failure(&self, log: &WebhookLog, attempts: i32, error: &str);
}

/// Alert sink that writes to the structured log.
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn permanent_failure(&self, log: &WebhookLog, attempts: i32, error: &str) {
        error!(
            log_id = %log.id,
            project_id = %log.project_id,
            event_type = %log.event_type,
            attempts,
            error,
            "webhook permanently failed"
        );
    }
}

/// Processes webhook jobs dequeued by the worker pool.
pub struct WebhookProcessor {
    storage: Arc<dyn JobStorage>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<HandlerRegistry>,
    policy: RetryPolicy,
    alerts: Arc<dyn AlertSink>,
}

impl WebhookProcessor {
    /// Creates a processor over the given collaborators.
    pub fn new(
        storage: Arc<dyn JobStorage>,
        queue: Arc<dyn JobQueue>,
        registry: Arc<HandlerRegistry>,
        policy: RetryPolicy,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self { storage, queue, registry, policy, alerts }
    }

    /// Processes one job end to end.
    ///
    /// Always returns `Ok` for per-job outcomes (success, retry scheduled,
    /// permanent failure, duplicate delivery); only infrastructure errors
    /// propagate so the worker loop can decide whether to keep running.
    #[instrument(skip(self), fields(log_id = %job.log_id))]
    pub async fn process(&self, job: WebhookJob) -> Result<()> {
        let Some(log) = self.storage.find_webhook(job.log_id).await? else {
            warn!("job references missing webhook log, dropping");
            return Ok(());
        };

        // Claim the log. A duplicate delivery loses the compare-and-set
        // and is dropped here, which is what makes redelivery safe.
        match self.storage.transition_webhook(log.id, WebhookStatus::Processing, None).await {
            Ok(()) => {},
            Err(JobError::Core(CoreError::InvalidTransition { from, .. })) => {
                debug!(%from, "webhook log not claimable, dropping duplicate delivery");
                return Ok(());
            },
            Err(e) => return Err(e),
        }

        let Some(handler) = self.registry.get(&log.event_type) else {
            info!(event_type = %log.event_type, "no handler registered, completing");
            return self
                .storage
                .transition_webhook(log.id, WebhookStatus::Completed, None)
                .await;
        };

        match handler.handle(&log.project_id, &log.payload.0).await {
            Ok(()) => {
                self.storage.transition_webhook(log.id, WebhookStatus::Completed, None).await?;
                info!(event_type = %log.event_type, "webhook processed");
                Ok(())
            },
            Err(e) => self.handle_failure(&log, &e).await,
        }
    }

    /// Settles a failed attempt: record it, then either schedule a
    /// redelivery or raise the permanent-failure alert.
    async fn handle_failure(&self, log: &WebhookLog, cause: &JobError) -> Result<()> {
        let message = cause.to_string();
        let attempts = self.storage.increment_attempts(log.id).await?;
        self.storage
            .transition_webhook(log.id, WebhookStatus::Failed, Some(&message))
            .await?;

        match self.policy.decide(attempts, cause) {
            RetryDecision::Retry { delay } => {
                warn!(
                    attempts,
                    delay_secs = delay.as_secs(),
                    error = %message,
                    "webhook failed, scheduling retry"
                );
                self.queue.enqueue_after(WebhookJob::new(log.id), delay).await
            },
            RetryDecision::GiveUp { reason } => {
                self.alerts.permanent_failure(log, attempts, &message).await;
                debug!(%reason, "webhook retries exhausted");
                Ok(())
            },
        }
    }
}

/// Counts of webhook jobs re-enqueued by [`recover_unfinished`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Logs that never left `pending`.
    pub pending: usize,
    /// Logs a previous run left stuck in `processing`.
    pub interrupted: usize,
}

/// Re-enqueues webhook logs left unfinished by a previous run.
///
/// Called once at startup, before traffic arrives. `pending` rows are
/// enqueued as-is. Rows still in `processing` were claimed by workers
/// that no longer exist; their jobs would be dropped as duplicate
/// deliveries, so each is first moved to `failed` with an "interrupted"
/// marker and then re-enqueued, letting the retry edge reclaim it.
pub async fn recover_unfinished(
    storage: &dyn JobStorage,
    queue: &dyn JobQueue,
    limit: i64,
) -> Result<RecoveryReport> {
    let pending = storage.find_webhooks(WebhookStatus::Pending, limit).await?;
    for log in &pending {
        queue.enqueue(WebhookJob::new(log.id)).await?;
    }

    let interrupted = storage.find_webhooks(WebhookStatus::Processing, limit).await?;
    for log in &interrupted {
        storage
            .transition_webhook(log.id, WebhookStatus::Failed, Some("interrupted by restart"))
            .await?;
        queue.enqueue(WebhookJob::new(log.id)).await?;
    }

    let report = RecoveryReport { pending: pending.len(), interrupted: interrupted.len() };
    if report.pending > 0 || report.interrupted > 0 {
        info!(
            pending = report.pending,
            interrupted = report.interrupted,
            "re-enqueued unfinished webhook jobs from previous run"
        );
    }
    Ok(report)
}
