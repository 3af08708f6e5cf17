//! Worker pool consuming the webhook job queue.
//!
//! Provides lifecycle management and graceful shutdown for the
//! supervised worker tasks that drive the [`WebhookProcessor`].

use std::{sync::Arc, time::Duration};

use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{JobError, Result},
    queue::JobQueue,
    webhook::WebhookProcessor,
};

/// Counters describing the pool's work so far.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    /// Workers currently running.
    pub active_workers: usize,
    /// Jobs processed to a per-job outcome (including retries scheduled).
    pub jobs_processed: u64,
    /// Jobs that hit an infrastructure error.
    pub jobs_errored: u64,
}

/// Supervised pool of webhook workers.
///
/// Workers run until the cancellation token fires or the queue closes.
/// Call [`shutdown_graceful`](Self::shutdown_graceful) before dropping;
/// dropping a pool with live workers force-cancels them.
pub struct WorkerPool {
    processor: Arc<WebhookProcessor>,
    queue: Arc<dyn JobQueue>,
    worker_count: usize,
    stats: Arc<RwLock<WorkerStats>>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool of `worker_count` workers.
    pub fn new(
        processor: Arc<WebhookProcessor>,
        queue: Arc<dyn JobQueue>,
        worker_count: usize,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            processor,
            queue,
            worker_count,
            stats: Arc::new(RwLock::new(WorkerStats::default())),
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Shared stats handle.
    pub fn stats(&self) -> Arc<RwLock<WorkerStats>> {
        self.stats.clone()
    }

    /// Spawns all workers. Returns immediately.
    pub async fn spawn_workers(&mut self) {
        info!(worker_count = self.worker_count, "spawning webhook workers");

        self.stats.write().await.active_workers = self.worker_count;

        for worker_id in 0..self.worker_count {
            let processor = self.processor.clone();
            let queue = self.queue.clone();
            let stats = self.stats.clone();
            let token = self.cancellation_token.clone();

            let handle = tokio::spawn(async move {
                info!(worker_id, "webhook worker starting");
                run_worker(worker_id, processor, queue, stats, token).await;
                info!(worker_id, "webhook worker stopped");
            });

            self.worker_handles.push(handle);
        }
    }

    /// Signals cancellation and waits for workers to finish.
    ///
    /// # Errors
    ///
    /// Returns `JobError::ShutdownTimeout` when workers do not stop in
    /// time; they keep the cancellation signal and will exit on their own.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_secs = timeout.as_secs(),
            "shutting down worker pool"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let stats = self.stats.clone();
        let join_all = async {
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    error!(worker_id, error = %join_error, "worker task panicked");
                }
            }
            stats.write().await.active_workers = 0;
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Err(_) => {
                error!(timeout_secs = timeout.as_secs(), "worker shutdown timed out");
                Err(JobError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Whether any worker task is still running.
    pub fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.worker_handles.iter().filter(|h| !h.is_finished()).count();
        if active > 0 && !self.cancellation_token.is_cancelled() {
            warn!(
                active_workers = active,
                "WorkerPool dropped without graceful shutdown, cancelling workers"
            );
            self.cancellation_token.cancel();
        }
    }
}

async fn run_worker(
    worker_id: usize,
    processor: Arc<WebhookProcessor>,
    queue: Arc<dyn JobQueue>,
    stats: Arc<RwLock<WorkerStats>>,
    token: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            () = token.cancelled() => break,
            job = queue.dequeue() => job,
        };

        let Some(job) = job else {
            // Queue closed and drained
            break;
        };

        match processor.process(job).await {
            Ok(()) => stats.write().await.jobs_processed += 1,
            Err(e) => {
                error!(worker_id, log_id = %job.log_id, error = %e, "job processing errored");
                stats.write().await.jobs_errored += 1;
            },
        }
    }
}
