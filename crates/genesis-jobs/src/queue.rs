//! Job queue abstraction with an in-process implementation.
//!
//! Delivery is at-least-once: a job handed to a worker that crashes
//! before completing is recovered from the durable log at startup, not
//! by the queue itself. Handlers are therefore written idempotent.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genesis_core::{Clock, WebhookLogId};
use tokio::sync::{Mutex, Notify};

use crate::error::{JobError, Result};

/// Unit of work for the webhook processor.
///
/// Carries only the log id; the processor loads the payload from storage
/// so a redelivered job always sees the current row state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookJob {
    /// The webhook log this job processes.
    pub log_id: WebhookLogId,
}

impl WebhookJob {
    /// Creates a job for the given log.
    pub fn new(log_id: WebhookLogId) -> Self {
        Self { log_id }
    }
}

/// Queue seam between ingestion and the worker pool.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Makes a job available immediately.
    async fn enqueue(&self, job: WebhookJob) -> Result<()>;

    /// Makes a job available after `delay`. Used for retry backoff.
    async fn enqueue_after(&self, job: WebhookJob, delay: Duration) -> Result<()>;

    /// Waits for the next available job. Returns `None` once the queue is
    /// closed and drained, which tells workers to exit.
    async fn dequeue(&self) -> Option<WebhookJob>;
}

struct QueueInner {
    ready: VecDeque<WebhookJob>,
    delayed: Vec<(DateTime<Utc>, WebhookJob)>,
}

/// In-process FIFO queue with delayed redelivery.
///
/// Time is read through the injected [`Clock`], so tests can make
/// delayed jobs due by advancing a `TestClock`.
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    closed: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl MemoryQueue {
    /// Creates an empty queue reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(QueueInner { ready: VecDeque::new(), delayed: Vec::new() }),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            clock,
        }
    }

    /// Closes the queue. Workers drain the ready jobs then observe `None`;
    /// still-delayed jobs are abandoned and recovered from the durable log
    /// on the next start.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Jobs currently ready or delayed. Test and introspection helper.
    pub async fn len(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.ready.len() + inner.delayed.len()
    }

    /// Whether the queue holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job: WebhookJob) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::QueueClosed);
        }

        self.inner.lock().await.ready.push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn enqueue_after(&self, job: WebhookJob, delay: Duration) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::QueueClosed);
        }

        let ready_at = self.clock.now_utc()
            + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        self.inner.lock().await.delayed.push((ready_at, job));
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<WebhookJob> {
        loop {
            let next_due = {
                let mut inner = self.inner.lock().await;

                // Promote delayed jobs whose time has come
                let now = self.clock.now_utc();
                let mut i = 0;
                while i < inner.delayed.len() {
                    if inner.delayed[i].0 <= now {
                        let (_, job) = inner.delayed.swap_remove(i);
                        inner.ready.push_back(job);
                    } else {
                        i += 1;
                    }
                }

                if let Some(job) = inner.ready.pop_front() {
                    return Some(job);
                }

                if self.closed.load(Ordering::SeqCst) {
                    // Wake the next waiter so shutdown cascades
                    self.notify.notify_one();
                    return None;
                }

                inner.delayed.iter().map(|(at, _)| *at).min()
            };

            match next_due {
                Some(due) => {
                    let wait = (due - self.clock.now_utc())
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    tokio::select! {
                        () = self.notify.notified() => {},
                        () = self.clock.sleep(wait) => {},
                    }
                },
                None => self.notify.notified().await,
            }
        }
    }
}
