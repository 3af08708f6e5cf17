//! Job processing for the Genesis integration.
//!
//! Two processors drive the system: [`WebhookProcessor`] consumes queued
//! webhook jobs, dispatches them through a handler registry, and retries
//! failures with exponential backoff; [`SyncProcessor`] pulls datasets
//! from the remote Genesis API and caches them with per-type TTLs. Both
//! record their lifecycle in durable logs through [`JobStorage`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod storage;
pub mod sync;
pub mod webhook;
pub mod worker_pool;

pub use client::{GenesisApi, HttpGenesisClient};
pub use error::{JobError, Result};
pub use queue::{JobQueue, MemoryQueue, WebhookJob};
pub use registry::{HandlerRegistry, WebhookHandler};
pub use retry::RetryPolicy;
pub use storage::{JobStorage, PostgresJobStorage};
pub use sync::{SyncProcessor, SyncTtlConfig};
pub use webhook::{
    recover_unfinished, AlertSink, RecoveryReport, TracingAlertSink, WebhookProcessor,
};
pub use worker_pool::{WorkerPool, WorkerStats};
