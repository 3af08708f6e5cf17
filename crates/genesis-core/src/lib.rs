//! Core domain types and storage for the Genesis integration.
//!
//! Provides strongly-typed identifiers, the webhook/sync/token entities
//! with their status state machines, the error taxonomy, a clock
//! abstraction, and Postgres repositories. All other crates build on
//! these foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    ApiToken, DataType, SyncLog, SyncLogId, SyncStatus, TokenId, WebhookLog, WebhookLogId,
    WebhookStatus,
};
pub use storage::Storage;
pub use time::{Clock, RealClock, TestClock};
