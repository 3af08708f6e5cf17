//! Database access layer implementing the repository pattern.
//!
//! Repositories translate between domain models and the database schema.
//! All SQL lives here; the processing crates talk to repositories (or
//! trait seams over them) and never issue queries directly.
//!
//! Status changes go through the `transition` methods, which enforce the
//! state machines with compare-and-set updates so concurrent workers can
//! never corrupt a log's lifecycle.

use std::sync::Arc;

use sqlx::PgPool;

pub mod api_tokens;
pub mod sync_logs;
pub mod webhook_logs;

use crate::error::Result;

/// Container for all repository instances providing unified database access.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook log operations.
    pub webhook_logs: Arc<webhook_logs::Repository>,

    /// Repository for sync log operations.
    pub sync_logs: Arc<sync_logs::Repository>,

    /// Repository for API token operations.
    pub api_tokens: Arc<api_tokens::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            webhook_logs: Arc::new(webhook_logs::Repository::new(pool.clone())),
            sync_logs: Arc::new(sync_logs::Repository::new(pool.clone())),
            api_tokens: Arc::new(api_tokens::Repository::new(pool)),
        }
    }

    /// Performs a health check on the database connection.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhook_logs.pool()).await?;

        Ok(())
    }
}
