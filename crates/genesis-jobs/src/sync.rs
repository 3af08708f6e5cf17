//! Data synchronization from the remote Genesis API.
//!
//! Each run pulls one dataset for one project, caches it under
//! `"{data_type}:{project_id}"` with a per-type TTL, and records the
//! whole attempt in a sync log. Retried syncs create fresh log rows, so
//! the table keeps the full attempt history.

use std::{sync::Arc, time::Duration};

use genesis_cache::CacheService;
use genesis_core::{DataType, SyncLogId, SyncStatus};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    client::GenesisApi,
    error::{JobError, Result},
    storage::JobStorage,
};

/// Cache lifetimes per dataset kind.
///
/// Users change often, billing plans less, feature flags least.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTtlConfig {
    /// TTL for user rosters.
    pub users: Duration,
    /// TTL for billing plans.
    pub billing: Duration,
    /// TTL for feature flags.
    pub features: Duration,
    /// TTL for datasets without a specific entry.
    pub default: Duration,
}

impl Default for SyncTtlConfig {
    fn default() -> Self {
        Self {
            users: Duration::from_secs(1800),
            billing: Duration::from_secs(3600),
            features: Duration::from_secs(7200),
            default: Duration::from_secs(3600),
        }
    }
}

impl SyncTtlConfig {
    /// TTL to apply when caching `data_type`.
    pub fn ttl_for(&self, data_type: &DataType) -> Duration {
        match data_type {
            DataType::Users => self.users,
            DataType::Billing => self.billing,
            DataType::Features => self.features,
            DataType::Other(_) => self.default,
        }
    }
}

/// Runs project data synchronization.
pub struct SyncProcessor {
    storage: Arc<dyn JobStorage>,
    client: Arc<dyn GenesisApi>,
    cache: Arc<CacheService>,
    ttls: SyncTtlConfig,
}

impl SyncProcessor {
    /// Creates a processor over the given collaborators.
    pub fn new(
        storage: Arc<dyn JobStorage>,
        client: Arc<dyn GenesisApi>,
        cache: Arc<CacheService>,
        ttls: SyncTtlConfig,
    ) -> Self {
        Self { storage, client, cache, ttls }
    }

    /// Synchronizes one dataset for one project.
    ///
    /// Returns the id of the sync log recording this attempt. On failure
    /// the log is settled as `failed` before the error propagates, so
    /// callers never observe a log stuck in `running`.
    #[instrument(skip(self), fields(project_id, data_type = %data_type))]
    pub async fn run(&self, project_id: &str, data_type: &DataType) -> Result<SyncLogId> {
        let log_id = self.storage.create_sync_log(project_id, data_type).await?;
        self.storage.transition_sync(log_id, SyncStatus::Running, None).await?;

        match self.client.fetch(data_type, project_id).await {
            Ok(records) => self.settle_success(log_id, project_id, data_type, records).await,
            Err(e) => self.settle_failure(log_id, e).await,
        }
    }

    /// Like [`run`](Self::run), but aborts when `cancel` fires. A
    /// cancelled sync settles as `failed` with the "cancelled" marker.
    pub async fn run_cancellable(
        &self,
        project_id: &str,
        data_type: &DataType,
        cancel: &CancellationToken,
    ) -> Result<SyncLogId> {
        let log_id = self.storage.create_sync_log(project_id, data_type).await?;
        self.storage.transition_sync(log_id, SyncStatus::Running, None).await?;

        tokio::select! {
            result = self.client.fetch(data_type, project_id) => match result {
                Ok(records) => self.settle_success(log_id, project_id, data_type, records).await,
                Err(e) => self.settle_failure(log_id, e).await,
            },
            () = cancel.cancelled() => {
                warn!(log_id = %log_id, "sync cancelled mid-flight");
                self.storage
                    .transition_sync(log_id, SyncStatus::Failed, Some("cancelled"))
                    .await?;
                Err(JobError::Cancelled)
            },
        }
    }

    /// Serves a dataset from cache, running a full fetch on a miss.
    ///
    /// This is the read path counterpart to [`run`](Self::run): it does
    /// not create a sync log, it just populates the same cache key.
    pub async fn read_through(&self, project_id: &str, data_type: &DataType) -> Result<Value> {
        let key = cache_key(data_type, project_id);
        let ttl = self.ttls.ttl_for(data_type);

        self.cache
            .remember(&key, Some(ttl), || async {
                let records = self.client.fetch(data_type, project_id).await?;
                Ok(Value::Array(records))
            })
            .await
    }

    async fn settle_success(
        &self,
        log_id: SyncLogId,
        project_id: &str,
        data_type: &DataType,
        records: Vec<Value>,
    ) -> Result<SyncLogId> {
        let count = i32::try_from(records.len()).unwrap_or(i32::MAX);
        let key = cache_key(data_type, project_id);

        if !self
            .cache
            .put(&key, Value::Array(records), Some(self.ttls.ttl_for(data_type)))
            .await
        {
            // Cache is off or down; the sync still counts
            warn!(%key, "sync results not cached");
        }

        self.storage.record_sync_progress(log_id, count).await?;
        self.storage.transition_sync(log_id, SyncStatus::Completed, None).await?;

        info!(log_id = %log_id, records = count, "sync completed");
        Ok(log_id)
    }

    async fn settle_failure(&self, log_id: SyncLogId, cause: JobError) -> Result<SyncLogId> {
        let message = cause.to_string();
        warn!(log_id = %log_id, error = %message, "sync failed");
        self.storage.transition_sync(log_id, SyncStatus::Failed, Some(&message)).await?;
        Err(cause)
    }
}

/// Cache key for a project's dataset.
pub fn cache_key(data_type: &DataType, project_id: &str) -> String {
    format!("{data_type}:{project_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttls_match_dataset_volatility() {
        let ttls = SyncTtlConfig::default();

        assert_eq!(ttls.ttl_for(&DataType::Users), Duration::from_secs(1800));
        assert_eq!(ttls.ttl_for(&DataType::Billing), Duration::from_secs(3600));
        assert_eq!(ttls.ttl_for(&DataType::Features), Duration::from_secs(7200));
        assert_eq!(
            ttls.ttl_for(&DataType::Other("invoices".into())),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn cache_keys_are_type_then_project() {
        assert_eq!(cache_key(&DataType::Users, "p1"), "users:p1");
        assert_eq!(cache_key(&DataType::Billing, "p1"), "billing:p1");
        assert_eq!(cache_key(&DataType::Other("invoices".into()), "p9"), "invoices:p9");
    }
}
