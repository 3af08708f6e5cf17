//! Storage seam for job processors.
//!
//! Processors depend on [`JobStorage`] rather than concrete repositories
//! so integration tests can run against the in-memory mock while
//! production wires in [`PostgresJobStorage`].

use std::sync::Arc;

use async_trait::async_trait;
use genesis_core::{
    CoreError, DataType, Storage, SyncLog, SyncLogId, SyncStatus, WebhookLog, WebhookLogId,
    WebhookStatus,
};
use serde_json::Value;

use crate::error::Result;

/// Log persistence operations the processors need.
#[async_trait]
pub trait JobStorage: Send + Sync {
    /// Creates a webhook log in `pending`.
    async fn create_webhook(
        &self,
        project_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<WebhookLogId>;

    /// Loads a webhook log.
    async fn find_webhook(&self, id: WebhookLogId) -> Result<Option<WebhookLog>>;

    /// Applies a webhook status transition.
    async fn transition_webhook(
        &self,
        id: WebhookLogId,
        next: WebhookStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Increments a webhook log's attempt counter, returning the new value.
    async fn increment_attempts(&self, id: WebhookLogId) -> Result<i32>;

    /// Lists webhook logs in `status`, oldest first.
    async fn find_webhooks(&self, status: WebhookStatus, limit: i64) -> Result<Vec<WebhookLog>>;

    /// Creates a sync log in `pending`.
    async fn create_sync_log(&self, project_id: &str, data_type: &DataType) -> Result<SyncLogId>;

    /// Applies a sync status transition.
    async fn transition_sync(
        &self,
        id: SyncLogId,
        next: SyncStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Records how many records a sync fetched.
    async fn record_sync_progress(&self, id: SyncLogId, records_synced: i32) -> Result<()>;

    /// Loads a sync log.
    async fn find_sync(&self, id: SyncLogId) -> Result<Option<SyncLog>>;
}

/// Production [`JobStorage`] backed by the core repositories.
#[derive(Clone)]
pub struct PostgresJobStorage {
    storage: Arc<Storage>,
}

impl PostgresJobStorage {
    /// Wraps the repository container.
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl JobStorage for PostgresJobStorage {
    async fn create_webhook(
        &self,
        project_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<WebhookLogId> {
        Ok(self.storage.webhook_logs.create(project_id, event_type, payload).await?)
    }

    async fn find_webhook(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        Ok(self.storage.webhook_logs.find_by_id(id).await?)
    }

    async fn transition_webhook(
        &self,
        id: WebhookLogId,
        next: WebhookStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        Ok(self.storage.webhook_logs.transition(id, next, error_message).await?)
    }

    async fn increment_attempts(&self, id: WebhookLogId) -> Result<i32> {
        Ok(self.storage.webhook_logs.increment_attempts(id).await?)
    }

    async fn find_webhooks(&self, status: WebhookStatus, limit: i64) -> Result<Vec<WebhookLog>> {
        Ok(self.storage.webhook_logs.find_by_status(status, limit).await?)
    }

    async fn create_sync_log(&self, project_id: &str, data_type: &DataType) -> Result<SyncLogId> {
        Ok(self.storage.sync_logs.create(project_id, data_type).await?)
    }

    async fn transition_sync(
        &self,
        id: SyncLogId,
        next: SyncStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        Ok(self.storage.sync_logs.transition(id, next, error_message).await?)
    }

    async fn record_sync_progress(&self, id: SyncLogId, records_synced: i32) -> Result<()> {
        Ok(self.storage.sync_logs.record_progress(id, records_synced).await?)
    }

    async fn find_sync(&self, id: SyncLogId) -> Result<Option<SyncLog>> {
        Ok(self.storage.sync_logs.find_by_id(id).await?)
    }
}

/// In-memory [`JobStorage`] for processor tests.
pub mod mock {
    use std::collections::HashMap;

    use chrono::Utc;
    use genesis_core::{SyncLog, WebhookLog};
    use serde_json::Value;
    use tokio::sync::RwLock;

    use super::*;

    /// Mock storage enforcing the same state machines as the repositories.
    #[derive(Default)]
    pub struct MockJobStorage {
        webhooks: RwLock<HashMap<WebhookLogId, WebhookLog>>,
        syncs: RwLock<HashMap<SyncLogId, SyncLog>>,
    }

    impl MockJobStorage {
        /// Creates empty mock storage.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a pending webhook log and returns its id.
        pub async fn insert_webhook(
            &self,
            project_id: &str,
            event_type: &str,
            payload: Value,
        ) -> WebhookLogId {
            let now = Utc::now();
            let id = WebhookLogId::new();
            self.webhooks.write().await.insert(
                id,
                WebhookLog {
                    id,
                    project_id: project_id.to_string(),
                    event_type: event_type.to_string(),
                    payload: sqlx::types::Json(payload),
                    status: WebhookStatus::Pending,
                    error_message: None,
                    attempts: 0,
                    processed_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            id
        }

        /// Current status of a webhook log, for assertions.
        pub async fn webhook_status(&self, id: WebhookLogId) -> Option<WebhookStatus> {
            self.webhooks.read().await.get(&id).map(|log| log.status)
        }

        /// Full webhook row, for assertions.
        pub async fn webhook(&self, id: WebhookLogId) -> Option<WebhookLog> {
            self.webhooks.read().await.get(&id).cloned()
        }

        /// Full sync row, for assertions.
        pub async fn sync(&self, id: SyncLogId) -> Option<SyncLog> {
            self.syncs.read().await.get(&id).cloned()
        }

        /// Most recently created sync row for a project and data type.
        pub async fn latest_sync(&self, project_id: &str, data_type: &DataType) -> Option<SyncLog> {
            self.syncs
                .read()
                .await
                .values()
                .filter(|log| log.project_id == project_id && &log.data_type == data_type)
                .max_by_key(|log| log.created_at)
                .cloned()
        }

        /// Number of sync rows for a project and data type.
        pub async fn sync_count(&self, project_id: &str, data_type: &DataType) -> usize {
            self.syncs
                .read()
                .await
                .values()
                .filter(|log| log.project_id == project_id && &log.data_type == data_type)
                .count()
        }
    }

    #[async_trait]
    impl JobStorage for MockJobStorage {
        async fn create_webhook(
            &self,
            project_id: &str,
            event_type: &str,
            payload: Value,
        ) -> Result<WebhookLogId> {
            if project_id.is_empty() {
                return Err(
                    CoreError::Validation("project_id must not be empty".to_string()).into()
                );
            }
            if event_type.is_empty() {
                return Err(
                    CoreError::Validation("event_type must not be empty".to_string()).into()
                );
            }
            Ok(self.insert_webhook(project_id, event_type, payload).await)
        }

        async fn find_webhook(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
            Ok(self.webhooks.read().await.get(&id).cloned())
        }

        async fn transition_webhook(
            &self,
            id: WebhookLogId,
            next: WebhookStatus,
            error_message: Option<&str>,
        ) -> Result<()> {
            if next == WebhookStatus::Failed && error_message.is_none() {
                return Err(CoreError::Validation(
                    "transition to failed requires an error message".to_string(),
                )
                .into());
            }

            let mut webhooks = self.webhooks.write().await;
            let log = webhooks
                .get_mut(&id)
                .ok_or_else(|| CoreError::NotFound(format!("webhook log {id}")))?;

            if !log.status.can_transition_to(next) {
                return Err(CoreError::InvalidTransition {
                    from: log.status.to_string(),
                    to: next.to_string(),
                }
                .into());
            }

            log.status = next;
            log.error_message = error_message.map(str::to_string);
            if next == WebhookStatus::Completed {
                log.processed_at = Some(Utc::now());
            }
            log.updated_at = Utc::now();
            Ok(())
        }

        async fn increment_attempts(&self, id: WebhookLogId) -> Result<i32> {
            let mut webhooks = self.webhooks.write().await;
            let log = webhooks
                .get_mut(&id)
                .ok_or_else(|| CoreError::NotFound(format!("webhook log {id}")))?;
            log.attempts += 1;
            Ok(log.attempts)
        }

        async fn find_webhooks(
            &self,
            status: WebhookStatus,
            limit: i64,
        ) -> Result<Vec<WebhookLog>> {
            let mut matching: Vec<WebhookLog> = self
                .webhooks
                .read()
                .await
                .values()
                .filter(|log| log.status == status)
                .cloned()
                .collect();
            matching.sort_by_key(|log| log.created_at);
            matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(matching)
        }

        async fn create_sync_log(
            &self,
            project_id: &str,
            data_type: &DataType,
        ) -> Result<SyncLogId> {
            if project_id.is_empty() {
                return Err(
                    CoreError::Validation("project_id must not be empty".to_string()).into()
                );
            }

            let now = Utc::now();
            let id = SyncLogId::new();
            self.syncs.write().await.insert(
                id,
                SyncLog {
                    id,
                    project_id: project_id.to_string(),
                    data_type: data_type.clone(),
                    status: SyncStatus::Pending,
                    records_synced: 0,
                    error_message: None,
                    started_at: None,
                    completed_at: None,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(id)
        }

        async fn transition_sync(
            &self,
            id: SyncLogId,
            next: SyncStatus,
            error_message: Option<&str>,
        ) -> Result<()> {
            if next == SyncStatus::Failed && error_message.is_none() {
                return Err(CoreError::Validation(
                    "transition to failed requires an error message".to_string(),
                )
                .into());
            }

            let mut syncs = self.syncs.write().await;
            let log =
                syncs.get_mut(&id).ok_or_else(|| CoreError::NotFound(format!("sync log {id}")))?;

            if !log.status.can_transition_to(next) {
                return Err(CoreError::InvalidTransition {
                    from: log.status.to_string(),
                    to: next.to_string(),
                }
                .into());
            }

            log.status = next;
            log.error_message = error_message.map(str::to_string);
            if next == SyncStatus::Running {
                log.started_at = Some(Utc::now());
            }
            if next.is_terminal() {
                log.completed_at = Some(Utc::now());
            }
            log.updated_at = Utc::now();
            Ok(())
        }

        async fn record_sync_progress(&self, id: SyncLogId, records_synced: i32) -> Result<()> {
            let mut syncs = self.syncs.write().await;
            let log =
                syncs.get_mut(&id).ok_or_else(|| CoreError::NotFound(format!("sync log {id}")))?;
            log.records_synced = records_synced;
            Ok(())
        }

        async fn find_sync(&self, id: SyncLogId) -> Result<Option<SyncLog>> {
            Ok(self.syncs.read().await.get(&id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{mock::MockJobStorage, *};
    use crate::error::JobError;

    #[tokio::test]
    async fn postgres_storage_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = PostgresJobStorage::new(Arc::new(Storage::new(pool)));
    }

    #[tokio::test]
    async fn mock_enforces_webhook_state_machine() {
        let storage = MockJobStorage::new();
        let id = storage.insert_webhook("p1", "payment.completed", json!({})).await;

        // completed requires processing first
        let err = storage
            .transition_webhook(id, WebhookStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Core(CoreError::InvalidTransition { .. })));

        storage.transition_webhook(id, WebhookStatus::Processing, None).await.unwrap();
        storage.transition_webhook(id, WebhookStatus::Completed, None).await.unwrap();

        let log = storage.webhook(id).await.unwrap();
        assert_eq!(log.status, WebhookStatus::Completed);
        assert!(log.processed_at.is_some());
        assert!(log.error_message.is_none());
    }

    #[tokio::test]
    async fn mock_distinguishes_missing_rows() {
        let storage = MockJobStorage::new();

        let err = storage
            .transition_webhook(WebhookLogId::new(), WebhookStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Core(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn mock_sync_stamps_lifecycle_timestamps() {
        let storage = MockJobStorage::new();
        let id = storage.create_sync_log("p1", &DataType::Users).await.unwrap();

        storage.transition_sync(id, SyncStatus::Running, None).await.unwrap();
        let log = storage.sync(id).await.unwrap();
        assert!(log.started_at.is_some());
        assert!(log.completed_at.is_none());

        storage.transition_sync(id, SyncStatus::Failed, Some("boom")).await.unwrap();
        let log = storage.sync(id).await.unwrap();
        assert!(log.completed_at.is_some());
        assert_eq!(log.error_message.as_deref(), Some("boom"));
    }
}
