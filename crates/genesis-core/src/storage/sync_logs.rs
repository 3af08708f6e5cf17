//! Repository for sync log database operations.
//!
//! Sync attempts are append-only: a retry creates a fresh row instead of
//! rewinding an existing one, so the table doubles as attempt history.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{DataType, SyncLog, SyncLogId, SyncStatus},
};

const COLUMNS: &str = "id, project_id, data_type, status, records_synced, error_message, \
                       started_at, completed_at, created_at, updated_at";

/// Repository for sync log database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Creates a new sync log in `pending` status.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `project_id` is empty, or a
    /// database error if the insert fails.
    pub async fn create(&self, project_id: &str, data_type: &DataType) -> Result<SyncLogId> {
        if project_id.is_empty() {
            return Err(CoreError::Validation("project_id must not be empty".to_string()));
        }

        let id = SyncLogId::new();

        sqlx::query(
            r#"
            INSERT INTO genesis_sync_logs (
                id, project_id, data_type, status, records_synced, created_at, updated_at
            ) VALUES (
                $1, $2, $3, 'pending', 0, NOW(), NOW()
            )
            "#,
        )
        .bind(id)
        .bind(project_id)
        .bind(data_type)
        .execute(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Finds a sync log by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: SyncLogId) -> Result<Option<SyncLog>> {
        let log = sqlx::query_as::<_, SyncLog>(&format!(
            "SELECT {COLUMNS} FROM genesis_sync_logs WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(log)
    }

    /// Moves a sync log to `next` status with a compare-and-set update.
    ///
    /// `running` stamps `started_at`; terminal states stamp `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when moving to `failed` without an
    /// error message, `CoreError::NotFound` when the row does not exist,
    /// or `CoreError::InvalidTransition` when the state machine forbids
    /// the move.
    pub async fn transition(
        &self,
        id: SyncLogId,
        next: SyncStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if next == SyncStatus::Failed && error_message.is_none() {
            return Err(CoreError::Validation(
                "transition to failed requires an error message".to_string(),
            ));
        }

        let allowed: Vec<String> =
            SyncStatus::allowed_prior(next).iter().map(ToString::to_string).collect();

        let result = sqlx::query(
            r#"
            UPDATE genesis_sync_logs
            SET status = $2,
                error_message = $3,
                started_at = CASE WHEN $2 = 'running' THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN NOW()
                               ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id)
        .bind(next.to_string())
        .bind(error_message)
        .bind(&allowed)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(id).await? {
                Some(log) => Err(CoreError::InvalidTransition {
                    from: log.status.to_string(),
                    to: next.to_string(),
                }),
                None => Err(CoreError::NotFound(format!("sync log {id}"))),
            };
        }

        Ok(())
    }

    /// Records how many records the sync fetched.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the row does not exist.
    pub async fn record_progress(&self, id: SyncLogId, records_synced: i32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE genesis_sync_logs
            SET records_synced = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(records_synced)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("sync log {id}")));
        }

        Ok(())
    }

    /// Finds the most recent sync log for a project and data type.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_latest(
        &self,
        project_id: &str,
        data_type: &DataType,
    ) -> Result<Option<SyncLog>> {
        let log = sqlx::query_as::<_, SyncLog>(&format!(
            r#"
            SELECT {COLUMNS} FROM genesis_sync_logs
            WHERE project_id = $1 AND data_type = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        ))
        .bind(project_id)
        .bind(data_type)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(log)
    }

    /// Counts sync logs by status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self, status: SyncStatus) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM genesis_sync_logs WHERE status = $1")
                .bind(status.to_string())
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }

    #[tokio::test]
    async fn create_rejects_empty_project() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let repo = Repository::new(Arc::new(pool));

        let err = repo.create("", &DataType::Users).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_transition_requires_error_message() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let repo = Repository::new(Arc::new(pool));

        let err =
            repo.transition(SyncLogId::new(), SyncStatus::Failed, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
