//! Repository for webhook log database operations.
//!
//! Owns the webhook state machine at the SQL level: every status change
//! is a compare-and-set against the set of statuses allowed to precede
//! the target, so a stale or duplicate worker can never overwrite a
//! terminal row.

use std::sync::Arc;

use serde_json::Value;
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{WebhookLog, WebhookLogId, WebhookStatus},
};

const COLUMNS: &str = "id, project_id, event_type, payload, status, error_message, \
                       attempts, processed_at, created_at, updated_at";

/// Repository for webhook log database operations.
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

    /// Creates a new webhook log in `pending` status with zero attempts.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if `project_id` or `event_type` is
    /// empty, or a database error if the insert fails.
    pub async fn create(
        &self,
        project_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<WebhookLogId> {
        if project_id.is_empty() {
            return Err(CoreError::Validation("project_id must not be empty".to_string()));
        }
        if event_type.is_empty() {
            return Err(CoreError::Validation("event_type must not be empty".to_string()));
        }

        let id = WebhookLogId::new();

        sqlx::query(
            r#"
            INSERT INTO genesis_webhook_logs (
                id, project_id, event_type, payload, status, attempts, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, 'pending', 0, NOW(), NOW()
            )
            "#,
        )
        .bind(id)
        .bind(project_id)
        .bind(event_type)
        .bind(sqlx::types::Json(payload))
        .execute(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Finds a webhook log by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: WebhookLogId) -> Result<Option<WebhookLog>> {
        let log = sqlx::query_as::<_, WebhookLog>(&format!(
            "SELECT {COLUMNS} FROM genesis_webhook_logs WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(log)
    }

    /// Moves a webhook log to `next` status.
    ///
    /// The update only matches rows whose current status is allowed to
    /// precede `next`; when no row matches, a follow-up read distinguishes
    /// a missing row from an illegal transition.
    ///
    /// `completed` stamps `processed_at` and clears any stale error.
    /// `failed` requires an error message.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when moving to `failed` without an
    /// error message, `CoreError::NotFound` when the row does not exist,
    /// or `CoreError::InvalidTransition` when the state machine forbids
    /// the move.
    pub async fn transition(
        &self,
        id: WebhookLogId,
        next: WebhookStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        if next == WebhookStatus::Failed && error_message.is_none() {
            return Err(CoreError::Validation(
                "transition to failed requires an error message".to_string(),
            ));
        }

        let allowed: Vec<String> =
            WebhookStatus::allowed_prior(next).iter().map(ToString::to_string).collect();

        let result = sqlx::query(
            r#"
            UPDATE genesis_webhook_logs
            SET status = $2,
                error_message = $3,
                processed_at = CASE WHEN $2 = 'completed' THEN NOW() ELSE processed_at END,
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
                None => Err(CoreError::NotFound(format!("webhook log {id}"))),
            };
        }

        Ok(())
    }

    /// Increments the attempt counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if the row does not exist.
    pub async fn increment_attempts(&self, id: WebhookLogId) -> Result<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE genesis_webhook_logs
            SET attempts = attempts + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        attempts.ok_or_else(|| CoreError::NotFound(format!("webhook log {id}")))
    }

    /// Finds logs in a given status, oldest first.
    ///
    /// Used at startup to re-enqueue work left `pending` by a previous
    /// process.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_status(
        &self,
        status: WebhookStatus,
        limit: i64,
    ) -> Result<Vec<WebhookLog>> {
        let logs = sqlx::query_as::<_, WebhookLog>(&format!(
            r#"
            SELECT {COLUMNS} FROM genesis_webhook_logs
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        ))
        .bind(status.to_string())
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Finds recent logs for a project and event type, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_event_type(
        &self,
        project_id: &str,
        event_type: &str,
        limit: i64,
    ) -> Result<Vec<WebhookLog>> {
        let logs = sqlx::query_as::<_, WebhookLog>(&format!(
            r#"
            SELECT {COLUMNS} FROM genesis_webhook_logs
            WHERE project_id = $1 AND event_type = $2
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        ))
        .bind(project_id)
        .bind(event_type)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Counts logs by status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self, status: WebhookStatus) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM genesis_webhook_logs WHERE status = $1")
                .bind(status.to_string())
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }
}
