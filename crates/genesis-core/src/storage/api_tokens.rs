//! Repository for API token database operations.
//!
//! Stores only token hashes. Expiry and scope decisions live in the
//! validator so they can be tested against any token store; this layer
//! just persists and fetches rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::{CoreError, Result},
    models::{ApiToken, TokenId},
};

const COLUMNS: &str = "id, project_id, user_id, token_hash, name, scopes, \
                       last_used_at, expires_at, created_at, updated_at";

/// Parameters for issuing a new API token row.
#[derive(Debug, Clone)]
pub struct NewToken {
    /// Project the token is bound to.
    pub project_id: String,
    /// Owning user, when user-scoped.
    pub user_id: Option<String>,
    /// SHA-256 hex digest of the raw secret.
    pub token_hash: String,
    /// Optional human-readable label.
    pub name: Option<String>,
    /// Permission strings.
    pub scopes: Vec<String>,
    /// Expiry instant; `None` means non-expiring.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Repository for API token database operations.
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

    /// Persists a new token row.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for empty project or hash, or
    /// `CoreError::ConstraintViolation` when the hash already exists.
    pub async fn create(&self, token: &NewToken) -> Result<TokenId> {
        if token.project_id.is_empty() {
            return Err(CoreError::Validation("project_id must not be empty".to_string()));
        }
        if token.token_hash.is_empty() {
            return Err(CoreError::Validation("token_hash must not be empty".to_string()));
        }

        let id = TokenId::new();

        sqlx::query(
            r#"
            INSERT INTO genesis_api_tokens (
                id, project_id, user_id, token_hash, name, scopes, expires_at,
                created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, NOW(), NOW()
            )
            "#,
        )
        .bind(id)
        .bind(&token.project_id)
        .bind(&token.user_id)
        .bind(&token.token_hash)
        .bind(&token.name)
        .bind(sqlx::types::Json(&token.scopes))
        .bind(token.expires_at)
        .execute(&*self.pool)
        .await?;

        Ok(id)
    }

    /// Looks up a token by its hash.
    ///
    /// Returns the row regardless of expiry; the validator applies the
    /// expiry check against its own clock.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>> {
        let token = sqlx::query_as::<_, ApiToken>(&format!(
            "SELECT {COLUMNS} FROM genesis_api_tokens WHERE token_hash = $1",
        ))
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(token)
    }

    /// Stamps `last_used_at` on a token.
    ///
    /// Callers treat failures as non-fatal; a missed stamp never blocks an
    /// otherwise valid request.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn touch_last_used(&self, id: TokenId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE genesis_api_tokens
            SET last_used_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Revokes a token by deleting its row.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` if no row matched.
    pub async fn delete(&self, id: TokenId) -> Result<()> {
        let result = sqlx::query("DELETE FROM genesis_api_tokens WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("api token {id}")));
        }

        Ok(())
    }

    /// Deletes tokens whose expiry has passed. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM genesis_api_tokens WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected())
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
    async fn create_rejects_empty_hash() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let repo = Repository::new(Arc::new(pool));

        let err = repo
            .create(&NewToken {
                project_id: "proj-1".into(),
                user_id: None,
                token_hash: String::new(),
                name: None,
                scopes: vec!["*".into()],
                expires_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
