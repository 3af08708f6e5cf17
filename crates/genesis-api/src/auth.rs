//! Bearer token authentication.
//!
//! Validates `Authorization: Bearer <token>` headers against stored
//! token hashes. Malformed credentials are rejected before any store
//! lookup; expiry is checked against the injected clock so the decision
//! is testable without a database.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use genesis_core::{storage::api_tokens, ApiToken, Clock, CoreError, TokenId};
use serde_json::json;
use tracing::warn;

use crate::crypto::{hash_token, timing_safe_eq};

/// Token persistence operations the validator needs.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Looks up a token row by hash.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, CoreError>;

    /// Stamps `last_used_at`. Failures are the caller's to ignore.
    async fn touch_last_used(&self, id: TokenId) -> Result<(), CoreError>;
}

/// Production [`TokenStore`] over the api_tokens repository.
pub struct PgTokenStore {
    repo: Arc<api_tokens::Repository>,
}

impl PgTokenStore {
    /// Wraps the repository.
    pub fn new(repo: Arc<api_tokens::Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, CoreError> {
        self.repo.find_by_hash(token_hash).await
    }

    async fn touch_last_used(&self, id: TokenId) -> Result<(), CoreError> {
        self.repo.touch_last_used(id).await
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The validated token.
    pub token_id: TokenId,
    /// Project the token is bound to.
    pub project_id: String,
    /// Owning user, when user-scoped.
    pub user_id: Option<String>,
    /// Granted permission strings.
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Whether the token grants `scope`, either exactly or via the `*`
    /// wildcard.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == "*")
    }
}

/// Authentication failures.
#[derive(Debug)]
pub enum AuthError {
    /// The Authorization header is missing.
    MissingHeader,
    /// The Authorization header is not a non-empty Bearer credential.
    Malformed,
    /// The token is unknown or expired.
    InvalidToken,
    /// A storage error occurred during validation.
    Database(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::MissingHeader => {
                (StatusCode::UNAUTHORIZED, "missing_header", "Missing Authorization header")
            },
            Self::Malformed => {
                (StatusCode::UNAUTHORIZED, "malformed_credentials", "Malformed Authorization header")
            },
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", "Invalid API token"),
            Self::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal error")
            },
        };

        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}

/// Validates bearer tokens against a [`TokenStore`].
pub struct TokenValidator {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenValidator {
    /// Creates a validator over `store`, reading time from `clock`.
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Validates an Authorization header value.
    ///
    /// Shape checks run first so malformed requests never reach the
    /// store. On success the token's `last_used_at` is stamped on a
    /// detached task; a failed stamp only logs.
    pub async fn validate(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let raw = header.strip_prefix("Bearer ").ok_or(AuthError::Malformed)?;
        if raw.is_empty() {
            return Err(AuthError::Malformed);
        }

        let hashed = hash_token(raw);
        let token = self
            .store
            .find_by_hash(&hashed)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?
            .ok_or(AuthError::InvalidToken)?;

        if !timing_safe_eq(&token.token_hash, &hashed) {
            return Err(AuthError::InvalidToken);
        }
        if !token.is_live_at(self.clock.now_utc()) {
            return Err(AuthError::InvalidToken);
        }

        let store = self.store.clone();
        let token_id = token.id;
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(token_id).await {
                warn!(token_id = %token_id, error = %e, "failed to stamp last_used_at");
            }
        });

        Ok(AuthContext {
            token_id: token.id,
            project_id: token.project_id,
            user_id: token.user_id,
            scopes: token.scopes.0,
        })
    }
}

/// Axum middleware that authenticates requests and injects
/// [`AuthContext`] into request extensions.
pub async fn auth_middleware(
    State(validator): State<Arc<TokenValidator>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let context = validator.validate(header.as_deref()).await?;
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, Utc};
    use genesis_core::TestClock;
    use tokio::sync::RwLock;

    use super::*;

    /// Store with a lookup counter, so tests can prove malformed
    /// credentials never reach it.
    pub(crate) struct MockTokenStore {
        tokens: RwLock<Vec<ApiToken>>,
        pub(crate) lookups: AtomicUsize,
        pub(crate) touches: AtomicUsize,
    }

    impl MockTokenStore {
        pub(crate) fn new() -> Self {
            Self {
                tokens: RwLock::new(Vec::new()),
                lookups: AtomicUsize::new(0),
                touches: AtomicUsize::new(0),
            }
        }

        pub(crate) async fn insert(&self, token: ApiToken) {
            self.tokens.write().await.push(token);
        }
    }

    #[async_trait]
    impl TokenStore for MockTokenStore {
        async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, CoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.tokens.read().await.iter().find(|t| t.token_hash == token_hash).cloned())
        }

        async fn touch_last_used(&self, _id: TokenId) -> Result<(), CoreError> {
            self.touches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn token_row(raw: &str, scopes: Vec<String>, expires_in: Option<Duration>) -> ApiToken {
        let now = Utc::now();
        ApiToken {
            id: TokenId::new(),
            project_id: "p1".into(),
            user_id: None,
            token_hash: hash_token(raw),
            name: Some("test token".into()),
            scopes: sqlx::types::Json(scopes),
            last_used_at: None,
            expires_at: expires_in.map(|d| now + d),
            created_at: now,
            updated_at: now,
        }
    }

    fn validator(store: Arc<MockTokenStore>) -> TokenValidator {
        TokenValidator::new(store, Arc::new(TestClock::new()))
    }

    #[tokio::test]
    async fn missing_and_malformed_headers_skip_the_store() {
        let store = Arc::new(MockTokenStore::new());
        let v = validator(store.clone());

        assert!(matches!(v.validate(None).await, Err(AuthError::MissingHeader)));
        assert!(matches!(v.validate(Some("Basic abc")).await, Err(AuthError::Malformed)));
        assert!(matches!(v.validate(Some("Bearer ")).await, Err(AuthError::Malformed)));
        assert!(matches!(v.validate(Some("tok_raw")).await, Err(AuthError::Malformed)));

        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let store = Arc::new(MockTokenStore::new());
        let v = validator(store.clone());

        assert!(matches!(v.validate(Some("Bearer nope")).await, Err(AuthError::InvalidToken)));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn valid_token_yields_context_and_touches_last_used() {
        let store = Arc::new(MockTokenStore::new());
        store
            .insert(token_row("tok_ok", vec!["webhooks:ingest".into()], None))
            .await;
        let v = validator(store.clone());

        let ctx = v.validate(Some("Bearer tok_ok")).await.unwrap();
        assert_eq!(ctx.project_id, "p1");
        assert!(ctx.has_scope("webhooks:ingest"));
        assert!(!ctx.has_scope("admin"));

        // last_used stamp happens on a detached task
        tokio::task::yield_now().await;
        assert_eq!(store.touches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let store = Arc::new(MockTokenStore::new());
        store
            .insert(token_row("tok_old", vec!["*".into()], Some(Duration::seconds(-5))))
            .await;
        let v = validator(store.clone());

        assert!(matches!(
            v.validate(Some("Bearer tok_old")).await,
            Err(AuthError::InvalidToken)
        ));
        // Expired tokens never get a last_used stamp
        tokio::task::yield_now().await;
        assert_eq!(store.touches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wildcard_scope_grants_everything() {
        let store = Arc::new(MockTokenStore::new());
        store.insert(token_row("tok_root", vec!["*".into()], None)).await;
        let v = validator(store);

        let ctx = v.validate(Some("Bearer tok_root")).await.unwrap();
        assert!(ctx.has_scope("webhooks:ingest"));
        assert!(ctx.has_scope("anything:else"));
    }
}
