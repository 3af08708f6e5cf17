//! Router-level scenarios: health probes, auth rejection paths, scope
//! enforcement, and the sync trigger running end to end over mocks.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use genesis_api::{
    auth::TokenStore, create_router, crypto::hash_token, AppState, TokenValidator,
};
use genesis_cache::{CacheConfig, CacheService, MemoryBackend};
use genesis_core::{
    ApiToken, CoreError, DataType, RealClock, Storage, SyncStatus, TokenId, WebhookLogId,
    WebhookStatus,
};
use genesis_jobs::{
    client::GenesisApi,
    queue::{JobQueue, MemoryQueue, WebhookJob},
    storage::{mock::MockJobStorage, JobStorage},
    sync::{SyncProcessor, SyncTtlConfig},
    JobError,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

struct StaticTokenStore {
    tokens: Vec<ApiToken>,
    lookups: AtomicUsize,
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, CoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tokens.iter().find(|t| t.token_hash == token_hash).cloned())
    }

    async fn touch_last_used(&self, _id: TokenId) -> Result<(), CoreError> {
        Ok(())
    }
}

struct StubApi;

#[async_trait]
impl GenesisApi for StubApi {
    async fn fetch(&self, _data_type: &DataType, _project_id: &str) -> Result<Vec<Value>, JobError> {
        Ok(vec![json!({"id": 1}), json!({"id": 2})])
    }
}

fn token_row(raw: &str, scopes: Vec<String>) -> ApiToken {
    let now = Utc::now();
    ApiToken {
        id: TokenId::new(),
        project_id: "p1".into(),
        user_id: None,
        token_hash: hash_token(raw),
        name: None,
        scopes: sqlx::types::Json(scopes),
        last_used_at: None,
        expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

struct Harness {
    router: Router,
    job_storage: Arc<MockJobStorage>,
    queue: Arc<MemoryQueue>,
}

/// Builds a router over mocks. The pool is lazy and never connected;
/// tests here stay off the paths that would touch it.
fn harness(tokens: Vec<ApiToken>) -> Harness {
    let clock = Arc::new(RealClock);
    let pool = PgPoolOptions::new().connect_lazy("postgresql://test").unwrap();
    let storage = Arc::new(Storage::new(pool));
    let queue = Arc::new(MemoryQueue::new(clock.clone()));
    let job_storage = Arc::new(MockJobStorage::new());
    let cache = Arc::new(CacheService::new(
        Arc::new(MemoryBackend::new(clock.clone())),
        CacheConfig::default(),
    ));
    let sync = Arc::new(SyncProcessor::new(
        job_storage.clone(),
        Arc::new(StubApi),
        cache,
        SyncTtlConfig::default(),
    ));
    let store = Arc::new(StaticTokenStore { tokens, lookups: AtomicUsize::new(0) });
    let validator = Arc::new(TokenValidator::new(store, clock));

    let router = create_router(AppState {
        storage,
        webhooks: job_storage.clone(),
        queue: queue.clone(),
        sync,
        validator,
    });
    Harness { router, job_storage, queue }
}

fn post_json(uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(value) = auth {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_reachable_without_credentials() {
    let h = harness(vec![]);

    let response = h
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn webhook_route_rejects_missing_and_malformed_credentials() {
    let h = harness(vec![]);

    let response = h
        .router
        .clone()
        .oneshot(post_json("/genesis/webhook", None, json!({"event": "payment.completed"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "missing_header");

    let response = h
        .router
        .oneshot(post_json(
            "/genesis/webhook",
            Some("Basic xyz"),
            json!({"event": "payment.completed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_ingest_persists_pending_log_and_enqueues_job() {
    let h = harness(vec![token_row("tok_ingest", vec!["webhooks:ingest".into()])]);

    let response = h
        .router
        .oneshot(post_json(
            "/genesis/webhook",
            Some("Bearer tok_ingest"),
            json!({"event": "payment.completed", "data": {"payment_id": "pay-1"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");

    let log_id: WebhookLogId = serde_json::from_value(body["log_id"].clone()).unwrap();
    let log = h.job_storage.webhook(log_id).await.expect("log row missing");
    assert_eq!(log.status, WebhookStatus::Pending);
    assert_eq!(log.project_id, "p1");
    assert_eq!(log.event_type, "payment.completed");
    assert_eq!(log.payload.0, json!({"payment_id": "pay-1"}));

    assert_eq!(h.queue.len().await, 1);
    assert_eq!(h.queue.dequeue().await, Some(WebhookJob::new(log_id)));
}

#[tokio::test]
async fn webhook_ingest_rejects_empty_event_before_any_row_exists() {
    let h = harness(vec![token_row("tok_ingest", vec!["webhooks:ingest".into()])]);

    let response = h
        .router
        .oneshot(post_json("/genesis/webhook", Some("Bearer tok_ingest"), json!({"event": ""})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(h
        .job_storage
        .find_webhooks(WebhookStatus::Pending, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(h.queue.is_empty().await);
}

#[tokio::test]
async fn sync_trigger_requires_the_sync_scope() {
    let h = harness(vec![token_row("tok_ingest_only", vec!["webhooks:ingest".into()])]);

    let response = h
        .router
        .oneshot(post_json(
            "/genesis/sync",
            Some("Bearer tok_ingest_only"),
            json!({"data_type": "users"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "insufficient_scope");
}

#[tokio::test]
async fn sync_trigger_accepts_and_runs_for_the_token_project() {
    let h = harness(vec![token_row("tok_sync", vec!["sync:run".into()])]);

    let response = h
        .router
        .oneshot(post_json("/genesis/sync", Some("Bearer tok_sync"), json!({"data_type": "users"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");

    // The spawned sync settles its log row against the mock storage.
    let mut settled = None;
    for _ in 0..50 {
        tokio::task::yield_now().await;
        if let Some(log) = h.job_storage.latest_sync("p1", &DataType::Users).await {
            if log.status.is_terminal() {
                settled = Some(log);
                break;
            }
        }
    }
    let log = settled.expect("sync never settled");
    assert_eq!(log.status, SyncStatus::Completed);
    assert_eq!(log.records_synced, 2);
}

#[tokio::test]
async fn sync_trigger_rejects_empty_data_type() {
    let h = harness(vec![token_row("tok_sync", vec!["sync:run".into()])]);

    let response = h
        .router
        .oneshot(post_json("/genesis/sync", Some("Bearer tok_sync"), json!({"data_type": ""})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
