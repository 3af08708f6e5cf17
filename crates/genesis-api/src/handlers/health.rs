//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::server::AppState;

/// GET /health. Process liveness only.
pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready. Verifies database connectivity.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        },
    }
}
