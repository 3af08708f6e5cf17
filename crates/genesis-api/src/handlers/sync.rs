//! Sync trigger endpoint.
//!
//! An external scheduler posts here to refresh one dataset for the
//! authenticated project. The sync runs on a detached task; callers
//! poll the returned log row for the outcome.

use axum::{extract::State, http::StatusCode, Extension, Json};
use genesis_core::DataType;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ErrorResponse;
use crate::{auth::AuthContext, server::AppState};

/// Scope required to trigger syncs.
pub const SYNC_SCOPE: &str = "sync:run";

/// Sync trigger request.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Dataset to refresh, e.g. `users`.
    pub data_type: String,
}

/// Accepted-sync reply.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    /// Dataset being refreshed.
    pub data_type: String,
    /// Initial sync status.
    pub status: &'static str,
}

/// POST /genesis/sync
#[instrument(skip(state, ctx, req), fields(project_id = %ctx.project_id, data_type = %req.data_type))]
pub async fn trigger(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncResponse>), ErrorResponse> {
    if !ctx.has_scope(SYNC_SCOPE) {
        return Err(ErrorResponse::forbidden(format!("requires scope {SYNC_SCOPE}")));
    }
    if req.data_type.is_empty() {
        return Err(ErrorResponse::bad_request("data_type must not be empty"));
    }

    let data_type = DataType::parse(&req.data_type);
    let sync = state.sync.clone();
    let project_id = ctx.project_id.clone();
    tokio::spawn(async move {
        if let Err(e) = sync.run(&project_id, &data_type).await {
            tracing::warn!(project_id = %project_id, data_type = %data_type, error = %e, "sync failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(SyncResponse { data_type: req.data_type, status: "pending" })))
}
