//! Webhook ingestion endpoint.
//!
//! Accepts an event for the authenticated project, persists a pending
//! log row, and enqueues it for asynchronous processing. Replies 202
//! before any handler runs.

use axum::{extract::State, http::StatusCode, Extension, Json};
use genesis_core::{CoreError, WebhookLogId};
use genesis_jobs::{queue::WebhookJob, JobError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::ErrorResponse;
use crate::{auth::AuthContext, server::AppState};

/// Scope required to post events.
pub const INGEST_SCOPE: &str = "webhooks:ingest";

/// Incoming event envelope.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Event type, e.g. `payment.completed`.
    pub event: String,
    /// Event payload, stored verbatim.
    #[serde(default)]
    pub data: Value,
}

/// Accepted-event reply.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Identifier of the persisted log row.
    pub log_id: WebhookLogId,
    /// Initial processing status.
    pub status: &'static str,
}

/// POST /genesis/webhook
#[instrument(skip(state, ctx, req), fields(project_id = %ctx.project_id, event = %req.event))]
pub async fn ingest(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), ErrorResponse> {
    if !ctx.has_scope(INGEST_SCOPE) {
        return Err(ErrorResponse::forbidden(format!("requires scope {INGEST_SCOPE}")));
    }
    if req.event.is_empty() {
        return Err(ErrorResponse::bad_request("event must not be empty"));
    }

    let log_id = state
        .webhooks
        .create_webhook(&ctx.project_id, &req.event, req.data)
        .await
        .map_err(|e| match e {
            JobError::Core(CoreError::Validation(msg)) => ErrorResponse::bad_request(msg),
            other => {
                tracing::error!(error = %other, "failed to persist webhook event");
                ErrorResponse::internal()
            },
        })?;

    state.queue.enqueue(WebhookJob::new(log_id)).await.map_err(|e| {
        tracing::error!(error = %e, log_id = %log_id, "failed to enqueue webhook job");
        ErrorResponse::internal()
    })?;

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { log_id, status: "pending" })))
}
