//! Request handlers.

pub mod health;
pub mod ingest;
pub mod sync;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;

/// JSON error reply in the shared `{"error": {...}}` envelope.
#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ErrorResponse {
    /// 400 with a validation code.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, code: "validation_error", message: message.into() }
    }

    /// 403 for a missing scope.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self { status: StatusCode::FORBIDDEN, code: "insufficient_scope", message: message.into() }
    }

    /// 500 with the detail kept out of the body.
    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: "Internal error".into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}
