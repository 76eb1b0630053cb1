//! CoreError to HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::errors::CoreError;

/// Wrapper that turns a [`CoreError`] into a JSON error response.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            CoreError::Invalid { .. } => (StatusCode::BAD_REQUEST, "invalid"),
            CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            CoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            CoreError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if matches!(self.0, CoreError::Internal(_)) {
            tracing::error!(error = %self.0, "internal error surfaced to client");
        }

        let mut body = json!({
            "error": { "kind": kind, "message": self.0.to_string() }
        });
        if let CoreError::Invalid { field, .. } = &self.0 {
            body["error"]["field"] = json!(field);
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
