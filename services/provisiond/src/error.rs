//! API error mapping
//!
//! Translates the lifecycle error taxonomy into HTTP status codes. The body
//! is always a small JSON object naming the failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lifecycle::LifecycleError;
use serde_json::json;
use tracing::error;

/// Errors a handler can return
#[derive(Debug)]
pub enum ApiError {
    /// Lookup target does not exist
    NotFound(String),
    /// Anything the lifecycle core raised
    Lifecycle(LifecycleError),
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        ApiError::Lifecycle(e)
    }
}

impl ApiError {
    /// Treat a Validation error as a missing resource (status queries)
    pub fn not_found_on_validation(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Validation(msg) => ApiError::NotFound(msg),
            other => ApiError::Lifecycle(other),
        }
    }
}

/// Status code for a lifecycle error, looking through step tagging
fn status_for(e: &LifecycleError) -> StatusCode {
    match e {
        LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
        LifecycleError::Capacity { .. } => StatusCode::CONFLICT,
        LifecycleError::ProviderCall { .. } | LifecycleError::RemoteShell { .. } => {
            StatusCode::BAD_GATEWAY
        }
        LifecycleError::Provisioning { source, .. } => status_for(source),
        LifecycleError::Configuration(_)
        | LifecycleError::Persistence(_)
        | LifecycleError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Lifecycle(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    error!("Request failed: {}", e);
                }
                (status, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
