use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use imagegen_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `imagegen_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A failure inside the server itself, such as a panicking handler.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => {
                let (status, code) = classify_core_error(core);
                (status, code, core.to_string())
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
        }

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Response for a handler that panicked, in the standard error envelope.
///
/// Installed through `CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    AppError::InternalError(format!("handler panicked: {detail}")).into_response()
}

/// Map a domain error to its HTTP status and machine-readable code.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        CoreError::BackendUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
        }
        CoreError::TemplateNotFound(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_NOT_FOUND")
        }
        CoreError::SubmissionRejected(_) => (StatusCode::BAD_GATEWAY, "SUBMISSION_REJECTED"),
        CoreError::JobNotFound(_) => (StatusCode::NOT_FOUND, "JOB_NOT_FOUND"),
        CoreError::ResultNotReady(_) => (StatusCode::CONFLICT, "RESULT_NOT_READY"),
        CoreError::ArtifactNotFound(_) => (StatusCode::NOT_FOUND, "ARTIFACT_NOT_FOUND"),
    }
}
