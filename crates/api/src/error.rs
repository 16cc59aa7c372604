use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use backdrop_comfyui::api::{SubmitError, UploadError, ViewError};
use backdrop_comfyui::poller::PollError;
use backdrop_comfyui::workflow::TemplateError;
use backdrop_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the per-layer error enums and implements [`IntoResponse`] to
/// produce consistent JSON error responses. The mapping keeps the
/// distinctions the orchestration layer worked to preserve: caller
/// mistakes are 400, deployment defects and backend rejections are
/// 500, transport and protocol trouble with the backend is 502, and a
/// generation that outlives its budget is 504.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `backdrop_core` (mostly validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Template loading or compilation failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Workflow submission failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// Polling for completion failed.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// Uploading the input image failed.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Fetching the produced artifact failed.
    #[error(transparent)]
    Artifact(#[from] ViewError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = classify(&self);

        // Client-facing messages for 5xx are coarse; the full cause
        // (backend status codes, exception text) goes to the log.
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

/// Map an error onto an HTTP status, stable error code, and message.
fn classify(err: &AppError) -> (StatusCode, &'static str, String) {
    match err {
        AppError::Core(core) => match core {
            CoreError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            CoreError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Service is misconfigured".to_string(),
            ),
            CoreError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        },

        // A template/bindings mismatch is a deployment defect; the
        // caller cannot fix it and a retry will not help.
        AppError::Template(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "CONFIG_ERROR",
            "Workflow configuration is invalid".to_string(),
        ),

        AppError::Submit(submit) => match submit {
            SubmitError::Transport(_) => (
                StatusCode::BAD_GATEWAY,
                "BACKEND_UNREACHABLE",
                "Generation backend is unreachable".to_string(),
            ),
            SubmitError::Rejected { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "BACKEND_REJECTED",
                "Generation backend rejected the job".to_string(),
            ),
            SubmitError::MalformedResponse(_) => (
                StatusCode::BAD_GATEWAY,
                "BACKEND_PROTOCOL_ERROR",
                "Generation backend sent an unusable response".to_string(),
            ),
        },

        AppError::Poll(poll) => match poll {
            PollError::Timeout { .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "GENERATION_TIMEOUT",
                "Generation did not finish in time".to_string(),
            ),
            PollError::Transport(_) => (
                StatusCode::BAD_GATEWAY,
                "BACKEND_UNREACHABLE",
                "Generation backend is unreachable".to_string(),
            ),
            PollError::MissingOutput { .. } | PollError::MalformedStatus(_) => (
                StatusCode::BAD_GATEWAY,
                "BACKEND_PROTOCOL_ERROR",
                "Generation backend sent an unusable response".to_string(),
            ),
            PollError::Failed { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_FAILED",
                "Image generation failed".to_string(),
            ),
            PollError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                "Server is shutting down".to_string(),
            ),
        },

        AppError::Upload(_) => (
            StatusCode::BAD_GATEWAY,
            "BACKEND_UNREACHABLE",
            "Failed to upload the input image to the generation backend".to_string(),
        ),

        AppError::Artifact(_) => (
            StatusCode::BAD_GATEWAY,
            "ARTIFACT_FETCH_FAILED",
            "Failed to fetch the generated image".to_string(),
        ),

        AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
    }
}
