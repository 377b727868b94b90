//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **SummaryError**: what went wrong while producing meeting minutes. One variant
//!   per failure kind (credential, model listing, upload, processing, generation, ...)
//!   so callers and tests can match on the kind instead of parsing message text.
//! - **AppError**: what the HTTP client sees. Every `SummaryError` converts into an
//!   `AppError`, which knows its status code and JSON body.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "processing",
//!     "message": "Remote file processing failed: ...",
//!     "stage": "processing_remote",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```
//! `stage` is only present when the failure happened inside the summary workflow.

use crate::gemini::ServiceError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Failure kinds of the meeting-minutes pipeline.
///
/// None of these are retried: each one ends the current request and the user has
/// to submit the recording again.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("API key is not configured. Set GOOGLE_API_KEY or send an api_key field with the upload")]
    MissingCredential,
    #[error("Failed to list models (is the API key valid?): {0}")]
    ModelListing(#[source] ServiceError),
    #[error("No model supporting generateContent is available for this API key")]
    NoModelAvailable,
    #[error("Unsupported upload: {0}")]
    InvalidUpload(String),
    #[error("Failed to stage the upload locally: {0}")]
    LocalFile(#[source] std::io::Error),
    #[error("Failed to upload the recording: {0}")]
    Upload(#[source] ServiceError),
    #[error("Remote file processing failed: {0}")]
    Processing(String),
    #[error("Remote file was still not ready after {attempts} checks ({elapsed_secs}s)")]
    PollTimeout { attempts: u32, elapsed_secs: u64 },
    #[error("Request cancelled before the summary was generated")]
    Cancelled,
    #[error("Failed to generate the summary: {0}")]
    Generation(String),
}

impl SummaryError {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SummaryError::MissingCredential => "missing_credential",
            SummaryError::ModelListing(_) => "model_listing",
            SummaryError::NoModelAvailable => "no_model_available",
            SummaryError::InvalidUpload(_) => "invalid_upload",
            SummaryError::LocalFile(_) => "local_file",
            SummaryError::Upload(_) => "upload",
            SummaryError::Processing(_) => "processing",
            SummaryError::PollTimeout { .. } => "poll_timeout",
            SummaryError::Cancelled => "cancelled",
            SummaryError::Generation(_) => "generation",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SummaryError::MissingCredential => StatusCode::UNAUTHORIZED,
            SummaryError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            SummaryError::LocalFile(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SummaryError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            SummaryError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            SummaryError::ModelListing(_)
            | SummaryError::NoModelAvailable
            | SummaryError::Upload(_)
            | SummaryError::Processing(_)
            | SummaryError::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500)
/// - **BadRequest**: Malformed multipart body or query (400)
/// - **ValidationError**: Well-formed request with unacceptable content (400)
/// - **Busy**: All workflow slots are taken (503)
/// - **Summary**: A pipeline failure outside a running workflow (credential, model choice)
/// - **Workflow**: A pipeline failure inside a running workflow, with the stage it failed in
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    ValidationError(String),
    Busy(String),
    Summary(SummaryError),
    Workflow {
        stage: &'static str,
        error: SummaryError,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Busy(msg) => write!(f, "Service busy: {}", msg),
            AppError::Summary(err) => write!(f, "{}", err),
            AppError::Workflow { stage, error } => write!(f, "{} (stage: {})", error, stage),
        }
    }
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Busy(_) => "busy",
            AppError::Summary(err) | AppError::Workflow { error: err, .. } => err.kind(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Summary(err) | AppError::Workflow { error: err, .. } => err.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Busy(msg) => msg.clone(),
            AppError::Summary(err) | AppError::Workflow { error: err, .. } => err.to_string(),
        };

        let mut body = json!({
            "type": self.error_type(),
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        if let AppError::Workflow { stage, .. } = self {
            body["stage"] = json!(stage);
        }

        HttpResponse::build(self.status_code()).json(json!({ "error": body }))
    }
}

impl From<SummaryError> for AppError {
    fn from(err: SummaryError) -> Self {
        AppError::Summary(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;
