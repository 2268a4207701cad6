//! API Error Handling
//!
//! Unified error type and conversion for API responses. Every error body is
//! an `ErrorBody` with a machine-readable kind and a message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferry_core::dto::error::{ErrorBody, ErrorKind};
use ferry_engine::JobError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    /// Error raised by the job engine
    Job(JobError),
    /// Malformed request rejected before reaching the engine
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Job(err) => {
                let status = match &err {
                    JobError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                    other => status_for(other.kind()),
                };
                if status.is_server_error() {
                    tracing::error!("Job API error: {}", err);
                }
                (status, err.to_body())
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody::new(ErrorKind::Validation, message),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::Job(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotReady => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
