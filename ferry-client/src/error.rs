//! Error types for the Ferry client

use ferry_core::dto::error::{ErrorBody, ErrorKind};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the Ferry client
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error category, when the server sent a structured body
        kind: Option<ErrorKind>,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Create an API error from status code and response body
    ///
    /// Structured `ErrorBody` payloads are unpacked; anything else is kept
    /// verbatim as the message.
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Self::ApiError {
                status,
                kind: Some(parsed.kind),
                message: parsed.message,
            },
            Err(_) => Self::ApiError {
                status,
                kind: None,
                message: body,
            },
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error means the job has not finished yet
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::ApiError {
                kind: Some(ErrorKind::NotReady),
                ..
            }
        )
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_body_is_unpacked() {
        let err = ClientError::api_error(
            409,
            r#"{"kind":"not_ready","message":"job has not finished yet"}"#,
        );
        assert!(err.is_not_ready());
        assert!(err.is_client_error());
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "API error (status 409): job has not finished yet"
        );
    }

    #[test]
    fn test_plain_body_is_kept() {
        let err = ClientError::api_error(404, "Not Found");
        assert!(err.is_not_found());
        assert!(!err.is_not_ready());
        match err {
            ClientError::ApiError { kind, message, .. } => {
                assert!(kind.is_none());
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_server_error() {
        let err = ClientError::api_error(503, r#"{"kind":"internal","message":"shutting down"}"#);
        assert!(err.is_server_error());
        assert!(!err.is_client_error());
    }
}
