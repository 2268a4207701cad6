//! Structured error payload

use serde::{Deserialize, Serialize};

/// Category of a failed job API call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The submission was malformed; nothing was spawned
    Validation,
    /// Unknown job id, or a result requested from a failed/cancelled job
    NotFound,
    /// A result was requested before the job completed
    NotReady,
    Internal,
}

/// Error body returned by every failing job API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
