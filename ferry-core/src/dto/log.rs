//! Log DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A window onto a job's captured output
///
/// `lines` holds at most the requested tail, oldest first; `total_count`
/// is the number of lines captured so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLog {
    pub job_id: Uuid,
    pub lines: Vec<String>,
    pub total_count: usize,
}
