//! Log capture pipe
//!
//! Streams a process's output into its job's log line by line as it is
//! produced, so readers see live progress instead of a dump at exit.

use ferry_core::domain::log::{LogEntry, LogStream};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::repository::JobStore;

/// Destination for captured output lines
pub trait LogSink: Send + Sync {
    /// Appends a line to the sink
    ///
    /// # Arguments
    /// * `entry` - The captured line
    fn append(&self, entry: LogEntry);
}

/// Log sink appending directly to a job's record in the store
pub struct StoreLogSink {
    store: Arc<JobStore>,
    job_id: Uuid,
}

impl StoreLogSink {
    pub fn new(store: Arc<JobStore>, job_id: Uuid) -> Self {
        Self { store, job_id }
    }
}

impl LogSink for StoreLogSink {
    fn append(&self, entry: LogEntry) {
        if let Err(e) = self.store.append_log(self.job_id, entry) {
            warn!("Dropping log line for job {}: {}", self.job_id, e);
        }
    }
}

/// Spawns a task that reads `reader` to EOF, sending each line to `sink`
///
/// Lines are decoded lossily so a stray invalid byte never stops capture.
/// The trailing `\n` (or `\r\n`) is stripped. The task resolves to the
/// number of lines captured.
pub fn spawn_line_reader<R>(
    reader: R,
    stream: LogStream,
    sink: Arc<dyn LogSink>,
) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut count = 0;

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    sink.append(LogEntry::new(stream, decode_line(&buf)));
                    count += 1;
                }
                Err(e) => {
                    warn!("Error reading {}: {}", stream, e);
                    break;
                }
            }
        }

        debug!("{} reader finished after {} line(s)", stream, count);
        count
    })
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
