#![allow(dead_code)]

use ferry_core::domain::job::JobStatus;
use ferry_engine::{EngineConfig, JobManager};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// A manager plus the scratch directory its scripts and workspaces live in
pub struct Harness {
    pub manager: JobManager,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(max_workers: usize) -> Self {
        Self::with_config(|config| config.with_max_workers(max_workers))
    }

    pub fn with_config(adjust: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();

        // Scripts are run through sh so they never need the exec bit
        let config = EngineConfig::default()
            .with_interpreter(["/bin/sh"])
            .with_grace_period(Duration::from_secs(1))
            .with_drain_timeout(Duration::from_millis(500))
            .with_workspace_base(dir.path().join("workspaces"));
        let config = adjust(config);

        let manager = JobManager::start(config).unwrap();
        Self { manager, dir }
    }

    /// Writes a shell script into the scratch directory
    pub fn script(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path.to_string_lossy().into_owned()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn status(&self, job_id: Uuid) -> JobStatus {
        self.manager.get_job_status(job_id).unwrap().status
    }

    /// Polls until `job_id` reaches `wanted`, panicking after `timeout`
    pub async fn wait_for(&self, job_id: Uuid, wanted: JobStatus, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status(job_id);
            if status == wanted {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} still {} after {:?}, expected {}",
                job_id,
                status,
                timeout,
                wanted
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Polls until `job_id` is in any terminal state and returns it
    pub async fn wait_terminal(&self, job_id: Uuid, timeout: Duration) -> JobStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status(job_id);
            if status.is_terminal() {
                return status;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} still {} after {:?}",
                job_id,
                status,
                timeout
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Polls until the job has captured at least `count` log lines
    pub async fn wait_for_lines(&self, job_id: Uuid, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.manager.get_job_log(job_id, 0).unwrap().total_count < count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} produced fewer than {} lines",
                job_id,
                count
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Polls for a file to appear
pub async fn wait_for_file(path: &Path, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !path.exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Whether `pid` is a live process; zombies count as dead
#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    // The state letter follows the parenthesised command name
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        return stat
            .rsplit_once(')')
            .is_none_or(|(_, rest)| !rest.trim_start().starts_with('Z'));
    }

    kill(Pid::from_raw(pid), None::<Signal>).is_ok()
}

/// Polls until `pid` is gone, returning false if it outlives `timeout`
#[cfg(unix)]
pub async fn wait_process_gone(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while process_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

/// Reads a pid written by a job script
pub fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path).unwrap().trim().parse().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_engine=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Shell prologue that picks `--output <path>` out of the arguments
pub const PARSE_OUTPUT: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;
