//! Task executor adapter
//!
//! Turns a job's script path and argument mapping into an external process,
//! supervises it and reports how it ended:
//! - Argument rendering into discrete argv tokens (no shell involved)
//! - Spawning with output attached to the log capture pipe
//! - Two-phase termination when the job's cancellation token fires
//! - Reading the declared output file on success

use async_trait::async_trait;
use ferry_core::domain::args::{ArgValue, JobArgs, Scalar};
use ferry_core::domain::job::Job;
use ferry_core::domain::log::LogStream;
use serde_json::{Value as JsonValue, json};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::service::log_capture::{LogSink, spawn_line_reader};

/// Name of the result file inside a job's workspace
pub const OUTPUT_FILE_NAME: &str = "output.json";

/// How a single execution attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Exit code 0, with the executor's result payload
    Completed(JsonValue),
    /// Non-zero exit, death by signal, or spawn failure
    Failed(String),
    /// The cancellation token fired and the process has been terminated
    Cancelled,
}

/// Service trait for running one job to completion
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Executes a job
    ///
    /// # Arguments
    /// * `job` - Snapshot of the job being run (already `running`)
    /// * `workspace` - Private directory for this execution, removed afterwards
    /// * `sink` - Where captured output lines go
    /// * `cancel` - Fires when the job must stop
    ///
    /// # Returns
    /// The outcome of the single execution attempt
    async fn execute(
        &self,
        job: Job,
        workspace: PathBuf,
        sink: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> ExecutionOutcome;
}

/// A fully rendered process invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// File the executor is expected to write its result to, if any
    pub output_path: Option<PathBuf>,
}

impl Invocation {
    /// Renders a job's invocation
    ///
    /// Each argument becomes `--name value`; `true` becomes a bare `--name`,
    /// `false` and empty lists are left out, and lists are joined with the
    /// configured separator. When an output flag is configured and the caller
    /// did not pass one, `--<flag> <workspace>/output.json` is appended.
    pub fn build(
        config: &EngineConfig,
        script_path: &str,
        args: &JobArgs,
        workspace: &Path,
    ) -> Self {
        let (program, mut argv) = match config.interpreter.split_first() {
            Some((program, leading)) => {
                let mut argv = leading.to_vec();
                argv.push(script_path.to_string());
                (program.clone(), argv)
            }
            None => (script_path.to_string(), Vec::new()),
        };

        for (key, value) in args.iter() {
            match value {
                ArgValue::Scalar(Scalar::Bool(true)) => argv.push(format!("--{}", key)),
                ArgValue::Scalar(Scalar::Bool(false)) => {}
                ArgValue::List(items) if items.is_empty() => {}
                value => {
                    argv.push(format!("--{}", key));
                    argv.push(value.render(&config.list_separator));
                }
            }
        }

        let output_path = match &config.output_flag {
            Some(flag) => match args.get(flag) {
                Some(ArgValue::Scalar(Scalar::Text(path))) => Some(PathBuf::from(path)),
                Some(_) => None,
                None => {
                    let path = workspace.join(OUTPUT_FILE_NAME);
                    argv.push(format!("--{}", flag));
                    argv.push(path.to_string_lossy().into_owned());
                    Some(path)
                }
            },
            None => None,
        };

        Self {
            program,
            args: argv,
            output_path,
        }
    }
}

/// Executor running jobs as local child processes
pub struct ProcessExecutor {
    config: Arc<EngineConfig>,
}

impl ProcessExecutor {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    fn command(&self, invocation: &Invocation, job: &Job, workspace: &Path) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env("FERRY_JOB_ID", job.id.to_string())
            .env("FERRY_WORKSPACE", workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so termination also reaches grandchildren
        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(
        &self,
        job: Job,
        workspace: PathBuf,
        sink: Arc<dyn LogSink>,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        if cancel.is_cancelled() {
            debug!("Job {} cancelled before spawn", job.id);
            return ExecutionOutcome::Cancelled;
        }

        let invocation = Invocation::build(&self.config, &job.script_path, &job.args, &workspace);
        debug!(
            "Spawning job {}: {} {:?}",
            job.id, invocation.program, invocation.args
        );

        let mut child = match self.command(&invocation, &job, &workspace).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn job {}: {}", job.id, e);
                return ExecutionOutcome::Failed(format!(
                    "failed to spawn {}: {}",
                    invocation.program, e
                ));
            }
        };

        let pid = child.id();
        info!("Job {} spawned (pid {:?})", job.id, pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, LogStream::Stdout, Arc::clone(&sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, LogStream::Stderr, Arc::clone(&sink)));
        }

        let (exit, cancelled) = tokio::select! {
            status = child.wait() => (status, false),
            _ = cancel.cancelled() => {
                info!("Terminating job {}", job.id);
                (terminate(&mut child, self.config.grace_period).await, true)
            }
        };

        // Background children must not outlive the job or hold its pipes open
        if !cancelled {
            kill_process_group(pid);
        }

        drain_readers(readers, self.config.drain_timeout).await;

        if cancelled {
            if let Err(e) = &exit {
                warn!("Could not confirm termination of job {}: {}", job.id, e);
            }
            return ExecutionOutcome::Cancelled;
        }

        match exit {
            Ok(status) if status.success() => {
                ExecutionOutcome::Completed(read_result(invocation.output_path.as_deref()).await)
            }
            Ok(status) => ExecutionOutcome::Failed(describe_exit(status)),
            Err(e) => ExecutionOutcome::Failed(format!("failed waiting for process: {}", e)),
        }
    }
}

/// Gracefully terminates a child process and its process group
///
/// On Unix, sends SIGTERM to the process group and gives the group up to
/// `grace` to exit. Whatever is still alive then gets SIGKILL, including
/// group members that outlived the leader. On other platforms the child is
/// killed immediately. Returns once the child has been reaped.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let group = Pid::from_raw(pid as i32);
            let _ = killpg(group, Signal::SIGTERM);

            let deadline = tokio::time::Instant::now() + grace;
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(status) => {
                    wait_group_exit(group, deadline).await;
                    kill_process_group(Some(pid));
                    return status;
                }
                Err(_) => {
                    debug!("Process group {} ignored SIGTERM, sending SIGKILL", pid);
                    kill_process_group(Some(pid));
                }
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    // Errors here mean the child was already reaped
    let _ = child.start_kill();
    child.wait().await
}

/// Polls until no process is left in `group` or `deadline` passes
#[cfg(unix)]
async fn wait_group_exit(group: nix::unistd::Pid, deadline: tokio::time::Instant) {
    use nix::sys::signal::{Signal, killpg};

    // Signal 0 only checks that some member still exists
    while killpg(group, None::<Signal>).is_ok() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// SIGKILLs whatever is left of the process group led by `pid`
fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!("Killed leftover processes of group {}", pid),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
            }
        }
    }

    #[cfg(not(unix))]
    let _ = pid;
}

/// Waits for output readers to hit EOF, aborting any that outlive `timeout`
///
/// A grandchild that escaped the process group can hold a pipe open after
/// the direct child exits; capture must not wait on it forever.
async fn drain_readers(readers: Vec<tokio::task::JoinHandle<usize>>, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    for mut reader in readers {
        match tokio::time::timeout_at(deadline, &mut reader).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Log reader task failed: {}", e),
            Err(_) => {
                warn!("Log reader still open after process exit, aborting it");
                reader.abort();
            }
        }
    }
}

/// Reads the executor's declared output file
///
/// JSON content is returned as-is, anything else as a JSON string. When no
/// output file was produced the result is `{"exit_code": 0}`.
async fn read_result(output_path: Option<&Path>) -> JsonValue {
    let Some(path) = output_path else {
        return json!({ "exit_code": 0 });
    };

    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content)
            .unwrap_or_else(|_| JsonValue::String(content.trim_end().to_string())),
        Err(e) => {
            debug!("No output file at {}: {}", path.display(), e);
            json!({ "exit_code": 0 })
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {}", signal);
        }
    }

    "process exited without a status code".to_string()
}
