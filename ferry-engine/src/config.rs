//! Engine configuration
//!
//! Defines all configurable parameters for the job engine including
//! worker pool size, cancellation timing and how a job's arguments are
//! turned into a process invocation.

use std::path::PathBuf;
use std::time::Duration;

/// Job engine configuration
///
/// All timeouts are configurable so deployments with slow-to-stop task
/// executors can give them more room.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of jobs executing at the same time
    pub max_workers: usize,

    /// How long a cancelled process gets to exit after SIGTERM before SIGKILL
    pub grace_period: Duration,

    /// How long to wait for output readers to flush after the process exits
    pub drain_timeout: Duration,

    /// Optional wall-clock limit per job; expiry cancels the job
    pub job_timeout: Option<Duration>,

    /// Program (plus leading arguments) used to run scripts, e.g. `python3 -u`.
    /// Empty means the script path is executed directly.
    pub interpreter: Vec<String>,

    /// Separator used to join list-valued arguments into one token
    pub list_separator: String,

    /// Flag name through which the output file path is handed to the executor.
    /// `None` disables the output file contract.
    pub output_flag: Option<String>,

    /// Directory under which per-job workspaces are created
    pub workspace_base: PathBuf,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            max_workers: 2,
            grace_period: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
            job_timeout: None,
            interpreter: Vec::new(),
            list_separator: ",".to_string(),
            output_flag: Some("output".to_string()),
            workspace_base: std::env::temp_dir(),
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn with_job_timeout(mut self, job_timeout: Option<Duration>) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    pub fn with_interpreter<I, S>(mut self, interpreter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter = interpreter.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output_flag(mut self, output_flag: Option<String>) -> Self {
        self.output_flag = output_flag;
        self
    }

    pub fn with_workspace_base(mut self, workspace_base: impl Into<PathBuf>) -> Self {
        self.workspace_base = workspace_base.into();
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.grace_period.is_zero() {
            anyhow::bail!("grace_period must be greater than 0");
        }

        if self.list_separator.is_empty() {
            anyhow::bail!("list_separator cannot be empty");
        }

        if let Some(flag) = &self.output_flag {
            if flag.is_empty() || flag.starts_with('-') || flag.chars().any(char::is_whitespace)
            {
                anyhow::bail!(
                    "output_flag must be a bare flag name like 'output', got '{}'",
                    flag
                );
            }
        }

        if self.interpreter.iter().any(|part| part.is_empty()) {
            anyhow::bail!("interpreter entries cannot be empty");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an interpreter command line on whitespace
pub fn split_interpreter(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.list_separator, ",");
        assert_eq!(config.output_flag.as_deref(), Some("output"));
        assert!(config.job_timeout.is_none());
        assert!(config.interpreter.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.max_workers = 0;
        assert!(config.validate().is_err());
        config.max_workers = 4;

        config.list_separator = String::new();
        assert!(config.validate().is_err());
        config.list_separator = ";".to_string();

        config.output_flag = Some("--output".to_string());
        assert!(config.validate().is_err());
        config.output_flag = Some("out file".to_string());
        assert!(config.validate().is_err());
        config.output_flag = None;
        assert!(config.validate().is_ok());

        config.grace_period = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_max_workers(8)
            .with_interpreter(["python3", "-u"])
            .with_job_timeout(Some(Duration::from_secs(60)));

        assert_eq!(config.max_workers, 8);
        assert_eq!(config.interpreter, vec!["python3", "-u"]);
        assert_eq!(config.job_timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_split_interpreter() {
        assert_eq!(split_interpreter("  python3   -u "), vec!["python3", "-u"]);
        assert!(split_interpreter("   ").is_empty());
    }
}
