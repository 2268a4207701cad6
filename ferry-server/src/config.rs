//! Server configuration
//!
//! Settings come from three layers, highest precedence first: command-line
//! flags (or their environment variables), a JSON config file given with
//! `--config`, and built-in defaults.

use anyhow::{Context, Result};
use clap::Parser;
use ferry_engine::EngineConfig;
use ferry_engine::config::split_interpreter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Command-line arguments of the server
#[derive(Debug, Default, Parser)]
#[command(name = "ferry-server")]
#[command(about = "Ferry background job server", long_about = None)]
pub struct ServerArgs {
    /// JSON configuration file
    #[arg(long, env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "FERRY_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Maximum number of jobs running at once
    #[arg(long, env = "FERRY_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Seconds a cancelled job gets to exit before it is killed
    #[arg(long, env = "FERRY_GRACE_PERIOD_SECS")]
    pub grace_period_secs: Option<u64>,

    /// Seconds to wait for output to flush after a process exits
    #[arg(long, env = "FERRY_DRAIN_TIMEOUT_SECS")]
    pub drain_timeout_secs: Option<u64>,

    /// Wall-clock limit per job in seconds (0 disables)
    #[arg(long, env = "FERRY_JOB_TIMEOUT_SECS")]
    pub job_timeout_secs: Option<u64>,

    /// Interpreter command used to run scripts, e.g. "python3 -u"
    #[arg(long, env = "FERRY_INTERPRETER")]
    pub interpreter: Option<String>,

    /// Separator for list-valued job arguments
    #[arg(long, env = "FERRY_LIST_SEPARATOR")]
    pub list_separator: Option<String>,

    /// Flag through which the output file path is passed (empty disables)
    #[arg(long, env = "FERRY_OUTPUT_FLAG")]
    pub output_flag: Option<String>,

    /// Directory under which job workspaces are created
    #[arg(long, env = "FERRY_WORKSPACE_BASE")]
    pub workspace_base: Option<PathBuf>,
}

/// Contents of a JSON configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub bind_addr: Option<String>,
    pub max_workers: Option<usize>,
    pub grace_period_secs: Option<u64>,
    pub drain_timeout_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub interpreter: Option<Vec<String>>,
    pub list_separator: Option<String>,
    pub output_flag: Option<String>,
    pub workspace_base: Option<PathBuf>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Loads the configuration, reading the config file if one was given
    pub fn load(args: ServerArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    /// Merges arguments over file settings over defaults
    pub fn resolve(args: ServerArgs, file: FileConfig) -> Result<Self> {
        let mut engine = EngineConfig::new();

        if let Some(max_workers) = args.max_workers.or(file.max_workers) {
            engine.max_workers = max_workers;
        }
        if let Some(secs) = args.grace_period_secs.or(file.grace_period_secs) {
            engine.grace_period = Duration::from_secs(secs);
        }
        if let Some(secs) = args.drain_timeout_secs.or(file.drain_timeout_secs) {
            engine.drain_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = args.job_timeout_secs.or(file.job_timeout_secs) {
            engine.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(interpreter) = args
            .interpreter
            .as_deref()
            .map(split_interpreter)
            .or(file.interpreter)
        {
            engine.interpreter = interpreter;
        }
        if let Some(separator) = args.list_separator.or(file.list_separator) {
            engine.list_separator = separator;
        }
        if let Some(flag) = args.output_flag.or(file.output_flag) {
            let flag = flag.trim();
            engine.output_flag = (!flag.is_empty()).then(|| flag.to_string());
        }
        if let Some(base) = args.workspace_base.or(file.workspace_base) {
            engine.workspace_base = base;
        }

        engine
            .validate()
            .context("Invalid engine configuration")?;

        let bind_addr = args
            .bind_addr
            .or(file.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self { bind_addr, engine })
    }
}
