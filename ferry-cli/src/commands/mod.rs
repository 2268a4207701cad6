//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;

use anyhow::Result;
use clap::Subcommand;
use ferry_client::FerryClient;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a new background job
    Submit {
        /// Path of the script to run
        script_path: String,

        /// Job argument as key=value; the value is read as JSON when it
        /// parses (numbers, booleans, lists), as plain text otherwise
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Human-readable job name
        #[arg(short, long)]
        name: Option<String>,

        /// Wait for the job to finish and print its result
        #[arg(short, long)]
        wait: bool,
    },
    /// Show the status of a job
    Status {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Show the result of a completed job
    #[command(name = "result")]
    ShowResult {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Show the captured output of a job
    Log {
        /// Job ID or unambiguous prefix
        id: String,

        /// Number of most recent lines to show (0 for all)
        #[arg(short, long, default_value_t = 50)]
        tail: usize,

        /// Keep printing new lines until the job finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Cancel a job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// List jobs in submission order
    List {
        /// Only jobs with this status (pending, running, completed, failed, cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = FerryClient::new(&config.server_url);

    match command {
        Commands::Submit {
            script_path,
            args,
            name,
            wait,
        } => job::submit_job(&client, script_path, &args, name, wait).await,
        Commands::Status { id } => job::show_status(&client, &id).await,
        Commands::ShowResult { id } => job::show_result(&client, &id).await,
        Commands::Log { id, tail, follow } => job::show_log(&client, &id, tail, follow).await,
        Commands::Cancel { id } => job::cancel_job(&client, &id).await,
        Commands::List { status } => job::list_jobs(&client, status.as_deref()).await,
    }
}
