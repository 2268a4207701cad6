//! Ferry CLI
//!
//! Command-line interface for submitting and following background jobs on
//! a Ferry server.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry background job CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, env = "FERRY_SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        server_url: cli.server_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "ferry",
            "--server-url",
            "http://jobs:9000",
            "submit",
            "scripts/run.py",
            "--arg",
            "lengths=[9,10]",
            "--arg",
            "allele=HLA-A02:01",
            "--name",
            "nightly",
            "--wait",
        ])
        .unwrap();

        assert_eq!(cli.server_url, "http://jobs:9000");
        match cli.command {
            Commands::Submit {
                script_path,
                args,
                name,
                wait,
            } => {
                assert_eq!(script_path, "scripts/run.py");
                assert_eq!(args, vec!["lengths=[9,10]", "allele=HLA-A02:01"]);
                assert_eq!(name.as_deref(), Some("nightly"));
                assert!(wait);
            }
            _ => panic!("expected submit"),
        }
    }

    #[test]
    fn test_parse_log_defaults() {
        let cli = Cli::try_parse_from(["ferry", "log", "3f2a"]).unwrap();
        match cli.command {
            Commands::Log { id, tail, follow } => {
                assert_eq!(id, "3f2a");
                assert_eq!(tail, 50);
                assert!(!follow);
            }
            _ => panic!("expected log"),
        }
    }

    #[test]
    fn test_parse_list_status() {
        let cli = Cli::try_parse_from(["ferry", "list", "--status", "running"]).unwrap();
        match cli.command {
            Commands::List { status } => assert_eq!(status.as_deref(), Some("running")),
            _ => panic!("expected list"),
        }
    }
}
