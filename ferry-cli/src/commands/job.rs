//! Job command handlers
//!
//! Submitting jobs and inspecting their status, result and output.

use anyhow::{Result, anyhow, bail};
use colored::*;
use ferry_client::FerryClient;
use ferry_core::domain::job::JobStatus;
use ferry_core::dto::job::{JobStatusView, JobSummary, SubmitJob};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;
use uuid::Uuid;

use crate::id_resolver::resolve_job_id;
use crate::types::IdOrPrefix;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Submit a job, optionally waiting for it to finish
pub async fn submit_job(
    client: &FerryClient,
    script_path: String,
    raw_args: &[String],
    name: Option<String>,
    wait: bool,
) -> Result<()> {
    let args = parse_args(raw_args)?;

    let submitted = client
        .submit_job(&SubmitJob {
            script_path,
            args,
            job_name: name,
        })
        .await?;

    println!("{}", "✓ Job submitted".green().bold());
    println!("  ID:     {}", submitted.job_id.to_string().cyan());
    if let Some(name) = &submitted.job_name {
        println!("  Name:   {}", name);
    }
    println!("  Status: {}", colorize_status(submitted.status));

    if !wait {
        return Ok(());
    }

    println!();
    println!("{}", "Waiting for job to finish...".dimmed());
    let status = client.wait_for_job(submitted.job_id, POLL_INTERVAL).await?;
    print_status(&status);

    if status.status == JobStatus::Completed {
        print_result(client, submitted.job_id).await?;
    }

    Ok(())
}

/// Show the status of a job
pub async fn show_status(client: &FerryClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let status = client.get_job_status(job_id).await?;

    print_status(&status);
    Ok(())
}

/// Show the result of a completed job
pub async fn show_result(client: &FerryClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    print_result(client, job_id).await
}

/// Show the captured output of a job
pub async fn show_log(client: &FerryClient, id: &str, tail: usize, follow: bool) -> Result<()> {
    let job_id = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let log = client.get_job_log(job_id, Some(tail)).await?;

    if log.total_count == 0 && !follow {
        println!("{}", "No output captured for this job yet.".yellow());
        return Ok(());
    }

    if log.lines.len() < log.total_count {
        println!(
            "{}",
            format!("… {} earlier line(s) omitted", log.total_count - log.lines.len()).dimmed()
        );
    }
    for line in &log.lines {
        println!("{}", line);
    }

    if !follow {
        return Ok(());
    }

    let mut printed = log.total_count;
    loop {
        let status = client.get_job_status(job_id).await?;
        let log = client.get_job_log(job_id, Some(0)).await?;

        for line in log.lines.iter().skip(printed) {
            println!("{}", line);
        }
        printed = printed.max(log.total_count);

        if status.status.is_terminal() {
            println!("{}", "─".repeat(80).dimmed());
            println!("Job finished: {}", colorize_status(status.status));
            return Ok(());
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Cancel a job
pub async fn cancel_job(client: &FerryClient, id: &str) -> Result<()> {
    let job_id = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let outcome = client.cancel_job(job_id).await?;

    if outcome.cancelled {
        println!("{} Job {} cancelled", "✓".green(), job_id.to_string().cyan());
    } else if outcome.status == JobStatus::Running {
        println!(
            "{} Job {}: {}",
            "ℹ".yellow(),
            job_id.to_string().cyan(),
            outcome.message
        );
    } else {
        println!(
            "{} Job {} was not cancelled: {}",
            "ℹ".yellow(),
            job_id.to_string().cyan(),
            outcome.message
        );
    }
    println!("  Status: {}", colorize_status(outcome.status));

    Ok(())
}

/// List jobs
pub async fn list_jobs(client: &FerryClient, status: Option<&str>) -> Result<()> {
    let status = status.map(str::parse::<JobStatus>).transpose()?;
    let list = client.list_jobs(status).await?;

    if list.jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", list.total).bold());
        println!();
        for job in &list.jobs {
            print_job_summary(job);
        }
    }

    Ok(())
}

async fn print_result(client: &FerryClient, job_id: Uuid) -> Result<()> {
    match client.get_job_result(job_id).await {
        Ok(view) => {
            println!("\n{}", "Result:".bold());
            println!("{}", serde_json::to_string_pretty(&view.result)?);
            Ok(())
        }
        Err(e) if e.is_not_ready() => bail!("Job {} has not finished yet", job_id),
        Err(e) => Err(e.into()),
    }
}

/// Builds the argument mapping from `key=value` pairs
///
/// Values are read as JSON when they parse (`3`, `true`, `[9,10]`) and as
/// plain strings otherwise. A repeated key keeps its last value.
fn parse_args(raw: &[String]) -> Result<JsonValue> {
    let mut args = Map::new();

    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid argument '{}': expected KEY=VALUE", pair))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid argument '{}': key cannot be empty", pair);
        }

        let value = serde_json::from_str::<JsonValue>(value)
            .unwrap_or_else(|_| JsonValue::String(value.to_string()));
        args.insert(key.to_string(), value);
    }

    Ok(JsonValue::Object(args))
}

fn print_status(status: &JobStatusView) {
    println!("{}", "Job Status:".bold());
    println!("  ID:        {}", status.job_id.to_string().cyan());
    if let Some(name) = &status.job_name {
        println!("  Name:      {}", name);
    }
    println!("  Status:    {}", colorize_status(status.status));
    println!(
        "  Created:   {}",
        status.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = status.started_at {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(finished) = status.finished_at {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = status.started_at {
            let duration = finished.signed_duration_since(started);
            println!("  Duration:  {}s", duration.num_seconds());
        }
    }

    if let Some(error) = &status.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_job_summary(job: &JobSummary) {
    println!("  {} Job {}", "▸".cyan(), job.job_id.to_string().dimmed());
    if let Some(name) = &job.job_name {
        println!("    Name:     {}", name);
    }
    println!("    Status:   {}", colorize_status(job.status));
    println!(
        "    Created:  {}",
        job.created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

/// Colorize job status for display
fn colorize_status(status: JobStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        JobStatus::Pending => label.yellow(),
        JobStatus::Running => label.cyan(),
        JobStatus::Completed => label.green(),
        JobStatus::Failed => label.red(),
        JobStatus::Cancelled => label.dimmed(),
    }
}
