//! Build queue command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use slipway_client::ControllerClient;
use slipway_core::domain::job::{BuildJob, JobStatus};
use slipway_core::dto::job::QueueStatus;

use crate::id_resolver::resolve_job_id;

/// Queue subcommands
#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued, running and recently finished jobs
    List,
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a queued or running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Show queue capacity and counts
    Status,
    /// Stop dispatching new builds
    Pause,
    /// Resume dispatching
    Resume,
}

pub async fn handle_queue_command(command: QueueCommands, client: &ControllerClient) -> Result<()> {
    match command {
        QueueCommands::List => list_jobs(client).await,
        QueueCommands::Get { id } => get_job(client, &id).await,
        QueueCommands::Cancel { id } => cancel_job(client, &id).await,
        QueueCommands::Status => {
            print_queue_status(&client.queue_status().await?);
            Ok(())
        }
        QueueCommands::Pause => {
            let status = client.pause_queue().await?;
            println!("{}", "✓ Queue paused".yellow().bold());
            print_queue_status(&status);
            Ok(())
        }
        QueueCommands::Resume => {
            let status = client.resume_queue().await?;
            println!("{}", "✓ Queue resumed".green().bold());
            print_queue_status(&status);
            Ok(())
        }
    }
}

async fn list_jobs(client: &ControllerClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

async fn get_job(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let job = client.get_job(uuid).await?;

    print_job_details(&job);

    Ok(())
}

async fn cancel_job(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let job = client.cancel_job(uuid).await?;

    println!(
        "{}",
        format!("✓ Job {} is now {}", job.id, job.status)
            .green()
            .bold()
    );

    Ok(())
}

fn print_queue_status(status: &QueueStatus) {
    let state = if status.paused {
        "paused".yellow()
    } else {
        "running".green()
    };

    println!("{}", "Queue Status:".bold());
    println!("  State:   {}", state);
    println!(
        "  Running: {}/{}",
        status.running, status.max_concurrent
    );
    println!(
        "  Queued:  {}/{}",
        status.queued, status.max_queue_size
    );
}

fn print_job_summary(job: &BuildJob) {
    println!(
        "  {} {} #{} {}",
        "▸".cyan(),
        job.pipeline_name.bold(),
        job.id.to_string().dimmed(),
        colorize_status(job.status)
    );
    println!(
        "    {} @ {}  priority {:?}",
        job.branch,
        job.commit_sha.dimmed(),
        job.priority
    );
    println!(
        "    Queued: {}",
        job.queued_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_job_details(job: &BuildJob) {
    println!("{}", "Job Details:".bold());
    println!("  ID:         {}", job.id.to_string().cyan());
    println!("  Pipeline:   {} ({})", job.pipeline_name, job.pipeline_id.to_string().dimmed());
    println!("  Repository: {}", job.repository);
    println!("  Branch:     {}", job.branch);
    println!("  Commit:     {}", job.commit_sha);
    if let Some(author) = &job.author {
        println!("  Author:     {}", author);
    }
    println!("  Trigger:    {}", job.trigger);
    println!("  Priority:   {:?}", job.priority);
    println!("  Status:     {}", colorize_status(job.status));
    println!(
        "  Queued:     {}",
        job.queued_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:    {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = job.completed_at {
        println!("  Completed:  {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:   {}s", duration.num_seconds());
        }
    } else if let Some(eta) = job.estimated_completion {
        println!("  ETA:        {}", eta.format("%Y-%m-%d %H:%M:%S"));
    }

    if job.retry_count > 0 {
        println!("  Retries:    {}", job.retry_count);
    }
    if let Some(execution) = job.execution_id {
        println!("  Execution:  {}", execution.to_string().cyan());
    }

    if !job.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        for (key, value) in &job.variables {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if let Some(error) = &job.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Queued => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Success => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled | JobStatus::Skipped => status_str.dimmed(),
    }
}
