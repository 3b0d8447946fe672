//! Execution history command handlers

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::*;
use slipway_client::ControllerClient;
use slipway_core::domain::execution::{ExecutionStatus, PipelineExecution, StageStatus};
use slipway_core::domain::log::{LogEntry, LogLevel};
use slipway_core::dto::execution::ExecutionFilter;

use crate::id_resolver::{resolve_execution_id, resolve_pipeline_id};

/// Execution subcommands
#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// List executions, newest first
    List {
        /// Pipeline ID or unambiguous prefix
        #[arg(long)]
        pipeline: Option<String>,

        /// running, success or failed
        #[arg(long)]
        status: Option<ExecutionStatus>,

        #[arg(long)]
        branch: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        repository: Option<String>,

        /// Only executions started at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only executions started at or before this RFC 3339 time
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "20")]
        per_page: usize,
    },
    /// Get execution details
    Get {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// Print the logs of every stage
    Logs {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// Queue the same pipeline and commit again
    Retry {
        /// Execution ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_execution_command(
    command: ExecutionCommands,
    client: &ControllerClient,
) -> Result<()> {
    match command {
        ExecutionCommands::List {
            pipeline,
            status,
            branch,
            author,
            repository,
            since,
            until,
            page,
            per_page,
        } => {
            let pipeline_id = match pipeline {
                Some(p) => Some(resolve_pipeline_id(client, &p).await?),
                None => None,
            };
            let filter = ExecutionFilter {
                pipeline_id,
                status,
                branch,
                author,
                repository,
                since,
                until,
                page: Some(page),
                per_page: Some(per_page),
            };
            list_executions(client, &filter).await
        }
        ExecutionCommands::Get { id } => get_execution(client, &id).await,
        ExecutionCommands::Logs { id } => get_logs(client, &id).await,
        ExecutionCommands::Retry { id } => retry_execution(client, &id).await,
    }
}

async fn list_executions(client: &ControllerClient, filter: &ExecutionFilter) -> Result<()> {
    let page = client.list_executions(filter).await?;

    if page.items.is_empty() {
        println!("{}", "No executions found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "Showing {} of {} execution(s) (page {}):",
            page.items.len(),
            page.total,
            page.page
        )
        .bold()
    );
    println!();
    for execution in &page.items {
        print_execution_summary(execution);
    }

    Ok(())
}

async fn get_execution(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, id).await?;
    let execution = client.get_execution(uuid).await?;

    print_execution_details(&execution);

    Ok(())
}

async fn get_logs(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, id).await?;
    let logs = client.get_execution_logs(uuid).await?;

    if logs.stages.iter().all(|s| s.entries.is_empty()) {
        println!("{}", "No logs found for this execution.".yellow());
        return Ok(());
    }

    for stage in &logs.stages {
        println!("{}", format!("Stage {}:", stage.stage).bold());
        println!("{}", "─".repeat(80).dimmed());
        for entry in &stage.entries {
            print_log_entry(entry);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

async fn retry_execution(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_execution_id(client, id).await?;
    let job = client.retry_execution(uuid).await?;

    println!("{}", "✓ Retry queued!".green().bold());
    println!("  Job ID:  {}", job.id.to_string().cyan());
    println!("  Commit:  {}", job.commit_sha.dimmed());
    println!("  Retries: {}", job.retry_count);

    Ok(())
}

fn format_duration(ms: Option<u64>) -> String {
    match ms {
        Some(ms) if ms >= 60_000 => format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000),
        Some(ms) => format!("{:.1}s", ms as f64 / 1000.0),
        None => "-".to_string(),
    }
}

fn print_execution_summary(execution: &PipelineExecution) {
    println!(
        "  {} {} #{} {}",
        "▸".cyan(),
        execution.pipeline_name.bold(),
        execution.build_number,
        colorize_status(execution.status)
    );
    println!("    ID:      {}", execution.id.to_string().dimmed());
    println!(
        "    Commit:  {} @ {}",
        execution.branch,
        execution.commit_sha.dimmed()
    );
    println!(
        "    Started: {}  ({})",
        execution
            .started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed(),
        format_duration(execution.duration_ms)
    );
    println!();
}

fn print_execution_details(execution: &PipelineExecution) {
    println!("{}", "Execution Details:".bold());
    println!("  ID:         {}", execution.id.to_string().cyan());
    println!(
        "  Pipeline:   {} #{}",
        execution.pipeline_name.bold(),
        execution.build_number
    );
    println!("  Repository: {}", execution.repository);
    println!("  Branch:     {}", execution.branch);
    println!("  Commit:     {}", execution.commit_sha);
    if let Some(author) = &execution.author {
        println!("  Author:     {}", author);
    }
    println!("  Trigger:    {}", execution.trigger);
    println!("  Status:     {}", colorize_status(execution.status));
    println!(
        "  Started:    {}",
        execution.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Duration:   {}", format_duration(execution.duration_ms));

    println!("\n{}", "Stages:".bold());
    for stage in &execution.stages {
        let status = match stage.status {
            StageStatus::Running => "running".cyan(),
            StageStatus::Success => "success".green(),
            StageStatus::Failed => "failed".red(),
            StageStatus::Skipped => "skipped".dimmed(),
        };
        println!(
            "  {} {} [{}] {} {}",
            "▸".cyan(),
            stage.name.bold(),
            stage.stage_type,
            status,
            format_duration(stage.duration_ms).dimmed()
        );
        if let Some(output) = &stage.output {
            println!("      → {}", output);
        }
        if let Some(error) = &stage.error {
            println!("      {}", error.red());
        }
    }

    if let Some(error) = &execution.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

fn colorize_status(status: ExecutionStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        ExecutionStatus::Running => status_str.cyan(),
        ExecutionStatus::Success => status_str.green(),
        ExecutionStatus::Failed => status_str.red(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(None), "-");
        assert_eq!(format_duration(Some(1500)), "1.5s");
        assert_eq!(format_duration(Some(125_000)), "2m05s");
    }
}
