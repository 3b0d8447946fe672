//! Pipeline command handlers
//!
//! Creating pipelines from JSON definitions, listing and inspecting them,
//! and queueing manual builds.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use slipway_client::ControllerClient;
use slipway_core::domain::pipeline::Pipeline;
use slipway_core::dto::pipeline::{PipelineSpec, TriggerPipeline};

use crate::id_resolver::resolve_pipeline_id;
use crate::types::{PriorityArg, parse_key_val};

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a pipeline from a JSON definition
    Create {
        /// Path to the pipeline definition
        #[arg(short, long)]
        file: String,
    },
    /// Replace a pipeline's definition
    Update {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Path to the pipeline definition
        #[arg(short, long)]
        file: String,
    },
    /// List all pipelines
    List,
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Delete a pipeline
    Delete {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Queue a manual build
    Trigger {
        /// Pipeline ID or unambiguous prefix
        id: String,

        /// Branch to build (controller default: main)
        #[arg(short, long)]
        branch: Option<String>,

        /// Commit to build (controller default: HEAD)
        #[arg(short, long)]
        commit: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(short, long, value_enum)]
        priority: Option<PriorityArg>,

        /// Variables as KEY=value pairs
        #[arg(short, long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
}

pub async fn handle_pipeline_command(
    command: PipelineCommands,
    client: &ControllerClient,
) -> Result<()> {
    match command {
        PipelineCommands::Create { file } => create_pipeline(client, &file).await,
        PipelineCommands::Update { id, file } => update_pipeline(client, &id, &file).await,
        PipelineCommands::List => list_pipelines(client).await,
        PipelineCommands::Get { id } => get_pipeline(client, &id).await,
        PipelineCommands::Delete { id } => delete_pipeline(client, &id).await,
        PipelineCommands::Trigger {
            id,
            branch,
            commit,
            author,
            priority,
            vars,
        } => {
            let req = TriggerPipeline {
                branch,
                commit_sha: commit,
                author,
                priority: priority.map(Into::into),
                variables: vars.into_iter().collect(),
            };
            trigger_pipeline(client, &id, req).await
        }
    }
}

fn read_spec(path: &str) -> Result<PipelineSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline definition: {}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid pipeline definition in {}", path))
}

async fn create_pipeline(client: &ControllerClient, path: &str) -> Result<()> {
    let spec = read_spec(path)?;
    let pipeline = client.create_pipeline(&spec).await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Name:   {}", pipeline.name.bold());
    println!("  Stages: {}", stage_names(&pipeline).dimmed());

    Ok(())
}

async fn update_pipeline(client: &ControllerClient, id: &str, path: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let spec = read_spec(path)?;
    let pipeline = client.update_pipeline(uuid, &spec).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} updated to version {}", pipeline.name, pipeline.version)
            .green()
            .bold()
    );

    Ok(())
}

async fn list_pipelines(client: &ControllerClient) -> Result<()> {
    let pipelines = client.list_pipelines().await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn get_pipeline(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.get_pipeline(uuid).await?;

    print_pipeline_details(&pipeline);

    Ok(())
}

async fn delete_pipeline(client: &ControllerClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;

    client.delete_pipeline(uuid).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} deleted successfully!", uuid)
            .green()
            .bold()
    );

    Ok(())
}

async fn trigger_pipeline(
    client: &ControllerClient,
    id: &str,
    req: TriggerPipeline,
) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;

    let job = match client.trigger_pipeline(uuid, req).await {
        Ok(job) => job,
        Err(e) if e.is_queue_full() => {
            anyhow::bail!("Build queue is full, try again once running builds finish")
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", "✓ Build queued!".green().bold());
    println!("  Job ID:   {}", job.id.to_string().cyan());
    println!("  Pipeline: {}", job.pipeline_name);
    println!("  Branch:   {} @ {}", job.branch, job.commit_sha.dimmed());
    println!("  Status:   {}", job.status.to_string().yellow());
    if let Some(eta) = job.estimated_completion {
        println!("  ETA:      {}", eta.format("%Y-%m-%d %H:%M:%S"));
    }

    Ok(())
}

fn stage_names(pipeline: &Pipeline) -> String {
    pipeline
        .stages
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

fn list_or_any(items: &[String]) -> String {
    if items.is_empty() {
        "*".to_string()
    } else {
        items.join(", ")
    }
}

fn print_pipeline_summary(pipeline: &Pipeline) {
    let state = if pipeline.enabled {
        "enabled".green()
    } else {
        "disabled".dimmed()
    };

    println!("  {} {} ({})", "▸".cyan(), pipeline.name.bold(), state);
    println!("    ID:         {}", pipeline.id.to_string().dimmed());
    println!("    Repository: {}", pipeline.repository.dimmed());
    println!("    Stages:     {}", stage_names(pipeline).dimmed());
    println!();
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:          {}", pipeline.id.to_string().cyan());
    println!("  Name:        {}", pipeline.name.bold());
    if let Some(desc) = &pipeline.description {
        println!("  Description: {}", desc);
    }
    println!("  Repository:  {}", pipeline.repository);
    println!("  Enabled:     {}", pipeline.enabled);
    println!("  Version:     {}", pipeline.version);
    if let Some(timeout) = pipeline.timeout_seconds {
        println!("  Timeout:     {}s", timeout);
    }
    println!(
        "  Updated:     {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    println!("\n{}", "Stages:".bold());
    for stage in &pipeline.stages {
        println!(
            "  {} {} [{}] timeout {}s",
            "▸".cyan(),
            stage.name.bold(),
            stage.stage_type,
            stage.timeout_seconds
        );
    }

    if !pipeline.triggers.is_empty() {
        println!("\n{}", "Triggers:".bold());
        for trigger in &pipeline.triggers {
            println!(
                "  branches: {}  events: {}",
                list_or_any(&trigger.branches),
                list_or_any(&trigger.events)
            );
        }
    }

    if !pipeline.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        for (key, value) in &pipeline.variables {
            println!("  {} = {}", key.cyan(), value);
        }
    }
}
