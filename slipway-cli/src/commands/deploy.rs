//! Deploy command handlers
//!
//! Manual rollouts, rollbacks and their supervision state. A deploy returns
//! as soon as the image is set; `--wait` polls the health check until it
//! settles.

use anyhow::{Result, bail};
use clap::Args;
use colored::*;
use slipway_client::ControllerClient;
use slipway_core::domain::rollout::{DeploymentStatus, HealthCheckStatus, HealthState, WorkloadRef};
use slipway_core::dto::deploy::{DeployRequest, RollbackRequest};
use std::time::Duration;
use uuid::Uuid;

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Args)]
pub struct DeployArgs {
    /// Workload name
    workload: String,

    /// Image reference to deploy
    image: String,

    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// Container to update (default: the first one)
    #[arg(short, long)]
    container: Option<String>,

    /// Roll back automatically if the rollout fails
    #[arg(long)]
    auto_rollback: bool,

    /// Wait until the rollout is healthy or failed
    #[arg(short, long)]
    wait: bool,
}

/// Without `--version` or `--to-image` the latest entry's previous image is restored
#[derive(Args)]
pub struct RollbackArgs {
    workload: String,

    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// History version to restore
    #[arg(long, conflicts_with = "to_image")]
    version: Option<u64>,

    /// Explicit image to restore
    #[arg(long)]
    to_image: Option<String>,

    #[arg(short, long)]
    wait: bool,
}

pub async fn deploy(args: DeployArgs, client: &ControllerClient) -> Result<()> {
    let req = DeployRequest {
        workload: args.workload,
        namespace: args.namespace,
        image: args.image,
        container: args.container,
        auto_rollback: args.auto_rollback,
    };
    let check = client.deploy(&req).await?;

    println!("{}", "✓ Rollout started".green().bold());
    print_check(&check);
    if args.wait {
        wait_for_check(client, check.id).await?;
    }
    Ok(())
}

pub async fn rollback(args: RollbackArgs, client: &ControllerClient) -> Result<()> {
    let req = RollbackRequest {
        workload: args.workload,
        namespace: args.namespace,
        version: args.version,
        to_image: args.to_image,
    };
    let check = client.rollback(&req).await?;

    println!("{}", "✓ Rollback started".green().bold());
    print_check(&check);
    if args.wait {
        wait_for_check(client, check.id).await?;
    }
    Ok(())
}

/// Polls until the check with `id` is terminal; fails if it failed
async fn wait_for_check(client: &ControllerClient, id: Uuid) -> Result<()> {
    println!("{}", "Waiting for rollout to settle...".dimmed());

    loop {
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;

        let checks = client.health_checks().await?;
        let Some(check) = checks.into_iter().find(|c| c.id == id) else {
            bail!("Health check {} is no longer tracked by the controller", id);
        };

        if !check.status.is_terminal() {
            println!(
                "  {} attempt {}/{}: {}",
                "…".dimmed(),
                check.attempts,
                check.max_attempts,
                check.message.dimmed()
            );
            continue;
        }

        print_check(&check);
        if check.status == HealthState::Failed {
            bail!("Rollout of {} failed", check.target_image);
        }
        return Ok(());
    }
}

pub async fn show_history(client: &ControllerClient, workload: &WorkloadRef) -> Result<()> {
    let history = client.deployment_history(workload).await?;

    if history.is_empty() {
        println!(
            "{}",
            format!("No deployments recorded for {}.", workload).yellow()
        );
        return Ok(());
    }

    println!("{}", format!("Rollout history of {}:", workload).bold());
    println!();
    for entry in history {
        let status = match entry.status {
            DeploymentStatus::InProgress => "in-progress".cyan(),
            DeploymentStatus::Healthy => "healthy".green(),
            DeploymentStatus::Failed => "failed".red(),
        };
        println!(
            "  {} v{} {} [{}] {}",
            "▸".cyan(),
            entry.version,
            entry.image.bold(),
            entry.trigger,
            status
        );
        println!(
            "    Deployed: {}",
            entry
                .deployed_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
        if let Some(previous) = &entry.previous_image {
            println!("    Previous: {}", previous.dimmed());
        }
        if let Some(message) = &entry.message {
            println!("    {}", message.dimmed());
        }
    }

    Ok(())
}

pub async fn list_checks(client: &ControllerClient) -> Result<()> {
    let checks = client.health_checks().await?;

    if checks.is_empty() {
        println!("{}", "No health checks found.".yellow());
    } else {
        for check in checks {
            print_check(&check);
            println!();
        }
    }

    Ok(())
}

fn print_check(check: &HealthCheckStatus) {
    let state = check.status.to_string();
    let state = match check.status {
        HealthState::Pending | HealthState::Checking => state.cyan(),
        HealthState::Healthy => state.green(),
        HealthState::Failed => state.red(),
    };

    println!("  Check:    {}", check.id.to_string().dimmed());
    println!("  Workload: {}", check.workload.to_string().bold());
    println!("  Image:    {}", check.target_image);
    println!("  Trigger:  {}", check.trigger);
    println!(
        "  Status:   {} ({}/{})",
        state, check.attempts, check.max_attempts
    );
    if let Some(reason) = check.failure_reason {
        println!("  Reason:   {}", reason.to_string().red());
    }
    if check.rollback_triggered {
        println!("  {}", "Automatic rollback triggered".yellow());
    }
}
