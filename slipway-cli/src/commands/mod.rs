//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod execution;
mod pipeline;
mod queue;
mod rule;

pub use execution::ExecutionCommands;
pub use pipeline::PipelineCommands;
pub use queue::QueueCommands;
pub use rule::RuleCommands;

use anyhow::Result;
use clap::Subcommand;
use slipway_client::ControllerClient;
use slipway_core::domain::rollout::WorkloadRef;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Build queue inspection and control
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Execution history and logs
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Roll an image out to a workload
    Deploy(deploy::DeployArgs),
    /// Roll a workload back to an earlier version or image
    Rollback(deploy::RollbackArgs),
    /// Show the rollout history of a workload
    History {
        workload: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,
    },
    /// List rollout health checks
    Checks,
    /// Auto-deploy rules
    Rule {
        #[command(subcommand)]
        command: RuleCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, &client).await,
        Commands::Queue { command } => queue::handle_queue_command(command, &client).await,
        Commands::Execution { command } => {
            execution::handle_execution_command(command, &client).await
        }
        Commands::Deploy(args) => deploy::deploy(args, &client).await,
        Commands::Rollback(args) => deploy::rollback(args, &client).await,
        Commands::History {
            workload,
            namespace,
        } => deploy::show_history(&client, &WorkloadRef::new(namespace, workload)).await,
        Commands::Checks => deploy::list_checks(&client).await,
        Commands::Rule { command } => rule::handle_rule_command(command, &client).await,
    }
}
