//! Auto-deploy rule command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use slipway_client::ControllerClient;
use slipway_core::domain::rollout::AutoDeployRule;
use slipway_core::dto::rule::RuleSpec;

use crate::id_resolver::resolve_rule_id;

/// Rule subcommands
#[derive(Subcommand)]
pub enum RuleCommands {
    /// List auto-deploy rules
    List,
    /// Create a rule deploying matching registry pushes to a workload
    Create {
        name: String,

        /// Glob over the registry repository, e.g. `acme/*`
        #[arg(long)]
        image: String,

        /// Glob over the pushed tag
        #[arg(long, default_value = "*")]
        tag: String,

        #[arg(short, long, default_value = "default")]
        namespace: String,

        #[arg(short, long)]
        workload: String,

        #[arg(short, long)]
        container: Option<String>,

        /// Create the rule disabled
        #[arg(long)]
        disabled: bool,

        #[arg(long)]
        auto_rollback: bool,
    },
    /// Enable a rule
    Enable {
        /// Rule ID or unambiguous prefix
        id: String,
    },
    /// Disable a rule
    Disable {
        /// Rule ID or unambiguous prefix
        id: String,
    },
    /// Delete a rule
    Delete {
        /// Rule ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_rule_command(command: RuleCommands, client: &ControllerClient) -> Result<()> {
    match command {
        RuleCommands::List => list_rules(client).await,
        RuleCommands::Create {
            name,
            image,
            tag,
            namespace,
            workload,
            container,
            disabled,
            auto_rollback,
        } => {
            let spec = RuleSpec {
                name,
                image_pattern: image,
                tag_pattern: tag,
                namespace,
                workload,
                container,
                enabled: !disabled,
                auto_rollback,
            };
            let rule = client.create_rule(&spec).await?;
            println!("{}", "✓ Rule created successfully!".green().bold());
            print_rule(&rule);
            Ok(())
        }
        RuleCommands::Enable { id } => set_enabled(client, &id, true).await,
        RuleCommands::Disable { id } => set_enabled(client, &id, false).await,
        RuleCommands::Delete { id } => {
            let uuid = resolve_rule_id(client, &id).await?;
            client.delete_rule(uuid).await?;
            println!(
                "{}",
                format!("✓ Rule {} deleted successfully!", uuid)
                    .green()
                    .bold()
            );
            Ok(())
        }
    }
}

async fn list_rules(client: &ControllerClient) -> Result<()> {
    let rules = client.list_rules().await?;

    if rules.is_empty() {
        println!("{}", "No rules found.".yellow());
    } else {
        println!("{}", format!("Found {} rule(s):", rules.len()).bold());
        println!();
        for rule in rules {
            print_rule(&rule);
            println!();
        }
    }

    Ok(())
}

async fn set_enabled(client: &ControllerClient, id: &str, enabled: bool) -> Result<()> {
    let uuid = resolve_rule_id(client, id).await?;
    let rules = client.list_rules().await?;
    let Some(rule) = rules.into_iter().find(|r| r.id == uuid) else {
        anyhow::bail!("Rule {} not found", uuid);
    };

    let spec = RuleSpec {
        name: rule.name,
        image_pattern: rule.image_pattern,
        tag_pattern: rule.tag_pattern,
        namespace: rule.workload.namespace,
        workload: rule.workload.name,
        container: rule.container,
        enabled,
        auto_rollback: rule.auto_rollback,
    };
    let updated = client.update_rule(uuid, &spec).await?;

    println!(
        "{}",
        format!(
            "✓ Rule {} {}",
            updated.name,
            if enabled { "enabled" } else { "disabled" }
        )
        .green()
        .bold()
    );

    Ok(())
}

fn print_rule(rule: &AutoDeployRule) {
    let state = if rule.enabled {
        "enabled".green()
    } else {
        "disabled".dimmed()
    };

    println!("  {} {} ({})", "▸".cyan(), rule.name.bold(), state);
    println!("    ID:       {}", rule.id.to_string().dimmed());
    println!(
        "    Matches:  {}:{}",
        rule.image_pattern, rule.tag_pattern
    );
    println!("    Workload: {}", rule.workload);
    if let Some(container) = &rule.container {
        println!("    Container: {}", container);
    }
    if rule.auto_rollback {
        println!("    {}", "auto-rollback".dimmed());
    }
}
