//! ID resolver module
//!
//! Resolves UUID prefixes to full UUIDs by listing the matching resource
//! from the controller, so users can type short, unambiguous prefixes.

use anyhow::{Context, Result, anyhow};
use slipway_client::ControllerClient;
use slipway_core::dto::execution::{ExecutionFilter, MAX_PAGE_SIZE};
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Picks the single candidate matching `id_or_prefix`
///
/// # Errors
/// Returns an error if no candidate matches or the prefix is ambiguous.
pub fn pick(kind: &str, id_or_prefix: &IdOrPrefix, candidates: &[Uuid]) -> Result<Uuid> {
    let matches: Vec<Uuid> = candidates
        .iter()
        .copied()
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}

pub async fn resolve_pipeline_id(client: &ControllerClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines()
        .await
        .context("Failed to fetch pipelines for ID resolution")?;
    let ids: Vec<Uuid> = pipelines.iter().map(|p| p.id).collect();
    pick("pipeline", &id_or_prefix, &ids)
}

pub async fn resolve_job_id(client: &ControllerClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let jobs = client
        .list_jobs()
        .await
        .context("Failed to fetch jobs for ID resolution")?;
    let ids: Vec<Uuid> = jobs.iter().map(|j| j.id).collect();
    pick("job", &id_or_prefix, &ids)
}

/// Only the most recent page of executions is searched
pub async fn resolve_execution_id(client: &ControllerClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let filter = ExecutionFilter {
        per_page: Some(MAX_PAGE_SIZE),
        ..ExecutionFilter::default()
    };
    let page = client
        .list_executions(&filter)
        .await
        .context("Failed to fetch executions for ID resolution")?;
    let ids: Vec<Uuid> = page.items.iter().map(|e| e.id).collect();
    pick("execution", &id_or_prefix, &ids)
}

pub async fn resolve_rule_id(client: &ControllerClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let rules = client
        .list_rules()
        .await
        .context("Failed to fetch rules for ID resolution")?;
    let ids: Vec<Uuid> = rules.iter().map(|r| r.id).collect();
    pick("rule", &id_or_prefix, &ids)
}
