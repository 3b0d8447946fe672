//! Pipeline Service
//!
//! Business logic for pipeline management.

use chrono::Utc;
use slipway_core::domain::pipeline::{Pipeline, StageType};
use slipway_core::dto::pipeline::PipelineSpec;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use super::pattern::glob_to_regex;
use crate::repository::{PipelineRepository, RepositoryError};

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Create a new pipeline
pub async fn create_pipeline(repo: &dyn PipelineRepository, spec: PipelineSpec) -> Result<Pipeline> {
    validate_spec(&spec)?;

    let now = Utc::now();
    let pipeline = Pipeline {
        id: Uuid::new_v4(),
        name: spec.name,
        description: spec.description,
        repository: spec.repository,
        stages: spec.stages,
        triggers: spec.triggers,
        variables: spec.variables,
        enabled: spec.enabled,
        version: 1,
        timeout_seconds: spec.timeout_seconds,
        created_at: now,
        updated_at: now,
    };

    repo.create(&pipeline).await?;

    tracing::info!("Pipeline created: {} ({})", pipeline.name, pipeline.id);

    Ok(pipeline)
}

/// Get a pipeline by ID
pub async fn get_pipeline(repo: &dyn PipelineRepository, id: Uuid) -> Result<Pipeline> {
    repo.find_by_id(id)
        .await?
        .ok_or(PipelineError::NotFound(id))
}

/// List all pipelines
pub async fn list_pipelines(repo: &dyn PipelineRepository) -> Result<Vec<Pipeline>> {
    Ok(repo.list_all().await?)
}

/// Replace a pipeline definition and bump its version
pub async fn update_pipeline(
    repo: &dyn PipelineRepository,
    id: Uuid,
    spec: PipelineSpec,
) -> Result<Pipeline> {
    validate_spec(&spec)?;

    let existing = get_pipeline(repo, id).await?;
    let pipeline = Pipeline {
        id,
        name: spec.name,
        description: spec.description,
        repository: spec.repository,
        stages: spec.stages,
        triggers: spec.triggers,
        variables: spec.variables,
        enabled: spec.enabled,
        version: existing.version + 1,
        timeout_seconds: spec.timeout_seconds,
        created_at: existing.created_at,
        updated_at: Utc::now(),
    };

    if !repo.update(&pipeline).await? {
        return Err(PipelineError::NotFound(id));
    }

    tracing::info!(
        "Pipeline updated: {} ({}) now at version {}",
        pipeline.name,
        pipeline.id,
        pipeline.version
    );

    Ok(pipeline)
}

/// Delete a pipeline
pub async fn delete_pipeline(repo: &dyn PipelineRepository, id: Uuid) -> Result<()> {
    if !repo.delete(id).await? {
        return Err(PipelineError::NotFound(id));
    }

    tracing::info!("Pipeline deleted: {}", id);
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

const MAX_NAME_LENGTH: usize = 255;

fn validate_spec(spec: &PipelineSpec) -> Result<()> {
    let invalid = |msg: String| Err(PipelineError::Validation(msg));

    if spec.name.trim().is_empty() {
        return invalid("Pipeline name cannot be empty".to_string());
    }
    if spec.name.len() > MAX_NAME_LENGTH {
        return invalid(format!(
            "Pipeline name exceeds {} characters",
            MAX_NAME_LENGTH
        ));
    }
    if spec.repository.trim().is_empty() {
        return invalid("Pipeline repository cannot be empty".to_string());
    }
    if spec.stages.is_empty() {
        return invalid("Pipeline must have at least one stage".to_string());
    }
    if spec.timeout_seconds == Some(0) {
        return invalid("Pipeline timeout must be greater than zero".to_string());
    }

    let mut seen = HashSet::new();
    for stage in &spec.stages {
        if stage.name.trim().is_empty() {
            return invalid("Stage name cannot be empty".to_string());
        }
        if stage.timeout_seconds == 0 {
            return invalid(format!(
                "Stage '{}' timeout must be greater than zero",
                stage.name
            ));
        }
        // Stages run in declaration order, so dependencies must come first
        for dep in &stage.depends_on {
            if !seen.contains(dep.as_str()) {
                return invalid(format!(
                    "Stage '{}' depends on '{}', which is not declared before it",
                    stage.name, dep
                ));
            }
        }
        if !seen.insert(stage.name.as_str()) {
            return invalid(format!("Duplicate stage name '{}'", stage.name));
        }

        match stage.stage_type {
            StageType::Build if stage.config.image.is_none() => {
                return invalid(format!("Build stage '{}' requires an image", stage.name));
            }
            StageType::Deploy if stage.config.workload.is_none() => {
                return invalid(format!(
                    "Deploy stage '{}' requires a workload",
                    stage.name
                ));
            }
            _ => {}
        }

        if let Some(condition) = &stage.condition {
            for pattern in &condition.branches {
                validate_glob(pattern)?;
            }
        }
    }

    for trigger in &spec.triggers {
        for pattern in &trigger.branches {
            validate_glob(pattern)?;
        }
    }

    Ok(())
}

fn validate_glob(pattern: &str) -> Result<()> {
    glob_to_regex(pattern)
        .map(|_| ())
        .map_err(|e| PipelineError::Validation(format!("Invalid pattern '{}': {}", pattern, e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::repository::InMemoryPipelineRepository;
    use slipway_core::domain::pipeline::{PipelineStage, StageConfig, TriggerRule};
    use std::collections::HashMap;

    pub(crate) fn stage(name: &str, stage_type: StageType) -> PipelineStage {
        PipelineStage {
            name: name.to_string(),
            stage_type,
            timeout_seconds: 5,
            depends_on: vec![],
            condition: None,
            config: StageConfig::default(),
        }
    }

    pub(crate) fn spec(stages: Vec<PipelineStage>) -> PipelineSpec {
        PipelineSpec {
            name: "api".to_string(),
            description: None,
            repository: "github.com/acme/api".to_string(),
            stages,
            triggers: vec![TriggerRule {
                branches: vec!["main".to_string(), "master".to_string()],
                events: vec!["push".to_string()],
            }],
            variables: HashMap::new(),
            enabled: true,
            timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_update_bumps_version() {
        let repo = InMemoryPipelineRepository::new();
        let created = create_pipeline(&repo, spec(vec![stage("unit", StageType::Test)]))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let mut changed = spec(vec![stage("unit", StageType::Test)]);
        changed.name = "api-v2".to_string();
        let updated = update_pipeline(&repo, created.id, changed).await.unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(get_pipeline(&repo, created.id).await.unwrap().name, "api-v2");
    }

    #[tokio::test]
    async fn test_unknown_pipeline() {
        let repo = InMemoryPipelineRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            delete_pipeline(&repo, id).await,
            Err(PipelineError::NotFound(_))
        ));
        assert!(matches!(
            update_pipeline(&repo, id, spec(vec![stage("unit", StageType::Test)])).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_definitions() {
        assert!(validate_spec(&spec(vec![])).is_err());

        let dup = spec(vec![stage("a", StageType::Test), stage("a", StageType::Test)]);
        assert!(validate_spec(&dup).is_err());

        let mut forward = stage("a", StageType::Test);
        forward.depends_on = vec!["b".to_string()];
        assert!(validate_spec(&spec(vec![forward, stage("b", StageType::Test)])).is_err());

        assert!(validate_spec(&spec(vec![stage("build", StageType::Build)])).is_err());
        assert!(validate_spec(&spec(vec![stage("ship", StageType::Deploy)])).is_err());

        let mut zero = stage("a", StageType::Test);
        zero.timeout_seconds = 0;
        assert!(validate_spec(&spec(vec![zero])).is_err());
    }

    #[test]
    fn test_validation_accepts_ordered_dependencies() {
        let mut build = stage("build", StageType::Build);
        build.config.image = Some("registry/api:${SHORT_SHA}".to_string());
        let mut deploy = stage("deploy", StageType::Deploy);
        deploy.depends_on = vec!["build".to_string()];
        deploy.config.workload = Some("api".to_string());

        assert!(validate_spec(&spec(vec![build, deploy])).is_ok());
    }
}
