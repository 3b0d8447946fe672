//! Auto-Deploy Service
//!
//! Registry pushes are matched against auto-deploy rules; the first enabled
//! match rolls the pushed image out to the rule's workload.

use chrono::Utc;
use slipway_core::domain::rollout::{AutoDeployRule, DeployTrigger, WorkloadRef};
use slipway_core::domain::webhook::RegistryEvent;
use slipway_core::dto::rule::RuleSpec;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::pattern::{glob_matches, glob_to_regex};
use super::rollout::{DeploySpec, RolloutController};
use crate::cluster::RegistryClient;
use crate::repository::{RepositoryError, RuleRepository};

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Rules whose image and tag patterns both match, in stored order
pub fn matching_rules<'a>(
    rules: &'a [AutoDeployRule],
    repository: &str,
    tag: &str,
) -> Vec<&'a AutoDeployRule> {
    rules
        .iter()
        .filter(|r| glob_matches(&r.image_pattern, repository) && glob_matches(&r.tag_pattern, tag))
        .collect()
}

pub struct AutoDeployer {
    rules: Arc<RuleRepository>,
    rollout: RolloutController,
    registry: Arc<RegistryClient>,
    image_prefix: Option<String>,
}

impl AutoDeployer {
    pub fn new(
        rules: Arc<RuleRepository>,
        rollout: RolloutController,
        registry: Arc<RegistryClient>,
        image_prefix: Option<String>,
    ) -> Self {
        Self {
            rules,
            rollout,
            registry,
            image_prefix,
        }
    }

    /// Applies the rules to one registry push and returns the annotated event
    pub async fn handle(&self, mut event: RegistryEvent) -> RegistryEvent {
        let rules = self.rules.list().await;
        let matching = matching_rules(&rules, &event.repository, &event.tag);

        let Some(rule) = matching.iter().find(|r| r.enabled) else {
            if let Some(disabled) = matching.first() {
                debug!(
                    "Rule '{}' matches {}:{} but is disabled",
                    disabled.name, event.repository, event.tag
                );
                event.rule_id = Some(disabled.id);
            }
            event.processed = false;
            event.auto_deploy = false;
            return event;
        };

        event.rule_id = Some(rule.id);

        if event.digest.is_none() {
            match self
                .registry
                .manifest_digest(&event.repository, &event.tag)
                .await
            {
                Ok(digest) => event.digest = Some(digest),
                Err(e) => warn!(
                    "Digest lookup for {}:{} failed: {}",
                    event.repository, event.tag, e
                ),
            }
        }

        let image = self.image_ref(&event.repository, &event.tag);
        info!(
            "Rule '{}' deploys {} to {}",
            rule.name, image, rule.workload
        );

        let spec = DeploySpec {
            workload: rule.workload.clone(),
            image,
            container: rule.container.clone(),
            auto_rollback: rule.auto_rollback,
            trigger: DeployTrigger::Registry,
            digest: event.digest.clone(),
        };

        event.processed = true;
        match self.rollout.deploy(spec).await {
            Ok(check) => {
                event.auto_deploy = true;
                event.health_check_id = Some(check.id);
            }
            Err(e) => {
                warn!("Auto-deploy of {}:{} failed: {}", event.repository, event.tag, e);
                event.auto_deploy = false;
                event.error = Some(e.to_string());
            }
        }
        event
    }

    /// Pullable reference for a registry repository and tag
    fn image_ref(&self, repository: &str, tag: &str) -> String {
        match &self.image_prefix {
            Some(prefix) => format!("{}/{}:{}", prefix.trim_end_matches('/'), repository, tag),
            None => format!("{}:{}", repository, tag),
        }
    }

    // =========================================================================
    // Rule management
    // =========================================================================

    pub async fn list_rules(&self) -> Vec<AutoDeployRule> {
        self.rules.list().await
    }

    pub async fn create_rule(&self, spec: RuleSpec) -> Result<AutoDeployRule, RuleError> {
        validate_rule(&spec)?;

        let now = Utc::now();
        let rule = AutoDeployRule {
            id: Uuid::new_v4(),
            name: spec.name,
            image_pattern: spec.image_pattern,
            tag_pattern: spec.tag_pattern,
            workload: WorkloadRef::new(spec.namespace, spec.workload),
            container: spec.container,
            enabled: spec.enabled,
            auto_rollback: spec.auto_rollback,
            created_at: now,
            updated_at: now,
        };

        let rule = self.rules.create(rule).await?;
        info!("Auto-deploy rule created: {} ({})", rule.name, rule.id);
        Ok(rule)
    }

    pub async fn update_rule(&self, id: Uuid, spec: RuleSpec) -> Result<AutoDeployRule, RuleError> {
        validate_rule(&spec)?;

        let existing = self.rules.find_by_id(id).await.ok_or(RuleError::NotFound(id))?;
        let rule = AutoDeployRule {
            id,
            name: spec.name,
            image_pattern: spec.image_pattern,
            tag_pattern: spec.tag_pattern,
            workload: WorkloadRef::new(spec.namespace, spec.workload),
            container: spec.container,
            enabled: spec.enabled,
            auto_rollback: spec.auto_rollback,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };

        if !self.rules.update(rule.clone()).await? {
            return Err(RuleError::NotFound(id));
        }
        Ok(rule)
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<(), RuleError> {
        if !self.rules.delete(id).await? {
            return Err(RuleError::NotFound(id));
        }
        info!("Auto-deploy rule deleted: {}", id);
        Ok(())
    }
}

fn validate_rule(spec: &RuleSpec) -> Result<(), RuleError> {
    for (field, value) in [
        ("name", &spec.name),
        ("image_pattern", &spec.image_pattern),
        ("tag_pattern", &spec.tag_pattern),
        ("namespace", &spec.namespace),
        ("workload", &spec.workload),
    ] {
        if value.trim().is_empty() {
            return Err(RuleError::Validation(format!("{} cannot be empty", field)));
        }
    }

    for pattern in [&spec.image_pattern, &spec.tag_pattern] {
        glob_to_regex(pattern).map_err(|e| {
            RuleError::Validation(format!("invalid pattern '{}': {}", pattern, e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeCluster;
    use crate::repository::rule::tests::rule;
    use crate::service::rollout::tests::controller;
    use slipway_core::domain::rollout::HealthState;

    fn push(repository: &str, tag: &str) -> RegistryEvent {
        RegistryEvent {
            id: Uuid::new_v4(),
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest: Some("sha256:0a1b".to_string()),
            processed: false,
            auto_deploy: false,
            rule_id: None,
            health_check_id: None,
            error: None,
            received_at: Utc::now(),
        }
    }

    async fn deployer(cluster: Arc<FakeCluster>, rules: Vec<AutoDeployRule>) -> AutoDeployer {
        let repo = Arc::new(RuleRepository::in_memory());
        for r in rules {
            repo.create(r).await.unwrap();
        }
        AutoDeployer::new(
            repo,
            controller(cluster),
            Arc::new(RegistryClient::new("http://registry.invalid")),
            Some("registry.local:5000".to_string()),
        )
    }

    #[tokio::test]
    async fn test_disabled_rule_does_not_deploy() {
        let cluster = Arc::new(FakeCluster::new());
        let disabled = rule("acme/*", "v*", false);
        let deployer = deployer(cluster.clone(), vec![disabled.clone()]).await;

        let event = deployer.handle(push("acme/web", "v2")).await;

        assert!(!event.processed);
        assert!(!event.auto_deploy);
        assert_eq!(event.rule_id, Some(disabled.id));
        assert!(cluster.image_updates().is_empty());
    }

    #[tokio::test]
    async fn test_matching_rule_deploys_prefixed_image() {
        let cluster = Arc::new(FakeCluster::new());
        let target = WorkloadRef::new("default", "web");
        cluster.add_workload(&target, "registry.local:5000/acme/web:v1");
        let deployer = deployer(
            cluster.clone(),
            vec![rule("acme/*", "v*", false), rule("acme/*", "v*", true)],
        ).await;

        let event = deployer.handle(push("acme/web", "v2")).await;

        assert!(event.processed);
        assert!(event.auto_deploy);
        assert!(event.health_check_id.is_some());
        assert_eq!(
            cluster.current_image(&target).as_deref(),
            Some("registry.local:5000/acme/web:v2")
        );

        let history = deployer.rollout.history(&target).await;
        assert_eq!(history[0].trigger, DeployTrigger::Registry);
        assert_eq!(history[0].digest.as_deref(), Some("sha256:0a1b"));
        let checks = deployer.rollout.health_checks().await;
        assert_ne!(checks[0].status, HealthState::Failed);
    }

    #[tokio::test]
    async fn test_unmatched_tag_is_left_alone() {
        let cluster = Arc::new(FakeCluster::new());
        let deployer = deployer(cluster.clone(), vec![rule("acme/*", "v*", true)]).await;

        let event = deployer.handle(push("acme/web", "latest")).await;
        assert!(!event.processed);
        assert!(event.rule_id.is_none());
    }

    #[tokio::test]
    async fn test_deploy_failure_is_recorded() {
        // Workload unknown to the cluster
        let cluster = Arc::new(FakeCluster::new());
        let deployer = deployer(cluster, vec![rule("acme/*", "*", true)]).await;

        let event = deployer.handle(push("acme/web", "v3")).await;
        assert!(event.processed);
        assert!(!event.auto_deploy);
        assert!(event.error.is_some());
    }

    #[tokio::test]
    async fn test_rule_validation_and_lifecycle() {
        let deployer = deployer(Arc::new(FakeCluster::new()), vec![]).await;
        let spec = RuleSpec {
            name: "web".to_string(),
            image_pattern: "acme/web".to_string(),
            tag_pattern: "v*".to_string(),
            namespace: "prod".to_string(),
            workload: "web".to_string(),
            container: None,
            enabled: true,
            auto_rollback: true,
        };

        let created = deployer.create_rule(spec.clone()).await.unwrap();
        assert_eq!(created.workload, WorkloadRef::new("prod", "web"));

        let disabled = RuleSpec {
            enabled: false,
            ..spec.clone()
        };
        let updated = deployer.update_rule(created.id, disabled).await.unwrap();
        assert!(!updated.enabled);

        let empty = RuleSpec {
            workload: " ".to_string(),
            ..spec
        };
        assert!(matches!(
            deployer.create_rule(empty).await,
            Err(RuleError::Validation(_))
        ));

        deployer.delete_rule(created.id).await.unwrap();
        assert!(matches!(
            deployer.delete_rule(created.id).await,
            Err(RuleError::NotFound(_))
        ));
    }
}
