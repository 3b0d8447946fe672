//! Trigger Router
//!
//! Turns a normalized webhook event into build jobs, one per matching
//! pipeline.

use slipway_core::domain::job::{BuildJob, TriggerType};
use slipway_core::domain::pipeline::Pipeline;
use slipway_core::domain::webhook::WebhookEvent;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::pattern::{matches_any, repository_matches};
use super::queue::{BuildQueue, NewJob};
use crate::repository::PipelineRepository;

/// Enabled pipelines with at least one trigger rule matching the event
///
/// Pure function of its inputs: identical pipeline state and event always
/// select the same pipelines, in the same order.
pub fn matching_pipelines<'a>(pipelines: &'a [Pipeline], event: &WebhookEvent) -> Vec<&'a Pipeline> {
    pipelines
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| repository_matches(&p.repository, &event.repository))
        .filter(|p| {
            p.triggers.iter().any(|rule| {
                matches_any(&rule.branches, &event.branch)
                    && matches_any(&rule.events, &event.event_type)
            })
        })
        .collect()
}

pub struct TriggerRouter {
    pipelines: Arc<dyn PipelineRepository>,
    queue: Arc<BuildQueue>,
}

impl TriggerRouter {
    pub fn new(pipelines: Arc<dyn PipelineRepository>, queue: Arc<BuildQueue>) -> Self {
        Self { pipelines, queue }
    }

    /// Admits one job per matching pipeline and records the outcome on the
    /// event. Rejected admissions are noted in `event.error` and not retried.
    pub async fn route(&self, event: &mut WebhookEvent) -> Vec<BuildJob> {
        let pipelines = match self.pipelines.list_all().await {
            Ok(pipelines) => pipelines,
            Err(e) => {
                warn!("Cannot load pipelines for event {}: {}", event.id, e);
                event.error = Some(format!("failed to load pipelines: {}", e));
                return Vec::new();
            }
        };

        let matched = matching_pipelines(&pipelines, event);
        if matched.is_empty() {
            debug!(
                "No pipeline matches {} {} on {}",
                event.event_type, event.repository, event.branch
            );
        }

        let mut jobs = Vec::new();
        let mut errors = Vec::new();
        for pipeline in matched {
            let req = NewJob {
                branch: Some(event.branch.clone()),
                commit_sha: Some(event.commit_sha.clone()),
                author: event.author.clone(),
                ..NewJob::new(pipeline.id, TriggerType::Webhook)
            };

            match self.queue.enqueue(req).await {
                Ok(job) => {
                    event.build_ids.push(job.id);
                    jobs.push(job);
                }
                Err(e) => {
                    warn!("Event {} not admitted for {}: {}", event.id, pipeline.name, e);
                    errors.push(format!("{}: {}", pipeline.name, e));
                }
            }
        }

        if !errors.is_empty() {
            event.error = Some(errors.join("; "));
        }
        event.processed = true;

        info!(
            "Event {} ({} {}@{}) started {} builds",
            event.id,
            event.source,
            event.repository,
            event.branch,
            jobs.len()
        );
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::repository::{
        InMemoryExecutionRepository, InMemoryJobRepository, InMemoryPipelineRepository,
    };
    use crate::service::events::EventBus;
    use crate::service::pipeline::{create_pipeline, tests as pipeline_tests};
    use crate::service::queue::JobHandler;
    use async_trait::async_trait;
    use chrono::Utc;
    use slipway_core::domain::pipeline::{StageType, TriggerRule};
    use slipway_core::domain::webhook::WebhookSource;
    use slipway_core::dto::pipeline::PipelineSpec;
    use uuid::Uuid;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn run(&self, _job: BuildJob) {}
    }

    fn push(repository: &str, branch: &str) -> WebhookEvent {
        WebhookEvent {
            id: Uuid::new_v4(),
            source: WebhookSource::Github,
            event_type: "push".to_string(),
            repository: repository.to_string(),
            branch: branch.to_string(),
            commit_sha: "0123456789abcdef".to_string(),
            author: Some("dana".to_string()),
            signature_valid: true,
            processed: false,
            build_ids: vec![],
            error: None,
            received_at: Utc::now(),
        }
    }

    fn pipeline_spec() -> PipelineSpec {
        pipeline_tests::spec(vec![pipeline_tests::stage("unit", StageType::Test)])
    }

    async fn router(max_queue_size: usize, specs: Vec<PipelineSpec>) -> TriggerRouter {
        let config = Config {
            max_queue_size,
            ..Config::default()
        };
        let pipelines = Arc::new(InMemoryPipelineRepository::new());
        for spec in specs {
            create_pipeline(pipelines.as_ref(), spec).await.unwrap();
        }
        let queue = Arc::new(BuildQueue::new(
            &config,
            Arc::new(InMemoryJobRepository::new()),
            pipelines.clone(),
            Arc::new(InMemoryExecutionRepository::new()),
            Arc::new(NoopHandler),
            EventBus::new(),
        ));
        TriggerRouter::new(pipelines, queue)
    }

    #[tokio::test]
    async fn test_push_to_main_creates_one_webhook_job() {
        let router = router(10, vec![pipeline_spec()]).await;
        let mut event = push("https://github.com/acme/api.git", "main");

        let jobs = router.route(&mut event).await;

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].trigger, TriggerType::Webhook);
        assert_eq!(jobs[0].branch, "main");
        assert_eq!(jobs[0].commit_sha, "0123456789abcdef");
        assert_eq!(event.build_ids, vec![jobs[0].id]);
        assert!(event.processed);
        assert!(event.error.is_none());
    }

    #[tokio::test]
    async fn test_non_matching_events_create_nothing() {
        let mut disabled = pipeline_spec();
        disabled.enabled = false;
        let router = router(10, vec![pipeline_spec(), disabled]).await;

        assert!(router.route(&mut push("github.com/acme/api", "develop")).await.is_empty());
        assert!(router.route(&mut push("github.com/acme/web", "main")).await.is_empty());

        let mut tag = push("github.com/acme/api", "main");
        tag.event_type = "tag".to_string();
        assert!(router.route(&mut tag).await.is_empty());

        // Only the enabled pipeline fires
        assert_eq!(router.route(&mut push("github.com/acme/api", "master")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_pipeline_triggers_once_even_with_overlapping_rules() {
        let mut spec = pipeline_spec();
        spec.triggers.push(TriggerRule {
            branches: vec!["*".to_string()],
            events: vec![],
        });
        let router = router(10, vec![spec]).await;

        assert_eq!(router.route(&mut push("github.com/acme/api", "main")).await.len(), 1);
    }

    #[tokio::test]
    async fn test_queue_rejection_is_recorded_on_event() {
        let mut second = pipeline_spec();
        second.name = "api-docs".to_string();
        let router = router(1, vec![pipeline_spec(), second]).await;
        let mut event = push("github.com/acme/api", "main");

        let jobs = router.route(&mut event).await;

        assert_eq!(jobs.len(), 1);
        assert!(event.processed);
        assert!(event.error.as_deref().unwrap().contains("queue is full"));
    }

    #[test]
    fn test_matching_is_deterministic() {
        let now = Utc::now();
        let pipelines: Vec<Pipeline> = ["release/*", "main"]
            .iter()
            .map(|branch| Pipeline {
                id: Uuid::new_v4(),
                name: format!("p-{}", branch),
                description: None,
                repository: "gitea.local/acme/api".to_string(),
                stages: vec![],
                triggers: vec![TriggerRule {
                    branches: vec![branch.to_string()],
                    events: vec!["push".to_string()],
                }],
                variables: Default::default(),
                enabled: true,
                version: 1,
                timeout_seconds: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let event = push("https://gitea.local/acme/api.git", "release/2.0");
        let first: Vec<Uuid> = matching_pipelines(&pipelines, &event).iter().map(|p| p.id).collect();
        let second: Vec<Uuid> = matching_pipelines(&pipelines, &event).iter().map(|p| p.id).collect();

        assert_eq!(first, vec![pipelines[0].id]);
        assert_eq!(first, second);
    }
}
