//! Shared handler state

use std::sync::Arc;

use crate::cluster::{ClusterClient, RegistryClient};
use crate::config::Config;
use crate::repository::{ExecutionRepository, LogStore, PipelineRepository, WebhookEventLog};
use crate::service::{AutoDeployer, BuildQueue, EventBus, RolloutController, TriggerRouter};

/// Everything the HTTP handlers reach into; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipelines: Arc<dyn PipelineRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub logs: Arc<LogStore>,
    pub queue: Arc<BuildQueue>,
    pub router: Arc<TriggerRouter>,
    pub rollout: RolloutController,
    pub autodeploy: Arc<AutoDeployer>,
    pub event_log: Arc<WebhookEventLog>,
    pub cluster: Arc<dyn ClusterClient>,
    pub registry: Arc<RegistryClient>,
    pub events: EventBus,
}
