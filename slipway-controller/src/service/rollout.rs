//! Rollout Controller
//!
//! Applies image changes to workloads and supervises each rollout with a
//! health check polled on its own task. A failed rollout may fire exactly
//! one automatic rollback to the previous image; the rollback's own check
//! never rolls back again.

use chrono::Utc;
use slipway_core::domain::event::ControllerEvent;
use slipway_core::domain::rollout::{
    DeployTrigger, DeploymentStatus, DeploymentVersion, FailureReason, HealthCheckStatus,
    HealthState, WorkloadRef,
};
use slipway_core::dto::deploy::RollbackRequest;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::EventBus;
use crate::cluster::{ClusterClient, ClusterError, WorkloadStatus};
use crate::config::Config;
use crate::repository::history::NewDeployment;
use crate::repository::{DeploymentHistoryRepository, HealthCheckRepository};

pub const ANNOTATION_TRIGGER: &str = "slipway.dev/deploy-trigger";
pub const ANNOTATION_PREVIOUS_IMAGE: &str = "slipway.dev/previous-image";
pub const ANNOTATION_DEPLOYED_AT: &str = "slipway.dev/deployed-at";

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("timed out waiting for rollout of {0}")]
    TimedOut(WorkloadRef),
}

pub type Result<T> = std::result::Result<T, RolloutError>;

/// One image change
#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub workload: WorkloadRef,
    pub image: String,
    pub container: Option<String>,
    pub auto_rollback: bool,
    pub trigger: DeployTrigger,
    pub digest: Option<String>,
}

/// Verdict of one health poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutHealth {
    Healthy,
    Stalled(String),
    Progressing(String),
}

/// Classifies a workload status snapshot
pub fn evaluate(status: &WorkloadStatus) -> RolloutHealth {
    if let Some(c) = status.condition("Progressing") {
        if c.status == "False" || c.reason.as_deref() == Some("ProgressDeadlineExceeded") {
            return RolloutHealth::Stalled(
                c.message
                    .clone()
                    .or_else(|| c.reason.clone())
                    .unwrap_or_else(|| "rollout is not progressing".to_string()),
            );
        }
    }
    if let Some(c) = status.condition("ReplicaFailure") {
        if c.status == "True" {
            return RolloutHealth::Stalled(
                c.message
                    .clone()
                    .unwrap_or_else(|| "replica failure".to_string()),
            );
        }
    }

    let desired = status.desired_replicas;
    if status.observed_generation >= status.generation
        && status.updated_replicas == desired
        && status.ready_replicas == desired
        && status.available_replicas == desired
    {
        return RolloutHealth::Healthy;
    }

    RolloutHealth::Progressing(format!(
        "{}/{} updated, {} ready, {} available",
        status.updated_replicas, desired, status.ready_replicas, status.available_replicas
    ))
}

#[derive(Clone)]
pub struct RolloutController {
    inner: Arc<Inner>,
}

struct Inner {
    cluster: Arc<dyn ClusterClient>,
    checks: Arc<HealthCheckRepository>,
    history: Arc<DeploymentHistoryRepository>,
    events: EventBus,
    poll_interval: Duration,
    max_attempts: u32,
    grace_period: Duration,
}

impl RolloutController {
    pub fn new(
        config: &Config,
        cluster: Arc<dyn ClusterClient>,
        checks: Arc<HealthCheckRepository>,
        history: Arc<DeploymentHistoryRepository>,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cluster,
                checks,
                history,
                events,
                poll_interval: config.health_poll_interval,
                max_attempts: config.health_max_attempts,
                grace_period: config.health_grace_period,
            }),
        }
    }

    /// Applies the image change and starts supervising it
    pub async fn deploy(&self, spec: DeploySpec) -> Result<HealthCheckStatus> {
        let check = self.start_rollout(spec).await?;
        self.spawn_monitor(check.id);
        Ok(check)
    }

    /// Manual rollback to a recorded version or an explicit image
    pub async fn rollback(&self, req: RollbackRequest) -> Result<HealthCheckStatus> {
        let workload = WorkloadRef::new(req.namespace, req.workload);

        let image = match (req.version, req.to_image) {
            (Some(_), Some(_)) => {
                return Err(RolloutError::InvalidInput(
                    "specify either version or to_image, not both".to_string(),
                ));
            }
            (None, Some(image)) => image,
            (Some(version), None) => {
                self.inner
                    .history
                    .get(&workload, version)
                    .await
                    .ok_or_else(|| {
                        RolloutError::NotFound(format!("version {} of {}", version, workload))
                    })?
                    .image
            }
            (None, None) => self
                .inner
                .history
                .list(&workload)
                .await
                .into_iter()
                .next()
                .and_then(|latest| latest.previous_image)
                .ok_or_else(|| {
                    RolloutError::InvalidInput(format!(
                        "no previous image recorded for {}",
                        workload
                    ))
                })?,
        };

        info!("Manual rollback of {} to {}", workload, image);

        self.deploy(DeploySpec {
            workload,
            image,
            container: None,
            auto_rollback: false,
            trigger: DeployTrigger::Rollback,
            digest: None,
        })
        .await
    }

    /// Waits until the check reaches a terminal state
    pub async fn wait_for_outcome(&self, id: Uuid, timeout: Duration) -> Result<HealthCheckStatus> {
        let deadline = Instant::now() + timeout;
        let mut interval = time::interval(self.inner.poll_interval);

        loop {
            interval.tick().await;

            let check = self
                .inner
                .checks
                .find_by_id(id)
                .await
                .ok_or_else(|| RolloutError::NotFound(format!("health check {}", id)))?;
            if check.status.is_terminal() {
                return Ok(check);
            }
            if Instant::now() >= deadline {
                return Err(RolloutError::TimedOut(check.workload));
            }
        }
    }

    pub async fn health_checks(&self) -> Vec<HealthCheckStatus> {
        self.inner.checks.list().await
    }

    /// The check still supervising `workload`, if any
    pub async fn active_check(&self, workload: &WorkloadRef) -> Option<HealthCheckStatus> {
        self.inner.checks.active_for(workload).await
    }

    pub async fn history(&self, workload: &WorkloadRef) -> Vec<DeploymentVersion> {
        self.inner.history.list(workload).await
    }

    // =========================================================================
    // Rollout lifecycle
    // =========================================================================

    async fn start_rollout(&self, spec: DeploySpec) -> Result<HealthCheckStatus> {
        let inner = &self.inner;

        let current = inner.cluster.get_workload(&spec.workload).await?;
        let previous_image = current
            .image_of(spec.container.as_deref())
            .map(str::to_string);

        let mut annotations = BTreeMap::from([
            (ANNOTATION_TRIGGER.to_string(), spec.trigger.to_string()),
            (ANNOTATION_DEPLOYED_AT.to_string(), Utc::now().to_rfc3339()),
        ]);
        if let Some(previous) = &previous_image {
            annotations.insert(ANNOTATION_PREVIOUS_IMAGE.to_string(), previous.clone());
        }

        inner
            .cluster
            .set_workload_image(
                &spec.workload,
                spec.container.as_deref(),
                &spec.image,
                &annotations,
            )
            .await?;

        let entry = inner
            .history
            .append(NewDeployment {
                workload: spec.workload.clone(),
                image: spec.image.clone(),
                previous_image: previous_image.clone(),
                trigger: spec.trigger,
                status: DeploymentStatus::InProgress,
                digest: spec.digest,
                message: None,
            })
            .await;

        let check = HealthCheckStatus {
            id: Uuid::new_v4(),
            workload: spec.workload.clone(),
            container: spec.container,
            target_image: spec.image.clone(),
            previous_image,
            status: HealthState::Pending,
            attempts: 0,
            max_attempts: inner.max_attempts,
            message: "waiting for rollout".to_string(),
            failure_reason: None,
            auto_rollback: spec.auto_rollback,
            rollback_triggered: false,
            trigger: spec.trigger,
            deployment_version: entry.version,
            started_at: Utc::now(),
            finished_at: None,
        };

        for old in inner.checks.open(check.clone()).await {
            info!("Health check {} for {} superseded", old.id, old.workload);
            self.record_outcome(&old, DeploymentStatus::Failed).await;
        }

        info!(
            "Deploying {} to {} (version {}, {})",
            spec.image, spec.workload, entry.version, spec.trigger
        );
        inner.events.publish(ControllerEvent::DeploymentStarted {
            workload: spec.workload,
            image: spec.image,
            version: entry.version,
            trigger: spec.trigger,
        });

        Ok(check)
    }

    fn spawn_monitor(&self, id: Uuid) {
        let controller = self.clone();
        tokio::spawn(async move { controller.monitor(id).await });
    }

    async fn monitor(self, id: Uuid) {
        let inner = Arc::clone(&self.inner);
        let mut interval = time::interval_at(
            Instant::now() + inner.poll_interval,
            inner.poll_interval,
        );
        let mut attempts = 0;

        loop {
            interval.tick().await;

            let Some(check) = inner.checks.find_by_id(id).await else {
                return;
            };
            // Superseded by a newer deploy
            if check.status.is_terminal() {
                break;
            }

            attempts += 1;
            let mut control_plane_error = false;

            match inner.cluster.get_workload(&check.workload).await {
                Ok(status) => match evaluate(&status) {
                    RolloutHealth::Healthy => {
                        self.complete_healthy(id, attempts).await;
                        break;
                    }
                    RolloutHealth::Stalled(message) => {
                        self.handle_failure(id, attempts, FailureReason::Stalled, message)
                            .await;
                        break;
                    }
                    RolloutHealth::Progressing(line) => {
                        self.record_progress(id, attempts, &line).await;
                    }
                },
                Err(e) => {
                    warn!("Health poll of {} failed: {}", check.workload, e);
                    control_plane_error = true;
                    self.record_progress(id, attempts, &format!("control plane error: {}", e))
                        .await;
                }
            }

            if attempts >= check.max_attempts {
                let reason = if control_plane_error {
                    FailureReason::ControlPlane
                } else {
                    FailureReason::Timeout
                };
                self.handle_failure(id, attempts, reason, format!("after {} attempts", attempts))
                    .await;
                break;
            }
        }

        // Keep the finished check queryable for a while
        time::sleep(inner.grace_period).await;
        inner.checks.remove(id).await;
        debug!("Health check {} expired", id);
    }

    async fn record_progress(&self, id: Uuid, attempts: u32, line: &str) {
        let Some((check, changed)) = self.inner.checks.record_progress(id, attempts, line).await
        else {
            return;
        };

        debug!(
            "Rollout of {} attempt {}/{}: {}",
            check.workload, attempts, check.max_attempts, line
        );
        if changed {
            self.inner.events.publish(ControllerEvent::RolloutProgress {
                health_check_id: id,
                workload: check.workload,
                status: check.status,
                attempts,
                message: check.message,
            });
        }
    }

    async fn complete_healthy(&self, id: Uuid, attempts: u32) {
        let Some(check) = self.inner.checks.mark_healthy(id, attempts).await else {
            return;
        };

        info!(
            "Rollout of {} to {} healthy after {} attempts",
            check.workload, check.target_image, attempts
        );
        self.record_outcome(&check, DeploymentStatus::Healthy).await;
    }

    /// Fails the check and fires the auto-rollback if this call claimed it
    async fn handle_failure(&self, id: Uuid, attempts: u32, reason: FailureReason, detail: String) {
        let message = format!("{}: {}", reason, detail);
        let Some(transition) = self
            .inner
            .checks
            .mark_failed(id, attempts, reason, &message)
            .await
        else {
            return;
        };

        let check = transition.check;
        warn!("Rollout of {} to {} failed: {}", check.workload, check.target_image, message);
        self.record_outcome(&check, DeploymentStatus::Failed).await;

        if transition.fire_rollback {
            self.auto_rollback(&check).await;
        }
    }

    async fn auto_rollback(&self, failed: &HealthCheckStatus) {
        let Some(previous) = failed.previous_image.clone() else {
            return;
        };

        warn!(
            "Rolling back {} from {} to {}",
            failed.workload, failed.target_image, previous
        );
        self.inner.events.publish(ControllerEvent::RollbackTriggered {
            workload: failed.workload.clone(),
            from_image: failed.target_image.clone(),
            to_image: previous.clone(),
        });

        let spec = DeploySpec {
            workload: failed.workload.clone(),
            image: previous.clone(),
            container: failed.container.clone(),
            auto_rollback: false,
            trigger: DeployTrigger::AutoRollback,
            digest: None,
        };

        match self.start_rollout(spec).await {
            Ok(check) => self.spawn_monitor(check.id),
            Err(e) => {
                error!("Auto-rollback of {} failed: {}", failed.workload, e);
                self.inner
                    .history
                    .append(NewDeployment {
                        workload: failed.workload.clone(),
                        image: previous,
                        previous_image: Some(failed.target_image.clone()),
                        trigger: DeployTrigger::AutoRollback,
                        status: DeploymentStatus::Failed,
                        digest: None,
                        message: Some(format!("rollback failed: {}", e)),
                    })
                    .await;
            }
        }
    }

    /// Mirrors a terminal check into history and onto the event bus
    async fn record_outcome(&self, check: &HealthCheckStatus, status: DeploymentStatus) {
        if let Err(e) = self
            .inner
            .history
            .update_status(
                &check.workload,
                check.deployment_version,
                status,
                Some(check.message.clone()),
            )
            .await
        {
            warn!("Failed to update history for {}: {}", check.workload, e);
        }

        self.inner
            .events
            .publish(ControllerEvent::HealthCheckCompleted {
                health_check_id: check.id,
                workload: check.workload.clone(),
                status: check.status,
                reason: check.failure_reason,
            });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cluster::WorkloadCondition;
    use crate::cluster::fake::{FakeCluster, Rollout};

    pub(crate) fn test_config() -> Config {
        Config {
            health_poll_interval: Duration::from_millis(5),
            health_max_attempts: 4,
            health_grace_period: Duration::from_secs(30),
            ..Config::default()
        }
    }

    pub(crate) fn controller(cluster: Arc<FakeCluster>) -> RolloutController {
        RolloutController::new(
            &test_config(),
            cluster,
            Arc::new(HealthCheckRepository::new()),
            Arc::new(DeploymentHistoryRepository::new()),
            EventBus::new(),
        )
    }

    fn web() -> WorkloadRef {
        WorkloadRef::new("default", "web")
    }

    fn spec(image: &str, auto_rollback: bool) -> DeploySpec {
        DeploySpec {
            workload: web(),
            image: image.to_string(),
            container: None,
            auto_rollback,
            trigger: DeployTrigger::Manual,
            digest: None,
        }
    }

    async fn eventually<F, Fut>(mut probe: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if probe().await {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    fn converged() -> WorkloadStatus {
        WorkloadStatus {
            generation: 3,
            observed_generation: 3,
            desired_replicas: 2,
            updated_replicas: 2,
            ready_replicas: 2,
            available_replicas: 2,
            ..WorkloadStatus::default()
        }
    }

    #[test]
    fn test_evaluate_classifies_status() {
        assert_eq!(evaluate(&converged()), RolloutHealth::Healthy);

        let stale = WorkloadStatus {
            observed_generation: 2,
            ..converged()
        };
        assert!(matches!(evaluate(&stale), RolloutHealth::Progressing(_)));

        let partial = WorkloadStatus {
            ready_replicas: 1,
            ..converged()
        };
        assert_eq!(
            evaluate(&partial),
            RolloutHealth::Progressing("2/2 updated, 1 ready, 2 available".to_string())
        );

        let failing = WorkloadStatus {
            conditions: vec![WorkloadCondition {
                condition_type: "ReplicaFailure".to_string(),
                status: "True".to_string(),
                reason: Some("FailedCreate".to_string()),
                message: Some("quota exceeded".to_string()),
            }],
            ..converged()
        };
        assert_eq!(
            evaluate(&failing),
            RolloutHealth::Stalled("quota exceeded".to_string())
        );
    }

    #[tokio::test]
    async fn test_healthy_rollout() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", true)).await.unwrap();
        assert_eq!(check.previous_image.as_deref(), Some("app:v1"));

        let done = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.status, HealthState::Healthy);

        let history = rollout.history(&web()).await;
        assert_eq!(history[0].status, DeploymentStatus::Healthy);
        assert_eq!(history[0].previous_image.as_deref(), Some("app:v1"));

        let annotations = cluster.last_annotations().unwrap();
        assert_eq!(annotations[ANNOTATION_TRIGGER], "manual");
        assert_eq!(annotations[ANNOTATION_PREVIOUS_IMAGE], "app:v1");
    }

    #[tokio::test]
    async fn test_never_ready_rollout_times_out_and_rolls_back() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.set_behaviour("app:v2", Rollout::Progressing);
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", true)).await.unwrap();
        let failed = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(failed.status, HealthState::Failed);
        assert_eq!(failed.failure_reason, Some(FailureReason::Timeout));
        assert_eq!(failed.attempts, 4);
        assert!(failed.rollback_triggered);

        let history = rollout.history(&web()).await;
        let v2 = history.iter().find(|v| v.image == "app:v2").unwrap();
        assert_eq!(v2.status, DeploymentStatus::Failed);
        assert!(v2.message.as_deref().unwrap().contains("timed out"));

        eventually(|| {
            let rollout = rollout.clone();
            async move {
                rollout
                    .history(&web())
                    .await
                    .first()
                    .is_some_and(|v| v.status == DeploymentStatus::Healthy)
            }
        })
        .await;

        let latest = &rollout.history(&web()).await[0];
        assert_eq!(latest.image, "app:v1");
        assert_eq!(latest.trigger, DeployTrigger::AutoRollback);
        assert_eq!(cluster.current_image(&web()).as_deref(), Some("app:v1"));
    }

    #[tokio::test]
    async fn test_stalled_rollout_rolls_back_at_most_once() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.set_behaviour("app:v1", Rollout::Stalled);
        cluster.set_behaviour("app:v2", Rollout::Stalled);
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", true)).await.unwrap();
        let failed = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(failed.failure_reason, Some(FailureReason::Stalled));
        assert_eq!(failed.attempts, 1);

        // The rollback's own check also stalls but must not roll back again
        eventually(|| {
            let rollout = rollout.clone();
            async move {
                rollout
                    .health_checks()
                    .await
                    .iter()
                    .filter(|c| c.status == HealthState::Failed)
                    .count()
                    == 2
            }
        })
        .await;
        time::sleep(Duration::from_millis(50)).await;

        let images: Vec<String> = cluster.image_updates().into_iter().map(|(_, i)| i).collect();
        assert_eq!(images, vec!["app:v2".to_string(), "app:v1".to_string()]);
    }

    #[tokio::test]
    async fn test_no_rollback_when_disabled() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.set_behaviour("app:v2", Rollout::Stalled);
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", false)).await.unwrap();
        let failed = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();
        time::sleep(Duration::from_millis(30)).await;

        assert!(!failed.rollback_triggered);
        assert_eq!(cluster.image_updates().len(), 1);
        assert_eq!(cluster.current_image(&web()).as_deref(), Some("app:v2"));
    }

    #[tokio::test]
    async fn test_control_plane_errors_count_as_attempts() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.fail_reads_after_update(2);
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", false)).await.unwrap();
        let done = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(done.status, HealthState::Healthy);
        assert_eq!(done.attempts, 3);
    }

    #[tokio::test]
    async fn test_persistent_control_plane_errors_fail_the_check() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.fail_reads_after_update(10);
        let rollout = controller(cluster.clone());

        let check = rollout.deploy(spec("app:v2", false)).await.unwrap();
        let done = rollout
            .wait_for_outcome(check.id, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(done.status, HealthState::Failed);
        assert_eq!(done.failure_reason, Some(FailureReason::ControlPlane));
    }

    #[tokio::test]
    async fn test_new_deploy_supersedes_running_check() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        cluster.set_behaviour("app:v2", Rollout::Progressing);
        let rollout = controller(cluster.clone());

        let first = rollout.deploy(spec("app:v2", true)).await.unwrap();
        let second = rollout.deploy(spec("app:v3", true)).await.unwrap();

        let superseded = rollout
            .wait_for_outcome(first.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(superseded.failure_reason, Some(FailureReason::Superseded));
        assert!(!superseded.rollback_triggered);

        let done = rollout
            .wait_for_outcome(second.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.status, HealthState::Healthy);
        assert_eq!(cluster.current_image(&web()).as_deref(), Some("app:v3"));
    }

    #[tokio::test]
    async fn test_manual_rollback_to_version() {
        let cluster = Arc::new(FakeCluster::new());
        cluster.add_workload(&web(), "app:v1");
        let rollout = controller(cluster.clone());

        let first = rollout.deploy(spec("app:v2", false)).await.unwrap();
        rollout
            .wait_for_outcome(first.id, Duration::from_secs(2))
            .await
            .unwrap();
        let second = rollout.deploy(spec("app:v3", false)).await.unwrap();
        rollout
            .wait_for_outcome(second.id, Duration::from_secs(2))
            .await
            .unwrap();

        let check = rollout
            .rollback(RollbackRequest {
                workload: "web".to_string(),
                namespace: "default".to_string(),
                version: Some(1),
                to_image: None,
            })
            .await
            .unwrap();

        assert_eq!(check.target_image, "app:v2");
        assert_eq!(check.trigger, DeployTrigger::Rollback);
        assert_eq!(rollout.history(&web()).await[0].version, 3);

        let missing = rollout
            .rollback(RollbackRequest {
                workload: "web".to_string(),
                namespace: "default".to_string(),
                version: Some(42),
                to_image: None,
            })
            .await;
        assert!(matches!(missing, Err(RolloutError::NotFound(_))));
    }
}
