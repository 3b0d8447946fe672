//! Health Check Repository
//!
//! Rollout supervision records. At most one non-terminal check exists per
//! workload; opening a new one supersedes the previous.

use chrono::Utc;
use slipway_core::domain::rollout::{FailureReason, HealthCheckStatus, HealthState, WorkloadRef};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of a failure transition
#[derive(Debug, Clone)]
pub struct FailureTransition {
    pub check: HealthCheckStatus,
    /// True exactly once per check: the caller must perform the rollback
    pub fire_rollback: bool,
}

#[derive(Default)]
pub struct HealthCheckRepository {
    checks: RwLock<HashMap<Uuid, HealthCheckStatus>>,
}

impl HealthCheckRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new check and returns the checks it superseded
    pub async fn open(&self, check: HealthCheckStatus) -> Vec<HealthCheckStatus> {
        let mut checks = self.checks.write().await;
        let now = Utc::now();

        let mut superseded = Vec::new();
        for existing in checks.values_mut() {
            if existing.workload == check.workload && !existing.status.is_terminal() {
                existing.status = HealthState::Failed;
                existing.failure_reason = Some(FailureReason::Superseded);
                existing.message = format!("superseded by deploy of {}", check.target_image);
                existing.finished_at = Some(now);
                superseded.push(existing.clone());
            }
        }

        checks.insert(check.id, check);
        superseded
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<HealthCheckStatus> {
        self.checks.read().await.get(&id).cloned()
    }

    pub async fn active_for(&self, workload: &WorkloadRef) -> Option<HealthCheckStatus> {
        self.checks
            .read()
            .await
            .values()
            .find(|c| &c.workload == workload && !c.status.is_terminal())
            .cloned()
    }

    /// Newest first
    pub async fn list(&self) -> Vec<HealthCheckStatus> {
        let mut checks: Vec<HealthCheckStatus> =
            self.checks.read().await.values().cloned().collect();
        checks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        checks
    }

    /// Records one non-terminal poll. The message is replaced only when it
    /// changed; the returned flag says whether it did.
    pub async fn record_progress(
        &self,
        id: Uuid,
        attempts: u32,
        message: &str,
    ) -> Option<(HealthCheckStatus, bool)> {
        let mut checks = self.checks.write().await;
        let check = checks.get_mut(&id)?;
        if check.status.is_terminal() {
            return None;
        }

        check.status = HealthState::Checking;
        check.attempts = attempts;
        let changed = check.message != message;
        if changed {
            check.message = message.to_string();
        }

        Some((check.clone(), changed))
    }

    /// Moves a non-terminal check to `healthy`
    pub async fn mark_healthy(&self, id: Uuid, attempts: u32) -> Option<HealthCheckStatus> {
        let mut checks = self.checks.write().await;
        let check = checks.get_mut(&id)?;
        if check.status.is_terminal() {
            return None;
        }

        check.status = HealthState::Healthy;
        check.attempts = attempts;
        check.message = "rollout complete".to_string();
        check.finished_at = Some(Utc::now());
        Some(check.clone())
    }

    /// Moves a check to `failed` and claims the rollback guard in the same
    /// critical section.
    ///
    /// Repeated failure reports for the same check never claim the guard
    /// twice. Returns `None` for unknown or already-healthy checks.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        attempts: u32,
        reason: FailureReason,
        message: &str,
    ) -> Option<FailureTransition> {
        let mut checks = self.checks.write().await;
        let check = checks.get_mut(&id)?;

        match check.status {
            HealthState::Healthy => return None,
            HealthState::Failed => {}
            HealthState::Pending | HealthState::Checking => {
                check.status = HealthState::Failed;
                check.attempts = attempts;
                check.failure_reason = Some(reason);
                check.message = message.to_string();
                check.finished_at = Some(Utc::now());
            }
        }

        let fire_rollback = check.auto_rollback
            && check.previous_image.is_some()
            && !check.rollback_triggered
            && check.failure_reason.is_some_and(FailureReason::allows_rollback);
        if fire_rollback {
            check.rollback_triggered = true;
        }

        Some(FailureTransition {
            check: check.clone(),
            fire_rollback,
        })
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.checks.write().await.remove(&id).is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use slipway_core::domain::rollout::DeployTrigger;

    pub(crate) fn check(workload: &WorkloadRef, previous: Option<&str>) -> HealthCheckStatus {
        HealthCheckStatus {
            id: Uuid::new_v4(),
            workload: workload.clone(),
            container: None,
            target_image: "registry/app:v2".to_string(),
            previous_image: previous.map(str::to_string),
            status: HealthState::Pending,
            attempts: 0,
            max_attempts: 3,
            message: "waiting for rollout".to_string(),
            failure_reason: None,
            auto_rollback: true,
            rollback_triggered: false,
            trigger: DeployTrigger::Manual,
            deployment_version: 1,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn test_rollback_guard_claimed_once() {
        let repo = HealthCheckRepository::new();
        let workload = WorkloadRef::new("default", "web");
        let c = check(&workload, Some("registry/app:v1"));
        repo.open(c.clone()).await;

        let first = repo
            .mark_failed(c.id, 1, FailureReason::Stalled, "stalled")
            .await
            .unwrap();
        let second = repo
            .mark_failed(c.id, 1, FailureReason::Stalled, "stalled")
            .await
            .unwrap();

        assert!(first.fire_rollback);
        assert!(!second.fire_rollback);
        assert!(second.check.rollback_triggered);
    }

    #[tokio::test]
    async fn test_no_rollback_without_previous_image() {
        let repo = HealthCheckRepository::new();
        let c = check(&WorkloadRef::new("default", "web"), None);
        repo.open(c.clone()).await;

        let result = repo
            .mark_failed(c.id, 3, FailureReason::Timeout, "timed out")
            .await
            .unwrap();
        assert!(!result.fire_rollback);
        assert_eq!(result.check.status, HealthState::Failed);
    }

    #[tokio::test]
    async fn test_open_supersedes_active_check_for_same_workload() {
        let repo = HealthCheckRepository::new();
        let workload = WorkloadRef::new("default", "web");
        let old = check(&workload, Some("registry/app:v1"));
        repo.open(old.clone()).await;
        let other = check(&WorkloadRef::new("default", "worker"), None);
        repo.open(other.clone()).await;

        let superseded = repo.open(check(&workload, Some("registry/app:v2"))).await;

        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].id, old.id);
        assert_eq!(
            superseded[0].failure_reason,
            Some(FailureReason::Superseded)
        );
        assert!(repo.active_for(&workload).await.is_some());
        let later = repo
            .mark_failed(old.id, 1, FailureReason::Superseded, "again")
            .await
            .unwrap();
        assert!(!later.fire_rollback);
    }

    #[tokio::test]
    async fn test_progress_message_changes_are_reported() {
        let repo = HealthCheckRepository::new();
        let c = check(&WorkloadRef::new("default", "web"), None);
        repo.open(c.clone()).await;

        let (_, changed) = repo.record_progress(c.id, 1, "1/3 ready").await.unwrap();
        assert!(changed);
        let (_, changed) = repo.record_progress(c.id, 2, "1/3 ready").await.unwrap();
        assert!(!changed);
        let (state, changed) = repo.record_progress(c.id, 3, "2/3 ready").await.unwrap();
        assert!(changed);
        assert_eq!(state.status, HealthState::Checking);
        assert_eq!(state.attempts, 3);
    }
}
