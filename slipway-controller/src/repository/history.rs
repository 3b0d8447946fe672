//! Deployment History Repository
//!
//! Per-workload rollout history. Versions are allocated under the same write
//! lock that appends the entry, so they stay monotonic across concurrent
//! deploys of one workload.

use chrono::Utc;
use slipway_core::domain::rollout::{
    DeployTrigger, DeploymentStatus, DeploymentVersion, WorkloadRef,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{RepoResult, RepositoryError};

/// Entries kept per workload; the oldest are dropped first
const MAX_VERSIONS_PER_WORKLOAD: usize = 50;

/// Fields of a new history entry
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub workload: WorkloadRef,
    pub image: String,
    pub previous_image: Option<String>,
    pub trigger: DeployTrigger,
    pub status: DeploymentStatus,
    pub digest: Option<String>,
    pub message: Option<String>,
}

#[derive(Default)]
struct WorkloadHistory {
    last_version: u64,
    /// Oldest first
    entries: Vec<DeploymentVersion>,
}

#[derive(Default)]
pub struct DeploymentHistoryRepository {
    workloads: RwLock<HashMap<WorkloadRef, WorkloadHistory>>,
}

impl DeploymentHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns it with its allocated version
    pub async fn append(&self, deployment: NewDeployment) -> DeploymentVersion {
        let mut workloads = self.workloads.write().await;
        let history = workloads.entry(deployment.workload.clone()).or_default();

        history.last_version += 1;
        let entry = DeploymentVersion {
            version: history.last_version,
            workload: deployment.workload,
            image: deployment.image,
            previous_image: deployment.previous_image,
            trigger: deployment.trigger,
            status: deployment.status,
            digest: deployment.digest,
            message: deployment.message,
            deployed_at: Utc::now(),
        };
        history.entries.push(entry.clone());

        if history.entries.len() > MAX_VERSIONS_PER_WORKLOAD {
            let excess = history.entries.len() - MAX_VERSIONS_PER_WORKLOAD;
            history.entries.drain(..excess);
        }

        entry
    }

    pub async fn update_status(
        &self,
        workload: &WorkloadRef,
        version: u64,
        status: DeploymentStatus,
        message: Option<String>,
    ) -> RepoResult<()> {
        let mut workloads = self.workloads.write().await;
        let entry = workloads
            .get_mut(workload)
            .and_then(|h| h.entries.iter_mut().find(|e| e.version == version))
            .ok_or_else(|| RepositoryError::not_found("deployment", format!("{workload}@{version}")))?;

        entry.status = status;
        if message.is_some() {
            entry.message = message;
        }
        Ok(())
    }

    /// Newest first
    pub async fn list(&self, workload: &WorkloadRef) -> Vec<DeploymentVersion> {
        self.workloads
            .read()
            .await
            .get(workload)
            .map(|h| h.entries.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get(&self, workload: &WorkloadRef, version: u64) -> Option<DeploymentVersion> {
        self.workloads
            .read()
            .await
            .get(workload)
            .and_then(|h| h.entries.iter().find(|e| e.version == version).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(workload: &WorkloadRef, image: &str) -> NewDeployment {
        NewDeployment {
            workload: workload.clone(),
            image: image.to_string(),
            previous_image: None,
            trigger: DeployTrigger::Manual,
            status: DeploymentStatus::InProgress,
            digest: None,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_versions_are_per_workload() {
        let repo = DeploymentHistoryRepository::new();
        let web = WorkloadRef::new("default", "web");
        let worker = WorkloadRef::new("default", "worker");

        assert_eq!(repo.append(deployment(&web, "app:v1")).await.version, 1);
        assert_eq!(repo.append(deployment(&web, "app:v2")).await.version, 2);
        assert_eq!(repo.append(deployment(&worker, "job:v1")).await.version, 1);

        let history = repo.list(&web).await;
        assert_eq!(history[0].image, "app:v2");
        assert_eq!(history[1].image, "app:v1");
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = DeploymentHistoryRepository::new();
        let web = WorkloadRef::new("default", "web");
        let entry = repo.append(deployment(&web, "app:v1")).await;

        repo.update_status(
            &web,
            entry.version,
            DeploymentStatus::Failed,
            Some("timed out".to_string()),
        )
        .await
        .unwrap();

        let stored = repo.get(&web, entry.version).await.unwrap();
        assert_eq!(stored.status, DeploymentStatus::Failed);
        assert_eq!(stored.message.as_deref(), Some("timed out"));

        let missing = repo
            .update_status(&web, 99, DeploymentStatus::Healthy, None)
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let repo = DeploymentHistoryRepository::new();
        let web = WorkloadRef::new("default", "web");
        for i in 0..(MAX_VERSIONS_PER_WORKLOAD + 5) {
            repo.append(deployment(&web, &format!("app:{i}"))).await;
        }

        let history = repo.list(&web).await;
        assert_eq!(history.len(), MAX_VERSIONS_PER_WORKLOAD);
        assert_eq!(history[0].version, (MAX_VERSIONS_PER_WORKLOAD + 5) as u64);
        assert!(repo.get(&web, 1).await.is_none());
    }
}
