//! Cluster Module
//!
//! Access to the container orchestration API and the image registry.
//! Services talk to the cluster only through [`ClusterClient`], so the
//! scheduler and rollout logic can run against a scripted fake in tests.

pub mod kube;
pub mod registry;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use slipway_core::domain::rollout::WorkloadRef;
use std::collections::BTreeMap;
use thiserror::Error;

pub use kube::KubeClient;
pub use registry::RegistryClient;

/// Control-plane and registry errors
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("cluster API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

// =============================================================================
// Workloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadCondition {
    pub condition_type: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Snapshot of a workload's spec and rollout status
#[derive(Debug, Clone, Default)]
pub struct WorkloadStatus {
    pub containers: Vec<ContainerImage>,
    pub generation: i64,
    pub observed_generation: i64,
    pub desired_replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub conditions: Vec<WorkloadCondition>,
}

impl WorkloadStatus {
    /// Image of the named container, or of the first container
    pub fn image_of(&self, container: Option<&str>) -> Option<&str> {
        match container {
            Some(name) => self.containers.iter().find(|c| c.name == name),
            None => self.containers.first(),
        }
        .map(|c| c.image.as_str())
    }

    pub fn condition(&self, condition_type: &str) -> Option<&WorkloadCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// One-shot container run, used for image builds and test checks
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed(String),
}

// =============================================================================
// Events
// =============================================================================

/// Cluster event as forwarded on the `/stream` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ClusterEvent {
    pub uid: String,
    pub namespace: String,
    pub kind: String,
    pub object: String,
    pub reason: String,
    pub message: String,
    pub event_type: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Operations the controller needs from the orchestration API
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_workload(&self, workload: &WorkloadRef) -> ClusterResult<WorkloadStatus>;

    /// Sets the image of one container (the first when `container` is
    /// `None`) and merges `annotations` into the pod template
    async fn set_workload_image(
        &self,
        workload: &WorkloadRef,
        container: Option<&str>,
        image: &str,
        annotations: &BTreeMap<String, String>,
    ) -> ClusterResult<()>;

    async fn create_job(&self, spec: &JobSpec) -> ClusterResult<()>;

    async fn job_phase(&self, namespace: &str, name: &str) -> ClusterResult<JobPhase>;

    /// Full log output of the job's pod so far
    async fn job_logs(&self, namespace: &str, name: &str) -> ClusterResult<String>;

    async fn delete_job(&self, namespace: &str, name: &str) -> ClusterResult<()>;

    async fn list_events(&self, namespace: &str) -> ClusterResult<Vec<ClusterEvent>>;
}
