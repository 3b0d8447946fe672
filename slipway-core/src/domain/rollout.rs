//! Rollout, health-check and deployment history types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deployable unit in the cluster, addressed by namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Health-check lifecycle: `pending -> checking -> {healthy, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Pending,
    Checking,
    Healthy,
    Failed,
}

impl HealthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HealthState::Healthy | HealthState::Failed)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Pending => write!(f, "pending"),
            HealthState::Checking => write!(f, "checking"),
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a rollout was declared failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Stalled,
    Timeout,
    ControlPlane,
    /// A newer deploy replaced this check before it finished
    Superseded,
}

impl FailureReason {
    /// Superseded checks never trigger a rollback
    pub fn allows_rollback(self) -> bool {
        !matches!(self, FailureReason::Superseded)
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Stalled => write!(f, "stalled"),
            FailureReason::Timeout => write!(f, "timed out"),
            FailureReason::ControlPlane => write!(f, "control plane error"),
            FailureReason::Superseded => write!(f, "superseded"),
        }
    }
}

/// Origin of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployTrigger {
    Manual,
    Pipeline,
    Registry,
    Rollback,
    AutoRollback,
}

impl DeployTrigger {
    pub fn is_rollback(self) -> bool {
        matches!(self, DeployTrigger::Rollback | DeployTrigger::AutoRollback)
    }
}

impl std::fmt::Display for DeployTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployTrigger::Manual => write!(f, "manual"),
            DeployTrigger::Pipeline => write!(f, "pipeline"),
            DeployTrigger::Registry => write!(f, "registry"),
            DeployTrigger::Rollback => write!(f, "rollback"),
            DeployTrigger::AutoRollback => write!(f, "auto-rollback"),
        }
    }
}

/// Rollout supervision state for one workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckStatus {
    pub id: Uuid,
    pub workload: WorkloadRef,
    /// Container whose image was changed; `None` means the first one
    pub container: Option<String>,
    pub target_image: String,
    pub previous_image: Option<String>,
    pub status: HealthState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub message: String,
    pub failure_reason: Option<FailureReason>,
    pub auto_rollback: bool,
    /// Set once, together with the failure transition that fires a rollback
    pub rollback_triggered: bool,
    pub trigger: DeployTrigger,
    /// History entry this check reports into
    pub deployment_version: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    InProgress,
    Healthy,
    Failed,
}

/// One entry in a workload's rollout history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentVersion {
    /// Monotonic per workload, starting at 1
    pub version: u64,
    pub workload: WorkloadRef,
    pub image: String,
    pub previous_image: Option<String>,
    pub trigger: DeployTrigger,
    pub status: DeploymentStatus,
    pub digest: Option<String>,
    pub message: Option<String>,
    pub deployed_at: DateTime<Utc>,
}

/// "Images matching this pattern deploy to that workload"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoDeployRule {
    pub id: Uuid,
    pub name: String,
    /// Glob over the registry repository, e.g. `acme/*`
    pub image_pattern: String,
    /// Glob over the pushed tag, e.g. `v*`
    pub tag_pattern: String,
    pub workload: WorkloadRef,
    pub container: Option<String>,
    pub enabled: bool,
    pub auto_rollback: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
