//! Structured controller events
//!
//! Published on the in-process event bus and forwarded to streaming clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionStatus, StageStatus};
use crate::domain::job::JobStatus;
use crate::domain::rollout::{DeployTrigger, FailureReason, HealthState, WorkloadRef};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    BuildQueued {
        job_id: Uuid,
        pipeline_id: Uuid,
    },
    BuildStarted {
        job_id: Uuid,
        execution_id: Uuid,
        pipeline_id: Uuid,
        build_number: u64,
    },
    StageStarted {
        execution_id: Uuid,
        stage: String,
    },
    StageCompleted {
        execution_id: Uuid,
        stage: String,
        status: StageStatus,
    },
    BuildCompleted {
        job_id: Uuid,
        execution_id: Uuid,
        status: ExecutionStatus,
    },
    JobStatusChanged {
        job_id: Uuid,
        status: JobStatus,
    },
    DeploymentStarted {
        workload: WorkloadRef,
        image: String,
        version: u64,
        trigger: DeployTrigger,
    },
    RolloutProgress {
        health_check_id: Uuid,
        workload: WorkloadRef,
        status: HealthState,
        attempts: u32,
        message: String,
    },
    HealthCheckCompleted {
        health_check_id: Uuid,
        workload: WorkloadRef,
        status: HealthState,
        reason: Option<FailureReason>,
    },
    RollbackTriggered {
        workload: WorkloadRef,
        from_image: String,
        to_image: String,
    },
}

impl ControllerEvent {
    /// Execution this event belongs to, if any
    pub fn execution_id(&self) -> Option<Uuid> {
        match self {
            ControllerEvent::BuildStarted { execution_id, .. }
            | ControllerEvent::StageStarted { execution_id, .. }
            | ControllerEvent::StageCompleted { execution_id, .. }
            | ControllerEvent::BuildCompleted { execution_id, .. } => Some(*execution_id),
            _ => None,
        }
    }

    /// Channel name on the cluster-wide stream, if the event belongs there
    pub fn cluster_stream_name(&self) -> Option<&'static str> {
        match self {
            ControllerEvent::DeploymentStarted { .. } => Some("deployments"),
            ControllerEvent::RolloutProgress { .. } => Some("rollout-progress"),
            ControllerEvent::HealthCheckCompleted { .. }
            | ControllerEvent::RollbackTriggered { .. } => Some("health-checks"),
            _ => None,
        }
    }
}
