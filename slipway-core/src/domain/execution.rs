//! Pipeline execution history types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::TriggerType;
use crate::domain::pipeline::StageType;

/// Durable record of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_name: String,
    pub job_id: Uuid,
    /// Strictly increasing per pipeline
    pub build_number: u64,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub author: Option<String>,
    pub trigger: TriggerType,
    pub stages: Vec<StageExecution>,
    pub status: ExecutionStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

impl PipelineExecution {
    pub fn is_finished(&self) -> bool {
        self.status != ExecutionStatus::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// Result of one stage within an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    pub status: StageStatus,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<u64>,
    /// Key into the log store
    pub log_id: Uuid,
    pub error: Option<String>,
    /// Stage product, e.g. the image a build pushed
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Running,
    Success,
    Failed,
    Skipped,
}
