//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default per-stage timeout when a definition omits one.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;

/// Pipeline definition
///
/// Read-only while an execution is in flight; updates bump `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Source repository this pipeline builds (e.g. `github.com/acme/api`)
    pub repository: String,
    pub stages: Vec<PipelineStage>,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub enabled: bool,
    pub version: u32,
    /// Optional wall-clock bound on a whole execution
    pub timeout_seconds: Option<u64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// One step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    #[serde(rename = "type")]
    pub stage_type: StageType,
    #[serde(default = "default_stage_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub condition: Option<StageCondition>,
    #[serde(default)]
    pub config: StageConfig,
}

fn default_stage_timeout() -> u64 {
    DEFAULT_STAGE_TIMEOUT_SECS
}

/// Stage kind
///
/// Unknown kinds are kept verbatim in `Other` so definitions written for newer
/// controllers still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StageType {
    Build,
    Deploy,
    Test,
    Custom,
    Other(String),
}

impl From<String> for StageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "build" => StageType::Build,
            "deploy" => StageType::Deploy,
            "test" => StageType::Test,
            "custom" => StageType::Custom,
            _ => StageType::Other(s),
        }
    }
}

impl From<StageType> for String {
    fn from(t: StageType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for StageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageType::Build => write!(f, "build"),
            StageType::Deploy => write!(f, "deploy"),
            StageType::Test => write!(f, "test"),
            StageType::Custom => write!(f, "custom"),
            StageType::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Run condition for a stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCondition {
    /// Branch glob patterns; empty means "any branch"
    #[serde(default)]
    pub branches: Vec<String>,
}

/// Type-specific stage settings
///
/// String fields may contain `${VAR}` placeholders expanded at run time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    /// Build: destination image. Deploy: image to roll out. Test: image to run.
    pub image: Option<String>,
    /// Build: sub-path of the repository used as the build context
    pub context: Option<String>,
    /// Build: Dockerfile path relative to the context
    pub dockerfile: Option<String>,
    /// Deploy: target workload name
    pub workload: Option<String>,
    /// Deploy: target namespace
    pub namespace: Option<String>,
    /// Deploy: container to update (defaults to the first one)
    pub container: Option<String>,
    /// Deploy: roll back automatically when the rollout fails
    #[serde(default)]
    pub auto_rollback: bool,
    /// Test: command run inside `image`
    #[serde(default)]
    pub command: Vec<String>,
}

/// Webhook trigger rule
///
/// Empty lists and lists containing `*` match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRule {
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}
