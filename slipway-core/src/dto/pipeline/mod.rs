//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::JobPriority;
use crate::domain::pipeline::{PipelineStage, TriggerRule};

/// Body of `POST /pipelines` and `PUT /pipelines/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub repository: String,
    pub stages: Vec<PipelineStage>,
    #[serde(default)]
    pub triggers: Vec<TriggerRule>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

/// Body of `POST /pipelines/{id}/trigger`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerPipeline {
    /// Defaults to `main`
    #[serde(default)]
    pub branch: Option<String>,
    /// Defaults to `HEAD`
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub priority: Option<JobPriority>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}
