//! Deploy and rollback DTOs

use serde::{Deserialize, Serialize};

/// Body of `POST /deploy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub workload: String,
    pub namespace: String,
    pub image: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub auto_rollback: bool,
}

/// Body of `POST /rollback`; exactly one of `version` and `to_image`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub workload: String,
    pub namespace: String,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub to_image: Option<String>,
}
