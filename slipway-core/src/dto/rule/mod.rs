//! Auto-deploy rule DTOs

use serde::{Deserialize, Serialize};

/// Body of `POST /rules` and `PUT /rules/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub image_pattern: String,
    #[serde(default = "default_tag_pattern")]
    pub tag_pattern: String,
    pub namespace: String,
    pub workload: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_rollback: bool,
}

fn default_tag_pattern() -> String {
    "*".to_string()
}

fn default_enabled() -> bool {
    true
}
