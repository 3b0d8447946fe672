//! Inbound webhook event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Provider that sent a webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookSource {
    Github,
    Gitea,
    Gitlab,
    Generic,
}

impl std::fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookSource::Github => write!(f, "github"),
            WebhookSource::Gitea => write!(f, "gitea"),
            WebhookSource::Gitlab => write!(f, "gitlab"),
            WebhookSource::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for WebhookSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(WebhookSource::Github),
            "gitea" => Ok(WebhookSource::Gitea),
            "gitlab" => Ok(WebhookSource::Gitlab),
            "generic" => Ok(WebhookSource::Generic),
            other => Err(format!("unsupported webhook source '{}'", other)),
        }
    }
}

/// Normalized inbound trigger payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub source: WebhookSource,
    /// `push`, `pull_request`, `tag`, ...
    pub event_type: String,
    pub repository: String,
    pub branch: String,
    pub commit_sha: String,
    pub author: Option<String>,
    pub signature_valid: bool,
    pub processed: bool,
    pub build_ids: Vec<Uuid>,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Normalized registry push notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub id: Uuid,
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
    pub processed: bool,
    pub auto_deploy: bool,
    pub rule_id: Option<Uuid>,
    pub health_check_id: Option<Uuid>,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}
