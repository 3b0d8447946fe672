//! Build queue DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::job::JobPriority;

/// Body of `POST /queue`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueJob {
    pub pipeline_id: Uuid,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Response of `GET /queue/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub paused: bool,
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
}
