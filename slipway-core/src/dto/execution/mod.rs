//! Execution history DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionStatus, PipelineExecution};
use crate::domain::log::LogEntry;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Query parameters of `GET /executions`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionFilter {
    pub pipeline_id: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
    pub branch: Option<String>,
    pub author: Option<String>,
    pub repository: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// 1-based
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ExecutionFilter {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        (self.page() - 1) * self.per_page()
    }

    pub fn matches(&self, e: &PipelineExecution) -> bool {
        self.pipeline_id.is_none_or(|id| e.pipeline_id == id)
            && self.status.is_none_or(|s| e.status == s)
            && self.branch.as_deref().is_none_or(|b| e.branch == b)
            && self
                .author
                .as_deref()
                .is_none_or(|a| e.author.as_deref() == Some(a))
            && self
                .repository
                .as_deref()
                .is_none_or(|r| e.repository == r)
            && self.since.is_none_or(|t| e.started_at >= t)
            && self.until.is_none_or(|t| e.started_at <= t)
    }
}

/// Response of `GET /executions`, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPage {
    pub items: Vec<PipelineExecution>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Logs of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLogs {
    pub stage: String,
    pub log_id: Uuid,
    pub entries: Vec<LogEntry>,
}

/// Response of `GET /executions/{id}/logs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogs {
    pub execution_id: Uuid,
    pub stages: Vec<StageLogs>,
}

/// Payload of a streamed `log` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChunk {
    pub stage: String,
    pub entries: Vec<LogEntry>,
    pub next_offset: usize,
}
