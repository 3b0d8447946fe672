//! Repository Module
//!
//! Data access layer for the controller.
//! Each repository owns one collection and its own lock, so a write to the
//! queue never blocks a read of execution history.

pub mod events;
pub mod execution;
pub mod health_check;
pub mod history;
pub mod job;
pub mod log;
pub mod pipeline;
pub mod rule;

use slipway_core::domain::job::JobStatus;
use thiserror::Error;
use uuid::Uuid;

// Re-export for convenience
pub use events::WebhookEventLog;
pub use execution::{ExecutionRepository, InMemoryExecutionRepository, PgExecutionRepository};
pub use health_check::HealthCheckRepository;
pub use history::DeploymentHistoryRepository;
pub use job::{InMemoryJobRepository, JobRepository};
pub use log::LogStore;
pub use pipeline::{InMemoryPipelineRepository, PgPipelineRepository, PipelineRepository};
pub use rule::RuleRepository;

/// Storage-level errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("queue is full ({limit} jobs queued)")]
    QueueFull { limit: usize },
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;
