//! Build Queue
//!
//! Bounded, prioritized admission of build jobs and their dispatch to the
//! executor. Dispatch is driven by the scheduler tick; each tick fills every
//! free concurrency slot.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use slipway_core::domain::event::ControllerEvent;
use slipway_core::domain::execution::ExecutionStatus;
use slipway_core::domain::job::{BuildJob, JobPriority, JobStatus, TriggerType};
use slipway_core::dto::job::QueueStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::EventBus;
use crate::config::Config;
use crate::repository::{
    ExecutionRepository, JobRepository, PipelineRepository, RepositoryError,
};

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_COMMIT: &str = "HEAD";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("pipeline {0} not found")]
    PipelineNotFound(Uuid),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("queue is full ({0} jobs queued)")]
    QueueFull(usize),

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for QueueError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::QueueFull { limit } => QueueError::QueueFull(limit),
            RepositoryError::InvalidTransition { .. } => QueueError::InvalidState(err.to_string()),
            other => QueueError::Repository(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Runs a claimed job to completion
///
/// Implementations own the job from `running` until it reaches a terminal
/// status.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: BuildJob);
}

/// Everything needed to admit one job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub pipeline_id: Uuid,
    pub branch: Option<String>,
    pub commit_sha: Option<String>,
    pub author: Option<String>,
    pub priority: JobPriority,
    pub trigger: TriggerType,
    pub variables: HashMap<String, String>,
    pub retry_count: u32,
}

impl NewJob {
    pub fn new(pipeline_id: Uuid, trigger: TriggerType) -> Self {
        Self {
            pipeline_id,
            branch: None,
            commit_sha: None,
            author: None,
            priority: JobPriority::Normal,
            trigger,
            variables: HashMap::new(),
            retry_count: 0,
        }
    }
}

pub struct BuildQueue {
    jobs: Arc<dyn JobRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    executions: Arc<dyn ExecutionRepository>,
    handler: Arc<dyn JobHandler>,
    events: EventBus,
    paused: AtomicBool,
    max_concurrent: usize,
    max_queue_size: usize,
    estimate_window: usize,
    retention: Duration,
}

impl BuildQueue {
    pub fn new(
        config: &Config,
        jobs: Arc<dyn JobRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        executions: Arc<dyn ExecutionRepository>,
        handler: Arc<dyn JobHandler>,
        events: EventBus,
    ) -> Self {
        Self {
            jobs,
            pipelines,
            executions,
            handler,
            events,
            paused: AtomicBool::new(false),
            max_concurrent: config.max_concurrent_builds,
            max_queue_size: config.max_queue_size,
            estimate_window: config.estimate_window,
            retention: config.job_retention,
        }
    }

    /// Admits a job or rejects it synchronously
    pub async fn enqueue(&self, req: NewJob) -> Result<BuildJob> {
        let pipeline = self
            .pipelines
            .find_by_id(req.pipeline_id)
            .await?
            .ok_or(QueueError::PipelineNotFound(req.pipeline_id))?;

        if !pipeline.enabled {
            return Err(QueueError::InvalidState(format!(
                "pipeline '{}' is disabled",
                pipeline.name
            )));
        }

        let job = BuildJob {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            pipeline_name: pipeline.name,
            repository: pipeline.repository,
            branch: req.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            commit_sha: req.commit_sha.unwrap_or_else(|| DEFAULT_COMMIT.to_string()),
            author: req.author,
            priority: req.priority,
            status: JobStatus::Queued,
            trigger: req.trigger,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            retry_count: req.retry_count,
            execution_id: None,
            error_message: None,
            variables: req.variables,
        };

        let job = self.jobs.admit(job, self.max_queue_size).await?;

        info!(
            "Job {} queued for pipeline {} ({}, priority {:?})",
            job.id, job.pipeline_name, job.trigger, job.priority
        );
        self.events.publish(ControllerEvent::BuildQueued {
            job_id: job.id,
            pipeline_id: job.pipeline_id,
        });

        Ok(job)
    }

    /// Starts queued jobs until the concurrency limit is reached; returns
    /// how many were started
    pub async fn dispatch_once(&self) -> Result<usize> {
        if self.is_paused() {
            return Ok(0);
        }

        let mut started = 0;
        while let Some(job) = self.jobs.claim_next(self.max_concurrent).await? {
            let job = self.with_estimate(job).await;

            info!("Dispatching job {} ({})", job.id, job.pipeline_name);
            self.events.publish(ControllerEvent::JobStatusChanged {
                job_id: job.id,
                status: JobStatus::Running,
            });

            self.spawn_handler(job);
            started += 1;
        }

        if started > 0 {
            debug!("Dispatch tick started {} jobs", started);
        }
        Ok(started)
    }

    /// Runs the handler on its own task; a panic there fails the job
    fn spawn_handler(&self, job: BuildJob) {
        let handler = Arc::clone(&self.handler);
        let jobs = Arc::clone(&self.jobs);
        let executions = Arc::clone(&self.executions);
        let events = self.events.clone();
        let job_id = job.id;

        tokio::spawn(async move {
            let run = tokio::spawn(async move { handler.run(job).await });
            let Err(e) = run.await else {
                return;
            };

            error!("Build runner for job {} aborted: {}", job_id, e);
            let message = format!("build runner aborted: {}", e);
            match jobs
                .transition(job_id, JobStatus::Failed, Some(message.clone()))
                .await
            {
                Ok(job) => {
                    events.publish(ControllerEvent::JobStatusChanged {
                        job_id,
                        status: JobStatus::Failed,
                    });
                    if let Some(execution_id) = job.execution_id {
                        fail_execution(executions.as_ref(), execution_id, message).await;
                    }
                }
                Err(e) => warn!("Failed to fail aborted job {}: {}", job_id, e),
            }
        });
    }

    /// Estimated completion from the mean of recent successful durations
    async fn with_estimate(&self, mut job: BuildJob) -> BuildJob {
        let durations = match self
            .executions
            .recent_success_durations(job.pipeline_id, self.estimate_window)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                warn!("Cannot estimate completion for job {}: {}", job.id, e);
                return job;
            }
        };
        if durations.is_empty() {
            return job;
        }

        let mean_ms = durations.iter().sum::<u64>() / durations.len() as u64;
        let base = job.started_at.unwrap_or_else(Utc::now);
        let estimate = base + ChronoDuration::milliseconds(mean_ms as i64);

        if let Err(e) = self.jobs.set_estimate(job.id, estimate).await {
            warn!("Failed to store estimate for job {}: {}", job.id, e);
        }
        job.estimated_completion = Some(estimate);
        job
    }

    pub async fn get(&self, id: Uuid) -> Result<BuildJob> {
        self.jobs.find_by_id(id).await?.ok_or(QueueError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<BuildJob>> {
        Ok(self.jobs.list_all().await?)
    }

    /// Cancels a queued job; running jobs are not preemptible
    pub async fn cancel(&self, id: Uuid) -> Result<BuildJob> {
        let job = self.get(id).await?;
        if job.status != JobStatus::Queued {
            return Err(QueueError::InvalidState(format!(
                "job {} is {} and cannot be cancelled",
                id, job.status
            )));
        }

        let job = self.jobs.transition(id, JobStatus::Cancelled, None).await?;

        info!("Job {} cancelled", id);
        self.events.publish(ControllerEvent::JobStatusChanged {
            job_id: id,
            status: JobStatus::Cancelled,
        });
        Ok(job)
    }

    /// Admits a new job repeating the given execution
    pub async fn retry(&self, execution_id: Uuid) -> Result<BuildJob> {
        let execution = self
            .executions
            .find_by_id(execution_id)
            .await?
            .ok_or(QueueError::ExecutionNotFound(execution_id))?;

        // The original job may already have been swept
        let original = self.jobs.find_by_id(execution.job_id).await?;

        let req = NewJob {
            pipeline_id: execution.pipeline_id,
            branch: Some(execution.branch),
            commit_sha: Some(execution.commit_sha),
            author: execution.author,
            priority: original
                .as_ref()
                .map(|j| j.priority)
                .unwrap_or_default(),
            trigger: TriggerType::Retry,
            variables: original
                .as_ref()
                .map(|j| j.variables.clone())
                .unwrap_or_default(),
            retry_count: original.map(|j| j.retry_count).unwrap_or(0) + 1,
        };

        info!("Retrying execution {}", execution_id);
        self.enqueue(req).await
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("Queue dispatch paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("Queue dispatch resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> Result<QueueStatus> {
        Ok(QueueStatus {
            paused: self.is_paused(),
            queued: self.jobs.count_by_status(JobStatus::Queued).await?,
            running: self.jobs.count_by_status(JobStatus::Running).await?,
            max_concurrent: self.max_concurrent,
            max_queue_size: self.max_queue_size,
        })
    }

    /// Removes finished jobs older than the retention window
    pub async fn sweep(&self) -> Result<usize> {
        let retention =
            ChronoDuration::from_std(self.retention).unwrap_or_else(|_| ChronoDuration::days(1));
        let removed = self.jobs.purge_finished(Utc::now() - retention).await?;
        if removed > 0 {
            info!("Swept {} finished jobs", removed);
        }
        Ok(removed)
    }
}

/// Closes an execution left `running` by an aborted runner
async fn fail_execution(executions: &dyn ExecutionRepository, id: Uuid, message: String) {
    let mut execution = match executions.find_by_id(id).await {
        Ok(Some(execution)) if !execution.is_finished() => execution,
        Ok(_) => return,
        Err(e) => {
            warn!("Failed to load execution {}: {}", id, e);
            return;
        }
    };

    let finished_at = Utc::now();
    execution.status = ExecutionStatus::Failed;
    execution.finished_at = Some(finished_at);
    execution.duration_ms =
        Some((finished_at - execution.started_at).num_milliseconds().max(0) as u64);
    execution.error_message = Some(message);
    if let Err(e) = executions.update(&execution).await {
        warn!("Failed to update execution {}: {}", id, e);
    }
}
