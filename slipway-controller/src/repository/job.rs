//! Job Repository
//!
//! Holds the build queue. Admission, dispatch and status transitions each
//! happen under a single write lock so the queue bound and the concurrency
//! bound are checked against the same snapshot they modify.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slipway_core::domain::job::{BuildJob, JobStatus};
use std::cmp::Ordering;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RepoResult, RepositoryError};

/// Repository trait for build jobs
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Stores a queued job unless `max_queued` jobs are already queued
    async fn admit(&self, job: BuildJob, max_queued: usize) -> RepoResult<BuildJob>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<BuildJob>>;

    /// All jobs in admission order
    async fn list_all(&self) -> RepoResult<Vec<BuildJob>>;

    /// Moves the highest-priority queued job to `running` if fewer than
    /// `max_running` jobs are running
    async fn claim_next(&self, max_running: usize) -> RepoResult<Option<BuildJob>>;

    /// Applies a forward status transition and stamps the completion time
    /// for terminal states
    async fn transition(
        &self,
        id: Uuid,
        to: JobStatus,
        error_message: Option<String>,
    ) -> RepoResult<BuildJob>;

    async fn set_execution(&self, id: Uuid, execution_id: Uuid) -> RepoResult<()>;

    async fn set_estimate(&self, id: Uuid, estimate: DateTime<Utc>) -> RepoResult<()>;

    async fn count_by_status(&self, status: JobStatus) -> RepoResult<usize>;

    /// Removes terminal jobs completed before `cutoff`; never touches queued
    /// or running jobs
    async fn purge_finished(&self, cutoff: DateTime<Utc>) -> RepoResult<usize>;
}

/// Dispatch order: priority descending, then oldest first
///
/// Used with a stable sort over admission order, so equal timestamps keep
/// FIFO order.
pub fn dispatch_order(a: &BuildJob, b: &BuildJob) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.queued_at.cmp(&b.queued_at))
}

/// In-memory implementation of JobRepository
///
/// Jobs are kept in a `Vec` in admission order.
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<Vec<BuildJob>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn admit(&self, job: BuildJob, max_queued: usize) -> RepoResult<BuildJob> {
        let mut jobs = self.jobs.write().await;

        let queued = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .count();
        if queued >= max_queued {
            return Err(RepositoryError::QueueFull { limit: max_queued });
        }

        jobs.push(job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<BuildJob>> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn list_all(&self) -> RepoResult<Vec<BuildJob>> {
        Ok(self.jobs.read().await.clone())
    }

    async fn claim_next(&self, max_running: usize) -> RepoResult<Option<BuildJob>> {
        let mut jobs = self.jobs.write().await;

        let running = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .count();
        if running >= max_running {
            return Ok(None);
        }

        let mut queued: Vec<(usize, &BuildJob)> = jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Queued)
            .collect();
        queued.sort_by(|(_, a), (_, b)| dispatch_order(a, b));

        let Some(&(index, _)) = queued.first() else {
            return Ok(None);
        };

        let job = &mut jobs[index];
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());

        Ok(Some(job.clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        to: JobStatus,
        error_message: Option<String>,
    ) -> RepoResult<BuildJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| RepositoryError::not_found("job", id))?;

        if !job.status.can_transition_to(to) {
            return Err(RepositoryError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        job.status = to;
        if to == JobStatus::Running {
            job.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        if error_message.is_some() {
            job.error_message = error_message;
        }

        Ok(job.clone())
    }

    async fn set_execution(&self, id: Uuid, execution_id: Uuid) -> RepoResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| RepositoryError::not_found("job", id))?;
        job.execution_id = Some(execution_id);
        Ok(())
    }

    async fn set_estimate(&self, id: Uuid, estimate: DateTime<Utc>) -> RepoResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| RepositoryError::not_found("job", id))?;
        job.estimated_completion = Some(estimate);
        Ok(())
    }

    async fn count_by_status(&self, status: JobStatus) -> RepoResult<usize> {
        Ok(self
            .jobs
            .read()
            .await
            .iter()
            .filter(|j| j.status == status)
            .count())
    }

    async fn purge_finished(&self, cutoff: DateTime<Utc>) -> RepoResult<usize> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|j| {
            !(j.status.is_terminal() && j.completed_at.is_some_and(|done| done < cutoff))
        });
        Ok(before - jobs.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use slipway_core::domain::job::{JobPriority, TriggerType};
    use std::collections::HashMap;

    pub(crate) fn queued_job(priority: JobPriority) -> BuildJob {
        BuildJob {
            id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            pipeline_name: "api".to_string(),
            repository: "github.com/acme/api".to_string(),
            branch: "main".to_string(),
            commit_sha: "abc1234".to_string(),
            author: None,
            priority,
            status: JobStatus::Queued,
            trigger: TriggerType::Manual,
            queued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            retry_count: 0,
            execution_id: None,
            error_message: None,
            variables: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_admit_rejects_when_full() {
        let repo = InMemoryJobRepository::new();
        repo.admit(queued_job(JobPriority::Normal), 2).await.unwrap();
        repo.admit(queued_job(JobPriority::Normal), 2).await.unwrap();

        let result = repo.admit(queued_job(JobPriority::Critical), 2).await;
        assert!(matches!(result, Err(RepositoryError::QueueFull { limit: 2 })));
        assert_eq!(repo.count_by_status(JobStatus::Queued).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_claim_respects_priority_then_fifo() {
        let repo = InMemoryJobRepository::new();
        let first = repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();
        let urgent = repo
            .admit(queued_job(JobPriority::Critical), 10)
            .await
            .unwrap();
        let second = repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();

        let mut order = Vec::new();
        while let Some(job) = repo.claim_next(1).await.unwrap() {
            order.push(job.id);
            repo.transition(job.id, JobStatus::Success, None)
                .await
                .unwrap();
        }

        assert_eq!(order, vec![urgent.id, first.id, second.id]);
    }

    #[tokio::test]
    async fn test_claim_stops_at_concurrency_limit() {
        let repo = InMemoryJobRepository::new();
        for _ in 0..5 {
            repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();
        }

        assert!(repo.claim_next(2).await.unwrap().is_some());
        assert!(repo.claim_next(2).await.unwrap().is_some());
        assert!(repo.claim_next(2).await.unwrap().is_none());
        assert_eq!(repo.count_by_status(JobStatus::Running).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_running_job_cannot_be_cancelled_back_to_queued() {
        let repo = InMemoryJobRepository::new();
        let job = repo.admit(queued_job(JobPriority::Low), 10).await.unwrap();
        repo.claim_next(1).await.unwrap();

        let result = repo.transition(job.id, JobStatus::Queued, None).await;
        assert!(matches!(
            result,
            Err(RepositoryError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_keeps_active_jobs() {
        let repo = InMemoryJobRepository::new();
        let done = repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();
        repo.transition(done.id, JobStatus::Cancelled, None)
            .await
            .unwrap();
        let running = repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();
        repo.claim_next(1).await.unwrap();
        let queued = repo.admit(queued_job(JobPriority::Normal), 10).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(repo.purge_finished(cutoff).await.unwrap(), 1);

        assert!(repo.find_by_id(done.id).await.unwrap().is_none());
        assert!(repo.find_by_id(running.id).await.unwrap().is_some());
        assert!(repo.find_by_id(queued.id).await.unwrap().is_some());
    }
}
