//! Execution Repository
//!
//! Pipeline execution history with a per-pipeline build-number counter and
//! an explicit retention policy (newest executions win).

use async_trait::async_trait;
use slipway_core::domain::execution::{ExecutionStatus, PipelineExecution};
use slipway_core::dto::execution::{ExecutionFilter, ExecutionPage};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::RepoResult;

/// Repository trait for execution history
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Allocates the next build number for a pipeline
    ///
    /// Numbers are never reused, even after history is trimmed.
    async fn next_build_number(&self, pipeline_id: Uuid) -> RepoResult<u64>;

    async fn insert(&self, execution: &PipelineExecution) -> RepoResult<()>;

    async fn update(&self, execution: &PipelineExecution) -> RepoResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<PipelineExecution>>;

    /// Filtered page, newest first
    async fn list(&self, filter: &ExecutionFilter) -> RepoResult<ExecutionPage>;

    /// Durations (ms) of the pipeline's most recent successful runs
    async fn recent_success_durations(&self, pipeline_id: Uuid, limit: usize)
    -> RepoResult<Vec<u64>>;

    /// Drops the oldest finished executions beyond `keep` and returns them
    async fn enforce_retention(&self, keep: usize) -> RepoResult<Vec<PipelineExecution>>;
}

/// In-memory implementation of ExecutionRepository
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    /// Oldest first
    executions: RwLock<Vec<PipelineExecution>>,
    counters: Mutex<HashMap<Uuid, u64>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn next_build_number(&self, pipeline_id: Uuid) -> RepoResult<u64> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(pipeline_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert(&self, execution: &PipelineExecution) -> RepoResult<()> {
        self.executions.write().await.push(execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &PipelineExecution) -> RepoResult<()> {
        let mut executions = self.executions.write().await;
        match executions.iter_mut().find(|e| e.id == execution.id) {
            Some(existing) => *existing = execution.clone(),
            None => executions.push(execution.clone()),
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<PipelineExecution>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn list(&self, filter: &ExecutionFilter) -> RepoResult<ExecutionPage> {
        let executions = self.executions.read().await;
        let matching: Vec<&PipelineExecution> =
            executions.iter().rev().filter(|e| filter.matches(e)).collect();

        let items = matching
            .iter()
            .skip(filter.offset())
            .take(filter.per_page())
            .map(|e| (*e).clone())
            .collect();

        Ok(ExecutionPage {
            items,
            total: matching.len(),
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    async fn recent_success_durations(
        &self,
        pipeline_id: Uuid,
        limit: usize,
    ) -> RepoResult<Vec<u64>> {
        Ok(self
            .executions
            .read()
            .await
            .iter()
            .rev()
            .filter(|e| e.pipeline_id == pipeline_id && e.status == ExecutionStatus::Success)
            .filter_map(|e| e.duration_ms)
            .take(limit)
            .collect())
    }

    async fn enforce_retention(&self, keep: usize) -> RepoResult<Vec<PipelineExecution>> {
        let mut executions = self.executions.write().await;
        let finished = executions.iter().filter(|e| e.is_finished()).count();
        if finished <= keep {
            return Ok(Vec::new());
        }

        let mut to_drop = finished - keep;
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *executions)
            .into_iter()
            .partition(|e| {
                let drop = to_drop > 0 && e.is_finished();
                if drop {
                    to_drop -= 1;
                }
                drop
            });
        *executions = kept;
        Ok(dropped)
    }
}

/// PostgreSQL implementation of ExecutionRepository
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn next_build_number(&self, pipeline_id: Uuid) -> RepoResult<u64> {
        // Single-statement upsert; concurrent callers serialize on the row lock
        let (number,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO build_counters (pipeline_id, last_number)
            VALUES ($1, 1)
            ON CONFLICT (pipeline_id)
            DO UPDATE SET last_number = build_counters.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(pipeline_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(number as u64)
    }

    async fn insert(&self, execution: &PipelineExecution) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                id, pipeline_id, build_number, status, repository, branch, author,
                started_at, finished_at, duration_ms, data
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.pipeline_id)
        .bind(execution.build_number as i64)
        .bind(execution.status.to_string())
        .bind(&execution.repository)
        .bind(&execution.branch)
        .bind(&execution.author)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(serde_json::to_value(execution)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, execution: &PipelineExecution) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE executions
            SET status = $1, finished_at = $2, duration_ms = $3, data = $4
            WHERE id = $5
            "#,
        )
        .bind(execution.status.to_string())
        .bind(execution.finished_at)
        .bind(execution.duration_ms.map(|d| d as i64))
        .bind(serde_json::to_value(execution)?)
        .bind(execution.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<PipelineExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT data FROM executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ExecutionRow::into_execution).transpose()
    }

    async fn list(&self, filter: &ExecutionFilter) -> RepoResult<ExecutionPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM executions WHERE TRUE");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT data FROM executions WHERE TRUE");
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY started_at DESC LIMIT ")
            .push_bind(filter.per_page() as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset() as i64);

        let rows: Vec<ExecutionRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(ExecutionRow::into_execution)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok(ExecutionPage {
            items,
            total: total as usize,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    async fn recent_success_durations(
        &self,
        pipeline_id: Uuid,
        limit: usize,
    ) -> RepoResult<Vec<u64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT duration_ms FROM executions
            WHERE pipeline_id = $1 AND status = 'success' AND duration_ms IS NOT NULL
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(pipeline_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(d,)| d as u64).collect())
    }

    async fn enforce_retention(&self, keep: usize) -> RepoResult<Vec<PipelineExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            DELETE FROM executions
            WHERE status <> 'running' AND id NOT IN (
                SELECT id FROM executions
                WHERE status <> 'running'
                ORDER BY started_at DESC
                LIMIT $1
            )
            RETURNING data
            "#,
        )
        .bind(keep as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExecutionRow::into_execution).collect()
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExecutionFilter) {
    if let Some(pipeline_id) = filter.pipeline_id {
        builder.push(" AND pipeline_id = ").push_bind(pipeline_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.to_string());
    }
    if let Some(branch) = &filter.branch {
        builder.push(" AND branch = ").push_bind(branch.clone());
    }
    if let Some(author) = &filter.author {
        builder.push(" AND author = ").push_bind(author.clone());
    }
    if let Some(repository) = &filter.repository {
        builder.push(" AND repository = ").push_bind(repository.clone());
    }
    if let Some(since) = filter.since {
        builder.push(" AND started_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND started_at <= ").push_bind(until);
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    data: serde_json::Value,
}

impl ExecutionRow {
    fn into_execution(self) -> RepoResult<PipelineExecution> {
        Ok(serde_json::from_value(self.data)?)
    }
}
