//! Pipeline Repository
//!
//! Stores pipeline definitions. The PostgreSQL variant keeps the full
//! definition as JSONB next to the columns used for lookups.

use async_trait::async_trait;
use slipway_core::domain::pipeline::Pipeline;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::RepoResult;

/// Repository trait for pipeline definitions
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn create(&self, pipeline: &Pipeline) -> RepoResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Pipeline>>;

    /// All pipelines, oldest first
    async fn list_all(&self) -> RepoResult<Vec<Pipeline>>;

    /// Returns false when the pipeline does not exist
    async fn update(&self, pipeline: &Pipeline) -> RepoResult<bool>;

    /// Returns false when the pipeline does not exist
    async fn delete(&self, id: Uuid) -> RepoResult<bool>;
}

/// In-memory implementation of PipelineRepository
#[derive(Default)]
pub struct InMemoryPipelineRepository {
    pipelines: RwLock<HashMap<Uuid, Pipeline>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> RepoResult<()> {
        self.pipelines
            .write()
            .await
            .insert(pipeline.id, pipeline.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Pipeline>> {
        Ok(self.pipelines.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> RepoResult<Vec<Pipeline>> {
        let mut pipelines: Vec<Pipeline> = self.pipelines.read().await.values().cloned().collect();
        pipelines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pipelines)
    }

    async fn update(&self, pipeline: &Pipeline) -> RepoResult<bool> {
        let mut pipelines = self.pipelines.write().await;
        match pipelines.get_mut(&pipeline.id) {
            Some(existing) => {
                *existing = pipeline.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        Ok(self.pipelines.write().await.remove(&id).is_some())
    }
}

/// PostgreSQL implementation of PipelineRepository
pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO pipelines (id, name, repository, enabled, created_at, updated_at, definition)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pipeline.id)
        .bind(&pipeline.name)
        .bind(&pipeline.repository)
        .bind(pipeline.enabled)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .bind(serde_json::to_value(pipeline)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<Pipeline>> {
        let row = sqlx::query_as::<_, PipelineRow>("SELECT definition FROM pipelines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PipelineRow::into_pipeline).transpose()
    }

    async fn list_all(&self) -> RepoResult<Vec<Pipeline>> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            "SELECT definition FROM pipelines ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PipelineRow::into_pipeline).collect()
    }

    async fn update(&self, pipeline: &Pipeline) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET name = $1, repository = $2, enabled = $3, updated_at = $4, definition = $5
            WHERE id = $6
            "#,
        )
        .bind(&pipeline.name)
        .bind(&pipeline.repository)
        .bind(pipeline.enabled)
        .bind(pipeline.updated_at)
        .bind(serde_json::to_value(pipeline)?)
        .bind(pipeline.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    definition: serde_json::Value,
}

impl PipelineRow {
    fn into_pipeline(self) -> RepoResult<Pipeline> {
        Ok(serde_json::from_value(self.definition)?)
    }
}
