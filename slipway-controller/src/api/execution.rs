//! Execution API Handlers
//!
//! HTTP endpoints for execution history, stage logs and retries.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use slipway_core::domain::execution::PipelineExecution;
use slipway_core::domain::job::BuildJob;
use slipway_core::dto::execution::{ExecutionFilter, ExecutionLogs, ExecutionPage, StageLogs};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /executions
///
/// Query parameters (all optional):
/// - `pipeline_id`, `status`, `branch`, `author`, `repository`
/// - `since`, `until` (RFC 3339)
/// - `page` (1-based), `per_page`
pub async fn list_executions(
    State(state): State<AppState>,
    Query(filter): Query<ExecutionFilter>,
) -> ApiResult<Json<ExecutionPage>> {
    tracing::debug!("Listing executions: {:?}", filter);

    Ok(Json(state.executions.list(&filter).await?))
}

/// GET /executions/{id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineExecution>> {
    Ok(Json(find(&state, id).await?))
}

/// GET /executions/{id}/logs
/// Full logs of every recorded stage
pub async fn get_execution_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ExecutionLogs>> {
    let execution = find(&state, id).await?;

    let mut stages = Vec::with_capacity(execution.stages.len());
    for stage in &execution.stages {
        stages.push(StageLogs {
            stage: stage.name.clone(),
            log_id: stage.log_id,
            entries: state.logs.read_all(stage.log_id).await,
        });
    }

    Ok(Json(ExecutionLogs {
        execution_id: id,
        stages,
    }))
}

/// POST /executions/{id}/retry
/// Queue a new job repeating the execution
pub async fn retry_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<BuildJob>)> {
    tracing::info!("Retrying execution: {}", id);

    let job = state.queue.retry(id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub(crate) async fn find(state: &AppState, id: Uuid) -> ApiResult<PipelineExecution> {
    state
        .executions
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Execution {} not found", id)))
}
