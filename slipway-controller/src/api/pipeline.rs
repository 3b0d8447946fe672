//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management and manual triggers.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use slipway_core::domain::job::{BuildJob, TriggerType};
use slipway_core::domain::pipeline::Pipeline;
use slipway_core::dto::pipeline::{PipelineSpec, TriggerPipeline};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::pipeline_service;
use crate::service::queue::NewJob;
use crate::state::AppState;

/// POST /pipelines
/// Create a new pipeline
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<PipelineSpec>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = pipeline_service::create_pipeline(state.pipelines.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<Pipeline>>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = pipeline_service::list_pipelines(state.pipelines.as_ref()).await?;
    Ok(Json(pipelines))
}

/// GET /pipelines/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline(state.pipelines.as_ref(), id).await?;
    Ok(Json(pipeline))
}

/// PUT /pipelines/{id}
/// Replace a pipeline definition; bumps its version
pub async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PipelineSpec>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Updating pipeline: {}", id);

    let pipeline = pipeline_service::update_pipeline(state.pipelines.as_ref(), id, req).await?;
    Ok(Json(pipeline))
}

/// DELETE /pipelines/{id}
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    pipeline_service::delete_pipeline(state.pipelines.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pipelines/{id}/trigger
/// Queue a manual build of the pipeline
pub async fn trigger_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<BuildJob>)> {
    // An empty body triggers `main` at `HEAD`
    let req: TriggerPipeline = if body.is_empty() {
        TriggerPipeline::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };
    tracing::info!("Manual trigger of pipeline {}", id);

    let mut job = NewJob::new(id, TriggerType::Manual);
    job.branch = req.branch;
    job.commit_sha = req.commit_sha;
    job.author = req.author;
    job.variables = req.variables;
    if let Some(priority) = req.priority {
        job.priority = priority;
    }

    let job = state.queue.enqueue(job).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}
