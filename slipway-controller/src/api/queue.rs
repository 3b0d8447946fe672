//! Queue API Handlers
//!
//! HTTP endpoints for the build queue.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use slipway_core::domain::job::{BuildJob, TriggerType};
use slipway_core::dto::job::{EnqueueJob, QueueStatus};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::queue::NewJob;
use crate::state::AppState;

/// GET /queue
/// All jobs, queued ones first in dispatch order
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<BuildJob>>> {
    tracing::debug!("Listing queue");

    Ok(Json(state.queue.list().await?))
}

/// POST /queue
/// Admit a job; rejected with 429 when the queue is full
pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(req): Json<EnqueueJob>,
) -> ApiResult<(StatusCode, Json<BuildJob>)> {
    tracing::info!("Enqueueing job for pipeline: {}", req.pipeline_id);

    let job = state
        .queue
        .enqueue(NewJob {
            branch: req.branch,
            commit_sha: req.commit_sha,
            author: req.author,
            priority: req.priority,
            variables: req.variables,
            ..NewJob::new(req.pipeline_id, TriggerType::Api)
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /queue/{id}
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<BuildJob>> {
    tracing::debug!("Getting job: {}", id);

    Ok(Json(state.queue.get(id).await?))
}

/// POST /queue/{id}/cancel
/// Only queued jobs can be cancelled
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BuildJob>> {
    tracing::info!("Cancelling job: {}", id);

    Ok(Json(state.queue.cancel(id).await?))
}

/// POST /queue/pause
pub async fn pause(State(state): State<AppState>) -> ApiResult<Json<QueueStatus>> {
    state.queue.pause();
    Ok(Json(state.queue.status().await?))
}

/// POST /queue/resume
pub async fn resume(State(state): State<AppState>) -> ApiResult<Json<QueueStatus>> {
    state.queue.resume();
    Ok(Json(state.queue.status().await?))
}

/// GET /queue/status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<QueueStatus>> {
    Ok(Json(state.queue.status().await?))
}
