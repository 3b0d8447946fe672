//! Deploy API Handlers
//!
//! Manual deploys and rollbacks, rollout history and health checks.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use slipway_core::domain::rollout::{
    DeployTrigger, DeploymentVersion, HealthCheckStatus, WorkloadRef,
};
use slipway_core::dto::deploy::{DeployRequest, RollbackRequest};

use crate::api::error::{ApiError, ApiResult};
use crate::service::rollout::DeploySpec;
use crate::state::AppState;

/// POST /deploy
/// Set a workload's image and start supervising the rollout
pub async fn deploy(
    State(state): State<AppState>,
    Json(req): Json<DeployRequest>,
) -> ApiResult<(StatusCode, Json<HealthCheckStatus>)> {
    for (field, value) in [
        ("workload", &req.workload),
        ("namespace", &req.namespace),
        ("image", &req.image),
    ] {
        if value.trim().is_empty() {
            return Err(ApiError::BadRequest(format!("{} cannot be empty", field)));
        }
    }

    tracing::info!("Manual deploy of {} to {}/{}", req.image, req.namespace, req.workload);

    let check = state
        .rollout
        .deploy(DeploySpec {
            workload: WorkloadRef::new(req.namespace, req.workload),
            image: req.image,
            container: req.container,
            auto_rollback: req.auto_rollback,
            trigger: DeployTrigger::Manual,
            digest: None,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(check)))
}

/// POST /rollback
/// Roll back to a recorded version, an explicit image, or the image that
/// preceded the latest deploy
pub async fn rollback(
    State(state): State<AppState>,
    Json(req): Json<RollbackRequest>,
) -> ApiResult<(StatusCode, Json<HealthCheckStatus>)> {
    let check = state.rollout.rollback(req).await?;
    Ok((StatusCode::ACCEPTED, Json(check)))
}

/// GET /deployments/{namespace}/{workload}/history
pub async fn history(
    State(state): State<AppState>,
    Path((namespace, workload)): Path<(String, String)>,
) -> Json<Vec<DeploymentVersion>> {
    let workload = WorkloadRef::new(namespace, workload);
    Json(state.rollout.history(&workload).await)
}

/// GET /deployments/{namespace}/{workload}/health-check
/// The rollout currently being supervised for a workload
pub async fn active_health_check(
    State(state): State<AppState>,
    Path((namespace, workload)): Path<(String, String)>,
) -> ApiResult<Json<HealthCheckStatus>> {
    let workload = WorkloadRef::new(namespace, workload);
    state
        .rollout
        .active_check(&workload)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no rollout in progress for {}", workload)))
}

/// GET /health-checks
pub async fn health_checks(State(state): State<AppState>) -> Json<Vec<HealthCheckStatus>> {
    Json(state.rollout.health_checks().await)
}
