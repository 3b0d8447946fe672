//! Auto-Deploy Rule API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use slipway_core::domain::rollout::AutoDeployRule;
use slipway_core::dto::rule::RuleSpec;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// GET /rules
pub async fn list_rules(State(state): State<AppState>) -> Json<Vec<AutoDeployRule>> {
    Json(state.autodeploy.list_rules().await)
}

/// POST /rules
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<RuleSpec>,
) -> ApiResult<(StatusCode, Json<AutoDeployRule>)> {
    let rule = state.autodeploy.create_rule(req).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// PUT /rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RuleSpec>,
) -> ApiResult<Json<AutoDeployRule>> {
    Ok(Json(state.autodeploy.update_rule(id, req).await?))
}

/// DELETE /rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.autodeploy.delete_rule(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
