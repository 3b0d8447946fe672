//! Webhook API Handlers
//!
//! Source-control and registry notifications, plus the registry proxy.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use slipway_core::domain::webhook::{RegistryEvent, WebhookEvent, WebhookSource};

use crate::api::error::{ApiError, ApiResult};
use crate::service::webhook::{self, Normalized};
use crate::state::AppState;

/// Response of `POST /webhook/{source}`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WebhookResponse {
    Accepted { event: WebhookEvent },
    Ignored { reason: String },
}

/// POST /webhook/{source}
///
/// The signature is checked before anything is admitted; a mismatch is
/// rejected with 401 and nothing is recorded.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    let source: WebhookSource = source.parse().map_err(ApiError::NotFound)?;

    let signature_valid =
        webhook::verify_signature(source, state.config.webhook_secret(source), &headers, &body)?;

    match webhook::normalize(source, &headers, &body, signature_valid)? {
        Normalized::Ignored(reason) => {
            tracing::debug!("Ignoring {} delivery: {}", source, reason);
            Ok((StatusCode::OK, Json(WebhookResponse::Ignored { reason })))
        }
        Normalized::Event(mut event) => {
            tracing::info!(
                "Received {} {} for {}@{}",
                source, event.event_type, event.repository, event.branch
            );
            state.router.route(&mut event).await;
            state.event_log.record_webhook(event.clone()).await;
            Ok((StatusCode::ACCEPTED, Json(WebhookResponse::Accepted { event })))
        }
    }
}

/// GET /webhook/events
/// Recent webhook deliveries, newest first
pub async fn list_webhook_events(State(state): State<AppState>) -> Json<Vec<WebhookEvent>> {
    Json(state.event_log.list_webhooks().await)
}

/// POST /webhook/registry
/// Registry notification envelope; each tagged push is matched against the
/// auto-deploy rules
pub async fn receive_registry(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Vec<RegistryEvent>>> {
    let pushes = webhook::parse_registry(&body)?;
    tracing::debug!("Registry notification with {} push(es)", pushes.len());

    let mut handled = Vec::with_capacity(pushes.len());
    for push in pushes {
        let event = state.autodeploy.handle(push).await;
        state.event_log.record_registry(event.clone()).await;
        handled.push(event);
    }
    Ok(Json(handled))
}

/// GET /registry/events
pub async fn list_registry_events(State(state): State<AppState>) -> Json<Vec<RegistryEvent>> {
    Json(state.event_log.list_registry().await)
}

/// GET /registry/catalog
pub async fn registry_catalog(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.registry.catalog().await?))
}

/// GET /registry/tags/{*repository}
pub async fn registry_tags(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.registry.tags(&repository).await?))
}
