//! API Module
//!
//! HTTP API layer for the controller.
//! Each submodule handles endpoints for a specific domain.

pub mod deploy;
pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;
pub mod queue;
pub mod rule;
pub mod stream;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route(
            "/pipelines",
            get(pipeline::list_pipelines).post(pipeline::create_pipeline),
        )
        .route(
            "/pipelines/{id}",
            get(pipeline::get_pipeline)
                .put(pipeline::update_pipeline)
                .delete(pipeline::delete_pipeline),
        )
        .route("/pipelines/{id}/trigger", post(pipeline::trigger_pipeline))
        // Queue endpoints
        .route("/queue", get(queue::list_jobs).post(queue::enqueue_job))
        .route("/queue/status", get(queue::status))
        .route("/queue/pause", post(queue::pause))
        .route("/queue/resume", post(queue::resume))
        .route("/queue/{id}", get(queue::get_job))
        .route("/queue/{id}/cancel", post(queue::cancel_job))
        // Execution endpoints
        .route("/executions", get(execution::list_executions))
        .route("/executions/{id}", get(execution::get_execution))
        .route("/executions/{id}/logs", get(execution::get_execution_logs))
        .route("/executions/{id}/retry", post(execution::retry_execution))
        .route("/executions/{id}/stream", get(stream::stream_execution))
        // Webhook and registry endpoints
        .route("/webhook/registry", post(webhook::receive_registry))
        .route("/webhook/events", get(webhook::list_webhook_events))
        .route("/webhook/{source}", post(webhook::receive_webhook))
        .route("/registry/events", get(webhook::list_registry_events))
        .route("/registry/catalog", get(webhook::registry_catalog))
        .route("/registry/tags/{*repository}", get(webhook::registry_tags))
        // Auto-deploy rules
        .route("/rules", get(rule::list_rules).post(rule::create_rule))
        .route("/rules/{id}", put(rule::update_rule).delete(rule::delete_rule))
        // Deploy endpoints
        .route("/deploy", post(deploy::deploy))
        .route("/rollback", post(deploy::rollback))
        .route(
            "/deployments/{namespace}/{workload}/history",
            get(deploy::history),
        )
        .route(
            "/deployments/{namespace}/{workload}/health-check",
            get(deploy::active_health_check),
        )
        .route("/health-checks", get(deploy::health_checks))
        // Cluster-wide stream
        .route("/stream", get(stream::stream_cluster))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
