//! API Error Handling
//!
//! Unified error type and conversions for API responses. Every error body
//! has the shape `{"error": "<message>", "kind": "<kind>"}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::cluster::ClusterError;
use crate::repository::RepositoryError;
use crate::service::autodeploy::RuleError;
use crate::service::pipeline::PipelineError;
use crate::service::queue::QueueError;
use crate::service::rollout::RolloutError;
use crate::service::webhook::WebhookError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    QueueFull(String),
    InternalError(String),
    /// A proxied call to a downstream service failed
    BadGateway(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::QueueFull(_) => (StatusCode::TOO_MANY_REQUESTS, "queue_full"),
            ApiError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "bad_gateway"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        let message = match self {
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!("Downstream call failed: {}", msg);
                msg
            }
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::QueueFull(msg) => msg,
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "kind": kind })),
        )
            .into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            RepositoryError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            RepositoryError::QueueFull { .. } => ApiError::QueueFull(err.to_string()),
            RepositoryError::Database(_)
            | RepositoryError::Serialization(_)
            | RepositoryError::Io(_) => ApiError::InternalError(err.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::Repository(e) => e.into(),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::PipelineNotFound(_)
            | QueueError::NotFound(_)
            | QueueError::ExecutionNotFound(_) => ApiError::NotFound(err.to_string()),
            QueueError::QueueFull(_) => ApiError::QueueFull(err.to_string()),
            QueueError::InvalidState(msg) => ApiError::Conflict(msg),
            QueueError::Repository(e) => e.into(),
        }
    }
}

impl From<RolloutError> for ApiError {
    fn from(err: RolloutError) -> Self {
        match err {
            RolloutError::NotFound(_) | RolloutError::Cluster(ClusterError::NotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            RolloutError::InvalidInput(msg) => ApiError::BadRequest(msg),
            RolloutError::Cluster(_) | RolloutError::TimedOut(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RuleError::Validation(msg) => ApiError::BadRequest(msg),
            RuleError::Repository(e) => e.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingSignature(_) | WebhookError::InvalidSignature => {
                ApiError::Unauthorized(err.to_string())
            }
            WebhookError::InvalidPayload(msg) => ApiError::BadRequest(msg),
        }
    }
}

/// Cluster and registry calls made on behalf of a client
impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NotFound(_) => ApiError::NotFound(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
