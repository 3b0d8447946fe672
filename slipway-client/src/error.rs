//! Error types for the Slipway client

use serde::Deserialize;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the controller
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Controller answered with an error status
    #[error("API error (status {status}): {message}")]
    ApiError {
        status: u16,
        /// Machine-readable error kind, when the body carried one
        kind: Option<String>,
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Error body the controller sends with every non-2xx response
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    kind: Option<String>,
}

impl ClientError {
    /// Builds an API error from a status code and the raw response body
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => Self::ApiError {
                status,
                kind: parsed.kind,
                message: parsed.error,
            },
            Err(_) => Self::ApiError {
                status,
                kind: None,
                message: body,
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// The build queue rejected a job because it is at capacity
    pub fn is_queue_full(&self) -> bool {
        self.status() == Some(429)
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(status) if status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_parses_controller_body() {
        let err = ClientError::api_error(429, r#"{"error":"queue is full (2 jobs queued)","kind":"queue_full"}"#);
        match &err {
            ClientError::ApiError { kind, message, .. } => {
                assert_eq!(kind.as_deref(), Some("queue_full"));
                assert_eq!(message, "queue is full (2 jobs queued)");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_queue_full());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_api_error_keeps_plain_body() {
        let err = ClientError::api_error(502, "upstream exploded");
        assert_eq!(err.to_string(), "API error (status 502): upstream exploded");
        assert!(err.is_server_error());
        assert!(!err.is_not_found());
    }
}
