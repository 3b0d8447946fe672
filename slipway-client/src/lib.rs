//! Slipway HTTP Client
//!
//! A typed HTTP client for the Slipway controller API, shared by the CLI and
//! any script that wants to drive builds or rollouts.
//!
//! # Example
//!
//! ```no_run
//! use slipway_client::ControllerClient;
//! use slipway_core::dto::pipeline::TriggerPipeline;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ControllerClient::new("http://localhost:8080");
//!
//!     let job = client
//!         .trigger_pipeline(Uuid::new_v4(), TriggerPipeline::default())
//!         .await?;
//!
//!     println!("Queued build job: {}", job.id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod deploy;
mod executions;
mod pipelines;
mod queue;
mod webhooks;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Slipway controller API
///
/// Methods are grouped by resource:
/// - Pipeline definitions and manual triggers
/// - Build queue inspection and control
/// - Execution history and logs
/// - Deployments, rollbacks and auto-deploy rules
/// - Webhook and registry event logs
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    ///
    /// # Example
    /// ```
    /// use slipway_client::ControllerClient;
    ///
    /// let client = ControllerClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client around a configured reqwest Client (timeouts, TLS, proxies)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Liveness probe; `Ok` once the controller answers 200
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Checks the status code and deserializes the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Controller returned {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// For endpoints that answer without a body (e.g. DELETE)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ControllerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControllerClient::new("http://localhost:8080/");
        assert_eq!(client.url("/queue/status"), "http://localhost:8080/queue/status");
    }

    #[tokio::test]
    async fn test_unreachable_controller_is_a_request_error() {
        let client = ControllerClient::new("http://127.0.0.1:1");
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ClientError::RequestFailed(_)));
        assert_eq!(err.status(), None);
    }
}
