//! Webhook and registry event endpoints

use crate::ControllerClient;
use crate::error::Result;
use slipway_core::domain::webhook::{RegistryEvent, WebhookEvent};

impl ControllerClient {
    /// Recent inbound source webhooks, newest first
    pub async fn webhook_events(&self) -> Result<Vec<WebhookEvent>> {
        let response = self.client.get(self.url("/webhook/events")).send().await?;
        self.handle_response(response).await
    }

    /// Recent registry pushes, newest first
    pub async fn registry_events(&self) -> Result<Vec<RegistryEvent>> {
        let response = self.client.get(self.url("/registry/events")).send().await?;
        self.handle_response(response).await
    }

    pub async fn registry_catalog(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.url("/registry/catalog")).send().await?;
        self.handle_response(response).await
    }

    /// Repository names may contain `/`, which is passed through unescaped
    pub async fn registry_tags(&self, repository: &str) -> Result<Vec<String>> {
        let path = format!("/registry/tags/{}", repository.trim_start_matches('/'));
        let response = self.client.get(self.url(&path)).send().await?;

        self.handle_response(response).await
    }
}
