//! Webhook Event Log
//!
//! Bounded record of recent inbound webhook and registry notifications.

use slipway_core::domain::webhook::{RegistryEvent, WebhookEvent};
use std::collections::VecDeque;
use tokio::sync::RwLock;

const MAX_EVENTS: usize = 200;

#[derive(Default)]
pub struct WebhookEventLog {
    webhooks: RwLock<VecDeque<WebhookEvent>>,
    registry: RwLock<VecDeque<RegistryEvent>>,
}

impl WebhookEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_webhook(&self, event: WebhookEvent) {
        let mut webhooks = self.webhooks.write().await;
        if webhooks.len() == MAX_EVENTS {
            webhooks.pop_front();
        }
        webhooks.push_back(event);
    }

    /// Newest first
    pub async fn list_webhooks(&self) -> Vec<WebhookEvent> {
        self.webhooks.read().await.iter().rev().cloned().collect()
    }

    pub async fn record_registry(&self, event: RegistryEvent) {
        let mut registry = self.registry.write().await;
        if registry.len() == MAX_EVENTS {
            registry.pop_front();
        }
        registry.push_back(event);
    }

    /// Newest first
    pub async fn list_registry(&self) -> Vec<RegistryEvent> {
        self.registry.read().await.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn registry_event(tag: &str) -> RegistryEvent {
        RegistryEvent {
            id: Uuid::new_v4(),
            repository: "acme/api".to_string(),
            tag: tag.to_string(),
            digest: None,
            processed: false,
            auto_deploy: false,
            rule_id: None,
            health_check_id: None,
            error: None,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_oldest_events_are_evicted() {
        let log = WebhookEventLog::new();
        for i in 0..(MAX_EVENTS + 3) {
            log.record_registry(registry_event(&format!("v{i}"))).await;
        }

        let events = log.list_registry().await;
        assert_eq!(events.len(), MAX_EVENTS);
        assert_eq!(events[0].tag, format!("v{}", MAX_EVENTS + 2));
        assert_eq!(events[MAX_EVENTS - 1].tag, "v3");
    }
}
