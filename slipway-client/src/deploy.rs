//! Deployment, rollback and auto-deploy rule endpoints

use crate::ControllerClient;
use crate::error::Result;
use slipway_core::domain::rollout::{
    AutoDeployRule, DeploymentVersion, HealthCheckStatus, WorkloadRef,
};
use slipway_core::dto::deploy::{DeployRequest, RollbackRequest};
use slipway_core::dto::rule::RuleSpec;
use uuid::Uuid;

impl ControllerClient {
    // =============================================================================
    // Rollouts
    // =============================================================================

    /// Starts a rollout; the returned check is still in progress
    pub async fn deploy(&self, req: &DeployRequest) -> Result<HealthCheckStatus> {
        let response = self
            .client
            .post(self.url("/deploy"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn rollback(&self, req: &RollbackRequest) -> Result<HealthCheckStatus> {
        let response = self
            .client
            .post(self.url("/rollback"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Rollout history of one workload, newest first
    pub async fn deployment_history(&self, workload: &WorkloadRef) -> Result<Vec<DeploymentVersion>> {
        let path = format!(
            "/deployments/{}/{}/history",
            workload.namespace, workload.name
        );
        let response = self.client.get(self.url(&path)).send().await?;

        self.handle_response(response).await
    }

    /// The rollout still being supervised for a workload
    pub async fn active_health_check(&self, workload: &WorkloadRef) -> Result<HealthCheckStatus> {
        let path = format!(
            "/deployments/{}/{}/health-check",
            workload.namespace, workload.name
        );
        let response = self.client.get(self.url(&path)).send().await?;

        self.handle_response(response).await
    }

    pub async fn health_checks(&self) -> Result<Vec<HealthCheckStatus>> {
        let response = self.client.get(self.url("/health-checks")).send().await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Auto-Deploy Rules
    // =============================================================================

    pub async fn list_rules(&self) -> Result<Vec<AutoDeployRule>> {
        let response = self.client.get(self.url("/rules")).send().await?;
        self.handle_response(response).await
    }

    pub async fn create_rule(&self, spec: &RuleSpec) -> Result<AutoDeployRule> {
        let response = self
            .client
            .post(self.url("/rules"))
            .json(spec)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn update_rule(&self, id: Uuid, spec: &RuleSpec) -> Result<AutoDeployRule> {
        let response = self
            .client
            .put(self.url(&format!("/rules/{}", id)))
            .json(spec)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/rules/{}", id)))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
