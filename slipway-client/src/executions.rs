//! Execution history endpoints

use crate::ControllerClient;
use crate::error::Result;
use slipway_core::domain::execution::PipelineExecution;
use slipway_core::domain::job::BuildJob;
use slipway_core::dto::execution::{ExecutionFilter, ExecutionLogs, ExecutionPage};
use uuid::Uuid;

impl ControllerClient {
    // =============================================================================
    // Execution History
    // =============================================================================

    /// One page of executions, newest first
    pub async fn list_executions(&self, filter: &ExecutionFilter) -> Result<ExecutionPage> {
        let response = self
            .client
            .get(self.url("/executions"))
            .query(filter)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<PipelineExecution> {
        let response = self
            .client
            .get(self.url(&format!("/executions/{}", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn get_execution_logs(&self, id: Uuid) -> Result<ExecutionLogs> {
        let response = self
            .client
            .get(self.url(&format!("/executions/{}/logs", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Re-queues the execution's pipeline at the same commit
    pub async fn retry_execution(&self, id: Uuid) -> Result<BuildJob> {
        let response = self
            .client
            .post(self.url(&format!("/executions/{}/retry", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
