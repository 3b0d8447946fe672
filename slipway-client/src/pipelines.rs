//! Pipeline endpoints

use crate::ControllerClient;
use crate::error::Result;
use slipway_core::domain::job::BuildJob;
use slipway_core::domain::pipeline::Pipeline;
use slipway_core::dto::pipeline::{PipelineSpec, TriggerPipeline};
use uuid::Uuid;

impl ControllerClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    pub async fn create_pipeline(&self, spec: &PipelineSpec) -> Result<Pipeline> {
        let response = self
            .client
            .post(self.url("/pipelines"))
            .json(spec)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let response = self.client.get(self.url("/pipelines")).send().await?;
        self.handle_response(response).await
    }

    pub async fn get_pipeline(&self, id: Uuid) -> Result<Pipeline> {
        let response = self
            .client
            .get(self.url(&format!("/pipelines/{}", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Replaces the definition; the controller bumps the pipeline version
    pub async fn update_pipeline(&self, id: Uuid, spec: &PipelineSpec) -> Result<Pipeline> {
        let response = self
            .client
            .put(self.url(&format!("/pipelines/{}", id)))
            .json(spec)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn delete_pipeline(&self, id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/pipelines/{}", id)))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    /// Queues a manual build and returns the admitted job
    pub async fn trigger_pipeline(&self, id: Uuid, req: TriggerPipeline) -> Result<BuildJob> {
        let response = self
            .client
            .post(self.url(&format!("/pipelines/{}/trigger", id)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
