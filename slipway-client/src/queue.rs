//! Build queue endpoints

use crate::ControllerClient;
use crate::error::Result;
use slipway_core::domain::job::BuildJob;
use slipway_core::dto::job::{EnqueueJob, QueueStatus};
use uuid::Uuid;

impl ControllerClient {
    // =============================================================================
    // Build Queue
    // =============================================================================

    /// Queued and running jobs plus finished ones still within retention
    pub async fn list_jobs(&self) -> Result<Vec<BuildJob>> {
        let response = self.client.get(self.url("/queue")).send().await?;
        self.handle_response(response).await
    }

    pub async fn enqueue_job(&self, req: &EnqueueJob) -> Result<BuildJob> {
        let response = self
            .client
            .post(self.url("/queue"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn get_job(&self, id: Uuid) -> Result<BuildJob> {
        let response = self
            .client
            .get(self.url(&format!("/queue/{}", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn cancel_job(&self, id: Uuid) -> Result<BuildJob> {
        let response = self
            .client
            .post(self.url(&format!("/queue/{}/cancel", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let response = self.client.get(self.url("/queue/status")).send().await?;
        self.handle_response(response).await
    }

    pub async fn pause_queue(&self) -> Result<QueueStatus> {
        let response = self.client.post(self.url("/queue/pause")).send().await?;
        self.handle_response(response).await
    }

    pub async fn resume_queue(&self) -> Result<QueueStatus> {
        let response = self.client.post(self.url("/queue/resume")).send().await?;
        self.handle_response(response).await
    }
}
