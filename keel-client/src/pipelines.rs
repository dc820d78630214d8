//! Pipeline endpoints

use keel_core::domain::pipeline::{Pipeline, PipelineFind};
use keel_core::dto::pipeline::PipelineCreate;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Create a new pipeline
    pub async fn create_pipeline(&self, req: &PipelineCreate) -> Result<Pipeline> {
        let response = self
            .client
            .post(self.url("/pipeline/create"))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List pipelines matching the filter
    pub async fn list_pipelines(&self, find: &PipelineFind) -> Result<Vec<Pipeline>> {
        let response = self
            .client
            .get(self.url("/pipeline/list"))
            .query(find)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn get_pipeline(&self, id: i64) -> Result<Pipeline> {
        let response = self
            .client
            .get(self.url(&format!("/pipeline/{}", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Run the next stage of a pipeline and return its new state
    pub async fn advance_pipeline(&self, id: i64) -> Result<Pipeline> {
        tracing::debug!("Advancing pipeline {}", id);
        let response = self
            .client
            .post(self.url(&format!("/pipeline/{}/advance", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a pipeline; returns once in-flight work has stopped
    pub async fn cancel_pipeline(&self, id: i64) -> Result<Pipeline> {
        tracing::debug!("Canceling pipeline {}", id);
        let response = self
            .client
            .post(self.url(&format!("/pipeline/{}/cancel", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
