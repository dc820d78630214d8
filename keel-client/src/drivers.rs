//! Driver endpoints

use keel_core::dto::driver::EngineCapabilities;

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    /// Capability matrix of every engine the orchestrator can reach
    pub async fn driver_capabilities(&self) -> Result<Vec<EngineCapabilities>> {
        let response = self
            .client
            .get(self.url("/driver/capabilities"))
            .send()
            .await?;

        self.handle_response(response).await
    }
}
