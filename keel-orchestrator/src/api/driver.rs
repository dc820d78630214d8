//! Driver API Handlers

use axum::{Json, extract::State};
use keel_core::dto::driver::EngineCapabilities;

use crate::api::AppState;

/// GET /driver/capabilities
/// Capability matrix of every registered engine
pub async fn list_capabilities(State(state): State<AppState>) -> Json<Vec<EngineCapabilities>> {
    tracing::debug!("Listing driver capabilities");
    Json(state.registry.capability_matrix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::state;
    use keel_core::domain::engine::{Capability, Engine};

    #[tokio::test]
    async fn test_capability_matrix() {
        let Json(matrix) = list_capabilities(State(state())).await;

        let postgres = matrix.iter().find(|e| e.engine == Engine::Postgres).unwrap();
        assert!(postgres.capabilities.contains(Capability::CreateRole));

        let clickhouse = matrix.iter().find(|e| e.engine == Engine::ClickHouse).unwrap();
        assert!(clickhouse.capabilities.contains(Capability::ExecuteMigration));
        assert!(!clickhouse.capabilities.contains(Capability::CreateRole));
    }
}
