//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod bookmark;
pub mod driver;
pub mod error;
pub mod health;
pub mod pipeline;

use axum::{
    Router,
    routing::{delete, get, post},
};
use keel_driver::DriverRegistry;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bookmark::BookmarkRepository;
use crate::engine::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub bookmarks: Arc<dyn BookmarkRepository>,
    pub registry: Arc<DriverRegistry>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/{id}", get(pipeline::get_pipeline))
        .route("/pipeline/{id}/advance", post(pipeline::advance_pipeline))
        .route("/pipeline/{id}/cancel", post(pipeline::cancel_pipeline))
        // Driver endpoints
        .route("/driver/capabilities", get(driver::list_capabilities))
        // Bookmark endpoints
        .route("/users/{user}/bookmarks", post(bookmark::create_bookmark))
        .route("/users/{user}/bookmarks", get(bookmark::list_bookmarks))
        .route(
            "/users/{user}/bookmarks/{bookmark}",
            delete(bookmark::delete_bookmark),
        )
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bookmark::MemoryBookmarkRepository;
    use crate::engine::TaskExecutor;
    use crate::engine::executor::tests::{FakeDriver, fast_retry, registry};
    use crate::store::MemoryPipelineStore;
    use std::time::Duration;

    /// State backed by in-memory stores and the fake driver
    pub fn state() -> AppState {
        let registry = registry(Arc::new(FakeDriver::default()));
        let executor = Arc::new(TaskExecutor::new(
            registry.clone(),
            Duration::from_secs(5),
            fast_retry(),
        ));
        AppState {
            orchestrator: Arc::new(Orchestrator::new(
                Arc::new(MemoryPipelineStore::new()),
                executor,
                4,
            )),
            bookmarks: Arc::new(MemoryBookmarkRepository::new()),
            registry,
        }
    }

    #[test]
    fn test_router_builds() {
        let _router: Router = create_router(state());
    }
}
