//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management. Responses carry redacted
//! connection strings; credentials never leave the orchestrator.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use keel_core::domain::pipeline::{Pipeline, PipelineFind};
use keel_core::dto::pipeline::PipelineCreate;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /pipeline/create
/// Create a new pipeline
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<PipelineCreate>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = state.orchestrator.create(req).await?;
    Ok(Json(pipeline.redacted()))
}

/// GET /pipeline/list?id=&active=
/// List pipelines matching the filter
pub async fn list_pipelines(
    State(state): State<AppState>,
    Query(find): Query<PipelineFind>,
) -> ApiResult<Json<Vec<Pipeline>>> {
    tracing::debug!("Listing pipelines: {}", find);

    let pipelines = state.orchestrator.find(&find).await?;
    Ok(Json(pipelines.iter().map(Pipeline::redacted).collect()))
}

/// GET /pipeline/{id}
/// Get pipeline by ID
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = state.orchestrator.get(id).await?;
    Ok(Json(pipeline.redacted()))
}

/// POST /pipeline/{id}/advance
/// Run the next stage of a pipeline
pub async fn advance_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Advancing pipeline: {}", id);

    let pipeline = state.orchestrator.advance(id).await?;
    Ok(Json(pipeline.redacted()))
}

/// POST /pipeline/{id}/cancel
/// Cancel a pipeline, waiting for in-flight work to stop
pub async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Canceling pipeline: {}", id);

    let pipeline = state.orchestrator.cancel(id).await?;
    Ok(Json(pipeline.redacted()))
}
