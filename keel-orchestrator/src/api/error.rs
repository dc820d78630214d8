//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::bookmark::BookmarkError;
use crate::engine::OrchestratorError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    DatabaseError(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Validation(msg) => ApiError::BadRequest(msg),
            OrchestratorError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            OrchestratorError::Store(err) => ApiError::DatabaseError(err.to_string()),
        }
    }
}

impl From<BookmarkError> for ApiError {
    fn from(err: BookmarkError) -> Self {
        match err {
            BookmarkError::NotFound(name) => {
                ApiError::NotFound(format!("Bookmark {} not found", name))
            }
            BookmarkError::InvalidPageToken(_) | BookmarkError::Validation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            BookmarkError::Database(err) => ApiError::DatabaseError(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    fn status(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_orchestrator_error_status() {
        assert_eq!(
            status(OrchestratorError::Validation("empty".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(OrchestratorError::NotFound(3)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(OrchestratorError::Store(StoreError::Corrupt("bad".to_string()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_bookmark_error_status() {
        assert_eq!(
            status(BookmarkError::InvalidPageToken("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(BookmarkError::NotFound("users/1/bookmarks/x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(BookmarkError::Database(sqlx::Error::PoolClosed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
