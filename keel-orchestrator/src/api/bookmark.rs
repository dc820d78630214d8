//! Bookmark API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use keel_core::domain::bookmark::Bookmark;
use keel_core::dto::bookmark::{CreateBookmark, ListBookmarks, ListBookmarksResponse};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::bookmark;

/// POST /users/{user}/bookmarks
pub async fn create_bookmark(
    State(state): State<AppState>,
    Path(user): Path<i64>,
    Json(req): Json<CreateBookmark>,
) -> ApiResult<Json<Bookmark>> {
    tracing::info!("Creating bookmark for user {}: {}", user, req.link);

    let bookmark = bookmark::create_bookmark(state.bookmarks.as_ref(), user, req).await?;
    Ok(Json(bookmark))
}

/// GET /users/{user}/bookmarks?page_size=&page_token=
pub async fn list_bookmarks(
    State(state): State<AppState>,
    Path(user): Path<i64>,
    Query(req): Query<ListBookmarks>,
) -> ApiResult<Json<ListBookmarksResponse>> {
    tracing::debug!("Listing bookmarks for user {}", user);

    let page = bookmark::list_bookmarks(state.bookmarks.as_ref(), user, req).await?;
    Ok(Json(page))
}

/// DELETE /users/{user}/bookmarks/{bookmark}
pub async fn delete_bookmark(
    State(state): State<AppState>,
    Path((user, id)): Path<(i64, String)>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting bookmark {} of user {}", id, user);

    bookmark::delete_bookmark(state.bookmarks.as_ref(), user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
