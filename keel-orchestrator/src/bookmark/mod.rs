//! Bookmarks
//!
//! User-scoped resource links with offset pagination. Served by the same
//! process as the pipeline API, with no coupling to orchestration.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use keel_core::domain::bookmark::{Bookmark, bookmark_name};
use keel_core::dto::bookmark::{CreateBookmark, ListBookmarks, ListBookmarksResponse};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryBookmarkRepository;
pub use postgres::PgBookmarkRepository;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("bookmark '{0}' not found")]
    NotFound(String),

    #[error("invalid page token '{0}'")]
    InvalidPageToken(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, BookmarkError>;

/// Bookmark persistence
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    async fn create(&self, user: i64, link: &str) -> Result<Bookmark>;

    /// Bookmarks of a user in creation order
    async fn list(&self, user: i64, offset: i64, limit: i64) -> Result<Vec<Bookmark>>;

    /// Returns false if the user has no such bookmark
    async fn delete(&self, user: i64, id: Uuid) -> Result<bool>;
}

pub async fn create_bookmark(
    repository: &dyn BookmarkRepository,
    user: i64,
    req: CreateBookmark,
) -> Result<Bookmark> {
    let link = req.link.trim();
    if link.is_empty() {
        return Err(BookmarkError::Validation("link must not be empty".to_string()));
    }

    let bookmark = repository.create(user, link).await?;
    tracing::info!("Bookmark created: {}", bookmark.name);
    Ok(bookmark)
}

pub async fn list_bookmarks(
    repository: &dyn BookmarkRepository,
    user: i64,
    req: ListBookmarks,
) -> Result<ListBookmarksResponse> {
    let limit = page_size(req.page_size);
    let offset = page_offset(req.page_token.as_deref())?;

    // One extra row tells whether another page exists
    let mut bookmarks = repository.list(user, offset, limit + 1).await?;
    let next_page_token = if bookmarks.len() as i64 > limit {
        bookmarks.truncate(limit as usize);
        (offset + limit).to_string()
    } else {
        String::new()
    };

    tracing::debug!(
        "Listed {} bookmark(s) for user {} at offset {}",
        bookmarks.len(),
        user,
        offset
    );

    Ok(ListBookmarksResponse {
        bookmarks,
        next_page_token,
    })
}

pub async fn delete_bookmark(
    repository: &dyn BookmarkRepository,
    user: i64,
    bookmark: &str,
) -> Result<()> {
    let name = bookmark_name(user, bookmark);
    let id = Uuid::parse_str(bookmark).map_err(|_| BookmarkError::NotFound(name.clone()))?;

    if !repository.delete(user, id).await? {
        return Err(BookmarkError::NotFound(name));
    }

    tracing::info!("Bookmark deleted: {}", name);
    Ok(())
}

/// Unset or non-positive sizes use the default; large ones are capped
fn page_size(requested: Option<i32>) -> i64 {
    match requested {
        Some(size) if size > 0 => i64::from(size).min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

fn page_offset(token: Option<&str>) -> Result<i64> {
    match token {
        None | Some("") => Ok(0),
        Some(token) => token
            .parse::<i64>()
            .ok()
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| BookmarkError::InvalidPageToken(token.to_string())),
    }
}
