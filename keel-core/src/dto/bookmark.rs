//! Bookmark DTOs

use serde::{Deserialize, Serialize};

use crate::domain::bookmark::Bookmark;

/// Request to create a bookmark under a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookmark {
    pub link: String,
}

/// Pagination parameters for listing bookmarks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListBookmarks {
    /// At most 50 bookmarks are returned when unset; values above 1000 are coerced to 1000
    #[serde(default)]
    pub page_size: Option<i32>,
    /// Token from a previous `next_page_token`
    #[serde(default)]
    pub page_token: Option<String>,
}

/// A page of bookmarks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListBookmarksResponse {
    pub bookmarks: Vec<Bookmark>,
    /// Empty when there are no further pages
    pub next_page_token: String,
}
