//! Bookmark domain types
//!
//! Bookmarks are user-scoped links to resources. They are served next to the
//! pipeline API but play no part in orchestration.

use serde::{Deserialize, Serialize};

/// A saved resource link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Format: `users/{user}/bookmarks/{bookmark}`
    pub name: String,
    /// Resource link, e.g. `/issue/add-email-column-101`
    pub link: String,
}

/// Builds the parent resource name for a user
pub fn user_parent(user: i64) -> String {
    format!("users/{}", user)
}

/// Builds the full resource name of a bookmark
pub fn bookmark_name(user: i64, bookmark: &str) -> String {
    format!("users/{}/bookmarks/{}", user, bookmark)
}
