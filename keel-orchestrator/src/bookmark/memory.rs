//! In-memory bookmark repository

use async_trait::async_trait;
use keel_core::domain::bookmark::{Bookmark, bookmark_name};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookmarkRepository, Result};

struct Entry {
    id: Uuid,
    user: i64,
    link: String,
}

impl Entry {
    fn bookmark(&self) -> Bookmark {
        Bookmark {
            name: bookmark_name(self.user, &self.id.to_string()),
            link: self.link.clone(),
        }
    }
}

/// Keeps bookmarks in insertion order
#[derive(Default)]
pub struct MemoryBookmarkRepository {
    entries: RwLock<Vec<Entry>>,
}

impl MemoryBookmarkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookmarkRepository for MemoryBookmarkRepository {
    async fn create(&self, user: i64, link: &str) -> Result<Bookmark> {
        let entry = Entry {
            id: Uuid::new_v4(),
            user,
            link: link.to_string(),
        };
        let bookmark = entry.bookmark();
        self.entries.write().await.push(entry);
        Ok(bookmark)
    }

    async fn list(&self, user: i64, offset: i64, limit: i64) -> Result<Vec<Bookmark>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.user == user)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(Entry::bookmark)
            .collect())
    }

    async fn delete(&self, user: i64, id: Uuid) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(e.user == user && e.id == id));
        Ok(entries.len() < before)
    }
}
