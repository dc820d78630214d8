//! Bookmark endpoints

use keel_core::domain::bookmark::Bookmark;
use keel_core::dto::bookmark::{CreateBookmark, ListBookmarks, ListBookmarksResponse};

use crate::OrchestratorClient;
use crate::error::Result;

impl OrchestratorClient {
    pub async fn create_bookmark(&self, user: i64, link: impl Into<String>) -> Result<Bookmark> {
        let req = CreateBookmark { link: link.into() };
        let response = self
            .client
            .post(self.url(&format!("/users/{}/bookmarks", user)))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Fetch one page of a user's bookmarks
    pub async fn list_bookmarks(
        &self,
        user: i64,
        page: &ListBookmarks,
    ) -> Result<ListBookmarksResponse> {
        let response = self
            .client
            .get(self.url(&format!("/users/{}/bookmarks", user)))
            .query(page)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Delete a bookmark by its id, the last segment of its name
    pub async fn delete_bookmark(&self, user: i64, bookmark: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/users/{}/bookmarks/{}", user, bookmark)))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
