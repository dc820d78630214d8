//! Postgres bookmark repository

use async_trait::async_trait;
use chrono::Utc;
use keel_core::domain::bookmark::{Bookmark, bookmark_name};
use sqlx::PgPool;
use uuid::Uuid;

use super::{BookmarkRepository, Result};

pub struct PgBookmarkRepository {
    pool: PgPool,
}

impl PgBookmarkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookmarkRepository for PgBookmarkRepository {
    async fn create(&self, user: i64, link: &str) -> Result<Bookmark> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO bookmarks (id, user_id, link, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(user)
        .bind(link)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(Bookmark {
            name: bookmark_name(user, &id.to_string()),
            link: link.to_string(),
        })
    }

    async fn list(&self, user: i64, offset: i64, limit: i64) -> Result<Vec<Bookmark>> {
        let rows = sqlx::query_as::<_, BookmarkRow>(
            r#"
            SELECT id, user_id, link
            FROM bookmarks
            WHERE user_id = $1
            ORDER BY created_at, id
            OFFSET $2
            LIMIT $3
            "#,
        )
        .bind(user)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn delete(&self, user: i64, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct BookmarkRow {
    id: Uuid,
    user_id: i64,
    link: String,
}

impl From<BookmarkRow> for Bookmark {
    fn from(row: BookmarkRow) -> Self {
        Bookmark {
            name: bookmark_name(row.user_id, &row.id.to_string()),
            link: row.link,
        }
    }
}
