use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, Feed, StoreError};

const FEED_COLUMNS: &str = "id, name, url, user_id, last_fetched_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `user_id`. Feed URLs are unique.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        user_id: Uuid,
    ) -> Result<Feed, StoreError> {
        let now = now_millis();
        sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (id, name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(url)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert(e, "feed", url))
    }

    /// All feeds, ordered by name
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY name, url"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("feed", url))
    }

    // ========================================================================
    // Poll Rotation
    // ========================================================================

    /// The feed that has waited longest: never-fetched feeds first, then the
    /// oldest `last_fetched_at`, ties broken by id.
    ///
    /// Returns `None` when no feeds are registered.
    pub async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Stamp a feed as fetched now and return the updated row.
    ///
    /// The stamp is strictly greater than every other `last_fetched_at` in the
    /// table, so a feed marked in the same millisecond as another still sorts
    /// after it in the rotation.
    pub async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError> {
        let now = now_millis();
        sqlx::query_as::<_, Feed>(&format!(
            r#"
            UPDATE feeds
            SET last_fetched_at = MAX(?, COALESCE((SELECT MAX(last_fetched_at) FROM feeds), 0) + 1),
                updated_at = ?
            WHERE id = ?
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("feed", feed_id))
    }
}
