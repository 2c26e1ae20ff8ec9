use uuid::Uuid;

use super::schema::Database;
use super::types::{is_unique_violation, now_millis, NewPost, Post, PostSummary, StoreError};

/// Hard cap on the browse listing, regardless of the requested limit
const MAX_BROWSE_LIMIT: i64 = 500;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateUrl`] when a post with the same URL is
    /// already stored, in any feed. Callers treat this as a skip.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let now = now_millis();
        sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (id, title, url, description, published_at, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, url, description, published_at, feed_id, created_at, updated_at
        "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at.map(|dt| dt.timestamp_millis()))
        .bind(post.feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateUrl(post.url.clone())
            } else {
                StoreError::from_sqlx(e)
            }
        })
    }

    /// Posts stored for one feed, newest first
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, title, url, description, published_at, feed_id, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC NULLS LAST, created_at DESC
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    /// Latest posts from the feeds a user follows.
    ///
    /// Undated posts sort after dated ones. `limit` is clamped to 1..=500.
    pub async fn get_posts_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PostSummary>, StoreError> {
        let limit = limit.clamp(1, MAX_BROWSE_LIMIT);
        let posts = sqlx::query_as::<_, PostSummary>(
            r#"
            SELECT p.id, p.title, p.url, p.description, p.published_at, f.name AS feed_name
            FROM posts p
            JOIN feeds f ON f.id = p.feed_id
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.created_at DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }
}
