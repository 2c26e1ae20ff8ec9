use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, FeedFollow, StoreError};

const FOLLOW_SELECT: &str = r#"
    SELECT ff.id, ff.user_id, ff.feed_id, u.name AS user_name,
           f.name AS feed_name, f.url AS feed_url, ff.created_at
    FROM feed_follows ff
    JOIN users u ON u.id = ff.user_id
    JOIN feeds f ON f.id = ff.feed_id
"#;

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Follow a feed, returning the follow joined with user and feed names.
    pub async fn create_feed_follow(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
    ) -> Result<FeedFollow, StoreError> {
        let id = Uuid::new_v4();
        let now = now_millis();
        sqlx::query(
            r#"
            INSERT INTO feed_follows (id, user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert(e, "follow", &feed_id.to_string()))?;

        sqlx::query_as::<_, FeedFollow>(&format!("{FOLLOW_SELECT} WHERE ff.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("follow", id))
    }

    /// Feeds followed by a user, ordered by feed name
    pub async fn get_feed_follows_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<FeedFollow>, StoreError> {
        let follows = sqlx::query_as::<_, FeedFollow>(&format!(
            "{FOLLOW_SELECT} WHERE ff.user_id = ? ORDER BY f.name, f.url"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(follows)
    }

    /// Remove a user's follow of the feed at `url`.
    pub async fn delete_feed_follow(&self, user_id: Uuid, url: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM feed_follows
            WHERE user_id = ? AND feed_id = (SELECT id FROM feeds WHERE url = ?)
        "#,
        )
        .bind(user_id)
        .bind(url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("follow", url));
        }
        Ok(())
    }
}
