use uuid::Uuid;

use super::schema::Database;
use super::types::{now_millis, StoreError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user with a unique name.
    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let now = now_millis();
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::on_insert(e, "user", name))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user", name))
    }

    /// All users, ordered by name
    pub async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Delete every user. Feeds, follows and posts go with them via cascade.
    pub async fn delete_all_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
