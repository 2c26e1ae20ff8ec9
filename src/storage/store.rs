//! The narrow persistence interface the aggregation core depends on.

use std::future::Future;

use uuid::Uuid;

use super::schema::Database;
use super::types::{Feed, NewPost, Post, StoreError, User};

/// Operations the poll loop and ingestor need from the store.
///
/// Implementations must enforce post-URL uniqueness and report a violation
/// as [`StoreError::DuplicateUrl`].
pub trait FeedStore: Send + Sync {
    /// Feed with the oldest (or null) `last_fetched_at`, ties broken by id.
    fn get_next_feed_to_fetch(
        &self,
    ) -> impl Future<Output = Result<Option<Feed>, StoreError>> + Send;

    /// Set `last_fetched_at` to now and return the updated feed.
    fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
    ) -> impl Future<Output = Result<Feed, StoreError>> + Send;

    fn create_post(&self, post: &NewPost)
        -> impl Future<Output = Result<Post, StoreError>> + Send;

    fn get_feeds(&self) -> impl Future<Output = Result<Vec<Feed>, StoreError>> + Send;

    fn get_users(&self) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;
}

impl FeedStore for Database {
    async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        Database::get_next_feed_to_fetch(self).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError> {
        Database::mark_feed_fetched(self, feed_id).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        Database::create_post(self, post).await
    }

    async fn get_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        Database::get_feeds(self).await
    }

    async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        Database::get_users(self).await
    }
}
