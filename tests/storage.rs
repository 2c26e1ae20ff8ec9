//! Integration tests for the store: users, feeds, follows and posts composed
//! the way the commands use them.
//!
//! Each test creates its own in-memory SQLite database for isolation.

use chrono::{TimeZone, Utc};
use gator::storage::{Database, FeedStore, NewPost, StoreError};
use pretty_assertions::assert_eq;
use uuid::Uuid;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn post(feed_id: Uuid, url: &str, day: u32) -> NewPost {
    NewPost {
        id: Uuid::new_v4(),
        title: format!("Post {url}"),
        url: url.to_string(),
        description: None,
        published_at: Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
        feed_id,
    }
}

#[tokio::test]
async fn test_duplicate_user_and_feed_rejected() {
    let db = test_db().await;
    let user = db.create_user("kahya").await.unwrap();

    let err = db.create_user("kahya").await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { entity: "user", .. }));

    db.create_feed("Blog", "https://blog.example/rss", user.id)
        .await
        .unwrap();
    let err = db
        .create_feed("Same Blog", "https://blog.example/rss", user.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { entity: "feed", .. }));
}

#[tokio::test]
async fn test_follow_twice_rejected() {
    let db = test_db().await;
    let user = db.create_user("kahya").await.unwrap();
    let feed = db
        .create_feed("Blog", "https://blog.example/rss", user.id)
        .await
        .unwrap();

    db.create_feed_follow(user.id, feed.id).await.unwrap();
    let err = db.create_feed_follow(user.id, feed.id).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn test_browse_follows_subscriptions() {
    let db = test_db().await;
    let owner = db.create_user("owner").await.unwrap();
    let reader = db.create_user("reader").await.unwrap();
    let tech = db
        .create_feed("Tech", "https://tech.example/rss", owner.id)
        .await
        .unwrap();
    let food = db
        .create_feed("Food", "https://food.example/rss", owner.id)
        .await
        .unwrap();

    db.create_post(&post(tech.id, "https://tech.example/1", 1))
        .await
        .unwrap();
    db.create_post(&post(food.id, "https://food.example/1", 3))
        .await
        .unwrap();
    db.create_post(&post(tech.id, "https://tech.example/2", 2))
        .await
        .unwrap();

    assert!(db.get_posts_for_user(reader.id, 10).await.unwrap().is_empty());

    db.create_feed_follow(reader.id, tech.id).await.unwrap();
    db.create_feed_follow(reader.id, food.id).await.unwrap();
    let urls: Vec<String> = db
        .get_posts_for_user(reader.id, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.url)
        .collect();
    assert_eq!(urls, vec!["https://food.example/1", "https://tech.example/2"]);

    db.delete_feed_follow(reader.id, "https://food.example/rss")
        .await
        .unwrap();
    let remaining = db.get_posts_for_user(reader.id, 10).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|p| p.feed_name == "Tech"));
}

#[tokio::test]
async fn test_reset_cascades() {
    let db = test_db().await;
    let user = db.create_user("kahya").await.unwrap();
    let feed = db
        .create_feed("Blog", "https://blog.example/rss", user.id)
        .await
        .unwrap();
    db.create_feed_follow(user.id, feed.id).await.unwrap();
    db.create_post(&post(feed.id, "https://blog.example/1", 1))
        .await
        .unwrap();

    assert_eq!(db.delete_all_users().await.unwrap(), 1);

    assert!(db.get_users().await.unwrap().is_empty());
    assert!(db.get_feeds().await.unwrap().is_empty());
    assert!(db.get_posts_for_feed(feed.id).await.unwrap().is_empty());

    // The URL is free again once its post is gone
    let user = db.create_user("kahya").await.unwrap();
    let feed = db
        .create_feed("Blog", "https://blog.example/rss", user.id)
        .await
        .unwrap();
    db.create_post(&post(feed.id, "https://blog.example/1", 1))
        .await
        .unwrap();
}

/// Drives the store only through the trait the scheduler sees.
async fn next_and_mark<S: FeedStore>(store: &S) -> Option<Uuid> {
    let feed = store.get_next_feed_to_fetch().await.unwrap()?;
    store.mark_feed_fetched(feed.id).await.unwrap();
    Some(feed.id)
}

#[tokio::test]
async fn test_trait_rotation() {
    let db = test_db().await;
    assert_eq!(next_and_mark(&db).await, None);

    let user = db.create_user("kahya").await.unwrap();
    let a = db
        .create_feed("A", "https://a.example/rss", user.id)
        .await
        .unwrap();
    let b = db
        .create_feed("B", "https://b.example/rss", user.id)
        .await
        .unwrap();

    let first = next_and_mark(&db).await.unwrap();
    let second = next_and_mark(&db).await.unwrap();
    let third = next_and_mark(&db).await.unwrap();

    let mut pair = vec![first, second];
    pair.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(pair, expected);
    assert_eq!(third, first);
}

#[tokio::test]
async fn test_database_file_persists() {
    let dir = std::env::temp_dir().join(format!("gator_storage_test_{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("gator.db");
    let path_str = path.to_str().unwrap();

    {
        let db = Database::open(path_str).await.unwrap();
        db.create_user("kahya").await.unwrap();
    }

    let db = Database::open(path_str).await.unwrap();
    let users = db.get_users().await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].name, "kahya");

    std::fs::remove_dir_all(&dir).ok();
}
