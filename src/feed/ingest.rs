//! Turns parsed feed items into stored posts.
//!
//! Each item is handled independently: a duplicate URL is a skip, any other
//! store failure is recorded against that item, and the batch always runs to
//! the end of the document.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::parser::{FeedDocument, FeedItem};
use crate::storage::{FeedStore, NewPost};

/// Why an item was not inserted although nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A post with the same URL already exists
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Inserted,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub link: String,
    pub outcome: ItemOutcome,
}

/// Per-item outcomes of one ingest pass, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub results: Vec<ItemResult>,
}

impl IngestReport {
    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Inserted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Parse an item's publish date.
///
/// RFC 3339 is tried first, then RFC 2822 (the usual RSS `pubDate` form).
/// Anything else yields `None` and the post is stored undated.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Store every item of `document` as a post of `feed_id`.
///
/// Never fails as a whole; see [`IngestReport`] for what happened to each
/// item. Does not touch the feed's own state.
pub async fn ingest<S>(store: &S, feed_id: Uuid, document: &FeedDocument) -> IngestReport
where
    S: FeedStore + ?Sized,
{
    let mut report = IngestReport::default();

    for item in &document.items {
        let outcome = ingest_item(store, feed_id, item).await;
        match &outcome {
            ItemOutcome::Inserted => {
                tracing::debug!(post = %item.link, "Stored post");
            }
            ItemOutcome::Skipped(_) => {
                tracing::trace!(post = %item.link, "Post already stored");
            }
            ItemOutcome::Failed(reason) => {
                tracing::warn!(
                    feed_id = %feed_id,
                    post = %item.link,
                    error = %reason,
                    "Failed to store post"
                );
            }
        }
        report.results.push(ItemResult {
            link: item.link.clone(),
            outcome,
        });
    }

    report
}

async fn ingest_item<S>(store: &S, feed_id: Uuid, item: &FeedItem) -> ItemOutcome
where
    S: FeedStore + ?Sized,
{
    if item.link.is_empty() {
        return ItemOutcome::Failed("item has no link".to_string());
    }

    let post = NewPost {
        id: Uuid::new_v4(),
        title: item.title.clone(),
        url: item.link.clone(),
        description: (!item.description.is_empty()).then(|| item.description.clone()),
        published_at: parse_published(&item.pub_date),
        feed_id,
    };

    match store.create_post(&post).await {
        Ok(_) => ItemOutcome::Inserted,
        Err(e) if e.is_duplicate() => ItemOutcome::Skipped(SkipReason::Duplicate),
        Err(e) => ItemOutcome::Failed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Feed, Post, StoreError, User};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn item(link: &str, pub_date: &str) -> FeedItem {
        FeedItem {
            title: format!("Title for {link}"),
            link: link.to_string(),
            description: String::new(),
            pub_date: pub_date.to_string(),
        }
    }

    fn document(items: Vec<FeedItem>) -> FeedDocument {
        FeedDocument {
            title: "Channel".to_string(),
            description: String::new(),
            items,
        }
    }

    async fn setup() -> (Database, Feed) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("alice").await.unwrap();
        let feed = db
            .create_feed("Blog", "https://blog.example.com/rss", user.id)
            .await
            .unwrap();
        (db, feed)
    }

    #[test]
    fn test_parse_published_rfc3339() {
        assert_eq!(
            parse_published("2024-03-01T08:30:00Z"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_published("2024-03-01T10:30:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_published_rfc2822() {
        assert_eq!(
            parse_published("Fri, 01 Mar 2024 08:30:00 +0000"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
        assert_eq!(
            parse_published("Fri, 01 Mar 2024 08:30:00 GMT"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_published_garbage_is_none() {
        assert_eq!(parse_published(""), None);
        assert_eq!(parse_published("   "), None);
        assert_eq!(parse_published("yesterday"), None);
        assert_eq!(parse_published("2024-13-45"), None);
    }

    proptest! {
        #[test]
        fn prop_parse_published_never_panics(raw in "\\PC{0,64}") {
            let _ = parse_published(&raw);
        }
    }

    #[tokio::test]
    async fn test_ingest_inserts_in_document_order() {
        let (db, feed) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/1", "2024-01-01T00:00:00Z"),
            item("https://blog.example.com/2", "2024-01-02T00:00:00Z"),
        ]);

        let report = ingest(&db, feed.id, &doc).await;
        assert_eq!(report.inserted(), 2);
        assert_eq!(
            report.results.iter().map(|r| r.link.as_str()).collect::<Vec<_>>(),
            vec!["https://blog.example.com/1", "https://blog.example.com/2"]
        );
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_inserts_nothing() {
        let (db, feed) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/1", ""),
            item("https://blog.example.com/2", ""),
        ]);

        ingest(&db, feed.id, &doc).await;
        let second = ingest(&db, feed.id, &doc).await;

        assert_eq!(second.inserted(), 0);
        assert_eq!(second.skipped(), 2);
        assert_eq!(second.failed(), 0);
        assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_link_within_document_is_skipped() {
        let (db, feed) = setup().await;
        let doc = document(vec![
            item("https://blog.example.com/same", ""),
            item("https://blog.example.com/same", ""),
        ]);

        let report = ingest(&db, feed.id, &doc).await;
        assert_eq!(
            report.results[1].outcome,
            ItemOutcome::Skipped(SkipReason::Duplicate)
        );
        assert_eq!(report.inserted(), 1);
    }

    #[tokio::test]
    async fn test_malformed_date_stored_undated() {
        let (db, feed) = setup().await;
        let doc = document(vec![item("https://blog.example.com/1", "not a date")]);

        let report = ingest(&db, feed.id, &doc).await;
        assert_eq!(report.inserted(), 1);

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        assert_eq!(posts[0].published_at, None);
    }

    #[tokio::test]
    async fn test_empty_description_stored_as_null() {
        let (db, feed) = setup().await;
        let mut described = item("https://blog.example.com/described", "");
        described.description = "Body".to_string();
        let doc = document(vec![item("https://blog.example.com/bare", ""), described]);

        ingest(&db, feed.id, &doc).await;

        let posts = db.get_posts_for_feed(feed.id).await.unwrap();
        let bare = posts.iter().find(|p| p.url.ends_with("bare")).unwrap();
        let described = posts.iter().find(|p| p.url.ends_with("described")).unwrap();
        assert_eq!(bare.description, None);
        assert_eq!(described.description.as_deref(), Some("Body"));
    }

    #[tokio::test]
    async fn test_item_without_link_fails_alone() {
        let (db, feed) = setup().await;
        let doc = document(vec![
            item("", ""),
            item("https://blog.example.com/1", ""),
        ]);

        let report = ingest(&db, feed.id, &doc).await;
        assert_eq!(
            report.results[0].outcome,
            ItemOutcome::Failed("item has no link".to_string())
        );
        assert_eq!(report.inserted(), 1);
    }

    #[tokio::test]
    async fn test_feed_state_untouched() {
        let (db, feed) = setup().await;
        let doc = document(vec![item("https://blog.example.com/1", "")]);

        ingest(&db, feed.id, &doc).await;

        let after = db.get_feed_by_url(&feed.url).await.unwrap();
        assert_eq!(after.last_fetched_at, None);
    }

    /// Store whose post writes fail for URLs containing "bad" and report
    /// URLs containing "seen" as already stored.
    struct FlakyStore {
        inner: Database,
    }

    impl FeedStore for FlakyStore {
        async fn get_next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
            self.inner.get_next_feed_to_fetch().await
        }

        async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError> {
            self.inner.mark_feed_fetched(feed_id).await
        }

        async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
            if post.url.contains("bad") {
                return Err(StoreError::Other(sqlx::Error::PoolTimedOut));
            }
            if post.url.contains("seen") {
                return Err(StoreError::DuplicateUrl(post.url.clone()));
            }
            self.inner.create_post(post).await
        }

        async fn get_feeds(&self) -> Result<Vec<Feed>, StoreError> {
            self.inner.get_feeds().await
        }

        async fn get_users(&self) -> Result<Vec<User>, StoreError> {
            self.inner.get_users().await
        }
    }

    #[tokio::test]
    async fn test_write_failure_does_not_abort_batch() {
        let (db, feed) = setup().await;
        let store = FlakyStore { inner: db };
        let doc = document(vec![
            item("https://blog.example.com/1", ""),
            item("https://blog.example.com/bad", ""),
            item("https://blog.example.com/3", ""),
        ]);

        let report = ingest(&store, feed.id, &doc).await;
        assert_eq!(report.inserted(), 2);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.results[1].outcome, ItemOutcome::Failed(_)));
        assert_eq!(
            store.inner.get_posts_for_feed(feed.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_store_reported_duplicate_is_skipped_not_failed() {
        let (db, feed) = setup().await;
        let store = FlakyStore { inner: db };
        let doc = document(vec![
            item("https://blog.example.com/seen", ""),
            item("https://blog.example.com/2", ""),
        ]);

        let report = ingest(&store, feed.id, &doc).await;
        assert_eq!(
            report.results[0].outcome,
            ItemOutcome::Skipped(SkipReason::Duplicate)
        );
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.inserted(), 1);
    }
}
