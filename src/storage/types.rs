use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// SQLite primary result codes that indicate another process holds the database.
const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;
const SQLITE_CANTOPEN: i64 = 14;

/// Store errors with user-friendly messages.
///
/// `DuplicateUrl` and `AlreadyExists` are classified from the driver's
/// structured unique-violation flag, never from the error text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process has the database locked
    #[error("Another gator process appears to be using the database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A post with this URL is already stored
    #[error("Post URL already stored: {0}")]
    DuplicateUrl(String),

    /// A unique key (user name, feed URL, follow pair) already exists
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// Lookup found no row
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Map connection-level sqlx errors, detecting lock contention by result code.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // Extended result codes carry the primary code in the low byte.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map(|code| code & 0xff);
            if matches!(primary, Some(SQLITE_BUSY | SQLITE_LOCKED | SQLITE_CANTOPEN)) {
                return StoreError::InstanceLocked;
            }
        }
        StoreError::Other(err)
    }

    /// Map an insert error, turning unique violations into `AlreadyExists`.
    pub(crate) fn on_insert(err: sqlx::Error, entity: &'static str, key: &str) -> Self {
        if is_unique_violation(&err) {
            return StoreError::AlreadyExists {
                entity,
                key: key.to_string(),
            };
        }
        StoreError::from_sqlx(err)
    }

    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True when the error is the expected duplicate-post signal.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateUrl(_))
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Current time in unix milliseconds, the storage timestamp unit.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A registered syndication source.
///
/// `last_fetched_at` is `None` until the scheduler first claims the feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Feed {
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.last_fetched_at.and_then(from_millis)
    }
}

/// A follow joined with the names it links, for display.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_id: Uuid,
    pub user_name: String,
    pub feed_name: String,
    pub feed_url: String,
    pub created_at: i64,
}

/// Insert parameters for a post. The id is generated by the caller.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub feed_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at.and_then(from_millis)
    }
}

/// Post row for the browse listing, carrying the source feed's name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub feed_name: String,
}

impl PostSummary {
    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published_at.and_then(from_millis)
    }
}
