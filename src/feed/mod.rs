//! Feed retrieval, decoding and storage.
//!
//! - [`fetcher`] - HTTP GET with timeout, size limit and shutdown
//! - [`parser`] - RSS 2.0 via a streaming reader, other formats via `feed-rs`
//! - [`ingest`] - items to posts, with duplicate URLs skipped
//!
//! The three stages are independent; the scheduler chains them.

mod fetcher;
mod ingest;
mod parser;

pub use fetcher::{
    build_client, fetch, CancelReason, FetchError, FetchOptions, DEFAULT_TIMEOUT,
    DEFAULT_USER_AGENT, MAX_FEED_SIZE,
};
pub use ingest::{ingest, parse_published, IngestReport, ItemOutcome, ItemResult, SkipReason};
pub use parser::{parse_feed, FeedDocument, FeedItem, ParseError};
