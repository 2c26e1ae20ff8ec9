//! gator: a command-line RSS aggregator.
//!
//! Registered feeds are polled one at a time, stalest first, and their items
//! are stored as posts in SQLite. A post URL is stored at most once across
//! all feeds.

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
