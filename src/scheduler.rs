//! The poll loop: pick the stalest feed, fetch it, parse it, store its posts.
//!
//! One cycle handles exactly one feed. Feeds are chosen by oldest
//! `last_fetched_at` (never-fetched first), and a feed is stamped before its
//! fetch starts, so a feed that keeps failing still moves to the back of the
//! queue. Cycles run one after another; a run never overlaps two of them.
//!
//! Only one scheduler should poll a given database at a time.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::feed::{self, FetchError, FetchOptions, IngestReport, ParseError};
use crate::storage::{Feed, FeedStore, StoreError};
use crate::util::wait_for_shutdown;

/// Shortest interval `run` will use.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No feeds registered; add one with `gator addfeed <name> <url>`")]
    NoFeedsRegistered,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A stage failure for the feed handled in one cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Could not parse feed: {0}")]
    Parse(#[from] ParseError),
}

/// Request settings the scheduler's fetches use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub timeout: Duration,
    pub max_feed_bytes: usize,
    pub user_agent: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: feed::DEFAULT_TIMEOUT,
            max_feed_bytes: feed::MAX_FEED_SIZE,
            user_agent: feed::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl From<&Config> for PollerConfig {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.request_timeout_secs),
            max_feed_bytes: config.max_feed_bytes,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl PollerConfig {
    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: self.timeout,
            max_bytes: self.max_feed_bytes,
        }
    }
}

/// What happened to the feed picked in one cycle.
#[derive(Debug)]
pub struct CycleReport {
    /// The feed as stamped at the start of the cycle
    pub feed: Feed,
    /// Channel title from the parsed document, when parsing got that far
    pub channel_title: Option<String>,
    pub outcome: Result<IngestReport, CycleError>,
}

impl CycleReport {
    pub fn inserted(&self) -> usize {
        self.outcome.as_ref().map_or(0, IngestReport::inserted)
    }
}

/// Totals for a continuous run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub inserted: u64,
}

impl RunSummary {
    fn record(&mut self, result: &Result<CycleReport, SchedulerError>) {
        self.cycles += 1;
        match result {
            Ok(report) if report.outcome.is_ok() => {
                self.inserted += report.inserted() as u64;
            }
            _ => self.failed_cycles += 1,
        }
    }
}

pub struct Scheduler<S> {
    store: S,
    client: reqwest::Client,
    options: FetchOptions,
}

impl<S: FeedStore> Scheduler<S> {
    /// Build a scheduler with its own HTTP client.
    pub fn new(store: S, config: &PollerConfig) -> Result<Self, FetchError> {
        let client = feed::build_client(&config.user_agent)?;
        Ok(Self::with_client(store, client, config))
    }

    /// Build a scheduler around an existing client.
    ///
    /// The client's own User-Agent wins over `config.user_agent`.
    pub fn with_client(store: S, client: reqwest::Client, config: &PollerConfig) -> Self {
        Self {
            store,
            client,
            options: config.fetch_options(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a single cycle.
    ///
    /// Store failures and an empty feed table end the cycle with an error.
    /// Fetch and parse failures belong to the picked feed and are reported
    /// inside [`CycleReport::outcome`].
    pub async fn poll_once(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport, SchedulerError> {
        let next = self
            .store
            .get_next_feed_to_fetch()
            .await?
            .ok_or(SchedulerError::NoFeedsRegistered)?;

        let feed = self.store.mark_feed_fetched(next.id).await?;
        tracing::info!(feed = %feed.name, url = %feed.url, "Fetching feed");

        let (channel_title, outcome) = match self.collect(&feed, shutdown).await {
            Ok((title, ingest)) => (Some(title), Ok(ingest)),
            Err(e) => (None, Err(e)),
        };
        Ok(CycleReport {
            feed,
            channel_title,
            outcome,
        })
    }

    /// Fetch, parse and ingest one feed, returning the channel title.
    async fn collect(
        &self,
        feed: &Feed,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(String, IngestReport), CycleError> {
        let bytes = feed::fetch(&self.client, &feed.url, self.options, shutdown).await?;
        let document = feed::parse_feed(&bytes)?;

        for item in &document.items {
            tracing::debug!(feed = %feed.name, title = %item.title, "Found post");
        }

        let report = feed::ingest(&self.store, feed.id, &document).await;
        Ok((document.title, report))
    }

    /// Poll continuously, one cycle per `interval`, until `shutdown` is set.
    ///
    /// The first cycle starts immediately. A cycle that overruns the interval
    /// is followed by the next one right away, never concurrently. Errors
    /// are logged and polling carries on. A cycle in flight when shutdown
    /// arrives is abandoned.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                biased;

                () = wait_for_shutdown(&mut shutdown) => break,

                _ = ticker.tick() => {}
            }

            let cycle = self.poll_once(shutdown.clone());

            tokio::select! {
                biased;

                () = wait_for_shutdown(&mut shutdown) => {
                    tracing::info!("Shutdown requested, abandoning in-flight cycle");
                    break;
                }

                result = cycle => {
                    log_cycle(&result);
                    summary.record(&result);
                }
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            failed = summary.failed_cycles,
            inserted = summary.inserted,
            "Polling stopped"
        );
        summary
    }
}

fn log_cycle(result: &Result<CycleReport, SchedulerError>) {
    match result {
        Ok(CycleReport {
            feed,
            outcome: Ok(ingest),
            ..
        }) => {
            tracing::info!(
                feed = %feed.name,
                inserted = ingest.inserted(),
                skipped = ingest.skipped(),
                failed = ingest.failed(),
                "Feed collected"
            );
        }
        Ok(CycleReport {
            feed,
            outcome: Err(e),
            ..
        }) => {
            tracing::warn!(feed = %feed.name, url = %feed.url, error = %e, "Feed cycle failed");
        }
        Err(SchedulerError::NoFeedsRegistered) => {
            tracing::warn!("No feeds registered, nothing to poll");
        }
        Err(e) => {
            tracing::error!(error = %e, "Poll cycle failed");
        }
    }
}
