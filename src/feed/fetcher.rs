use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

use crate::util::wait_for_shutdown;

/// User-Agent sent with every feed request unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = "gator";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Why an in-flight fetch stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The request exceeded its deadline
    TimedOut,
    /// The caller signalled shutdown
    Shutdown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::TimedOut => f.write_str("timed out"),
            CancelReason::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// Errors that can occur while retrieving a feed body.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Feed unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    /// Deadline exceeded or shutdown signalled
    #[error("Request cancelled: {0}")]
    Cancelled(CancelReason),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Cancelled(CancelReason::TimedOut)
        } else {
            FetchError::Unreachable(err)
        }
    }
}

/// Per-request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_bytes: MAX_FEED_SIZE,
        }
    }
}

/// Build the HTTP client used for feed requests.
///
/// Every request carries `user_agent`; no authentication headers are sent.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()
        .map_err(FetchError::Client)
}

/// Fetch the raw body of a feed.
///
/// Succeeds only on a 2xx status. The request is abandoned with
/// [`FetchError::Cancelled`] when `options.timeout` elapses or `shutdown`
/// flips to `true`. No parsing happens here.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    options: FetchOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Vec<u8>, FetchError> {
    let request = async {
        let response = client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        read_limited_bytes(response, options.max_bytes).await
    };

    tokio::select! {
        biased;

        () = wait_for_shutdown(&mut shutdown) => {
            tracing::debug!(feed = %url, "Fetch abandoned on shutdown");
            Err(FetchError::Cancelled(CancelReason::Shutdown))
        }

        result = tokio::time::timeout(options.timeout, request) => {
            result.map_err(|_| FetchError::Cancelled(CancelReason::TimedOut))?
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
