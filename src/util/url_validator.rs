use thiserror::Error;
use url::Url;

/// Reasons a feed URL is refused at registration time.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Feeds are fetched anonymously, so embedded credentials are never sent.
    #[error("URL must not contain credentials")]
    Credentials,
}

/// Check that `url_str` is something the fetcher can poll.
///
/// Accepts absolute `http`/`https` URLs with a host and no user info.
/// Returns the parsed [`Url`]; callers store its normalized string form.
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://blog.boot.dev/index.xml").unwrap();
/// assert_eq!(url.host_str(), Some("blog.boot.dev"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlValidationError::MissingHost),
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    Ok(url)
}
