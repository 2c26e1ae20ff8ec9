//! Small helpers shared by the poll loop and the command front end.

mod duration;
mod text;
mod url_validator;

pub use duration::{parse_interval, IntervalError};
pub use text::{one_line, truncate_to_width};
pub use url_validator::{validate_feed_url, UrlValidationError};

use tokio::sync::watch;

/// Resolve once `shutdown` holds `true`.
///
/// A dropped sender means nobody can ask for shutdown any more, so the
/// future then stays pending instead of firing.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
