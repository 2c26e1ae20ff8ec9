//! Command-line subcommands and their handlers.
//!
//! Handlers print for a terminal. Commands that act as a user receive the
//! current user, resolved once in [`run`].

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::scheduler::{PollerConfig, Scheduler, SchedulerError};
use crate::storage::{Database, StoreError, User};
use crate::util::{one_line, parse_interval, truncate_to_width, validate_feed_url};

/// Width descriptions are cut to in `browse`.
const DESCRIPTION_WIDTH: usize = 200;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a user and log in as them
    Register { name: String },

    /// Switch the current user
    Login { name: String },

    /// List all users
    Users,

    /// Delete every user, along with their feeds, follows and posts
    Reset,

    /// Register a feed and follow it as the current user
    Addfeed { name: String, url: String },

    /// List all registered feeds
    Feeds,

    /// Follow an already registered feed
    Follow { url: String },

    /// List the feeds the current user follows
    Following,

    /// Stop following a feed
    Unfollow { url: String },

    /// Poll feeds for new posts
    Agg {
        /// Time between polls, e.g. 30s, 1m, 1h30m
        #[arg(required_unless_present = "once")]
        interval: Option<String>,

        /// Poll a single feed and exit
        #[arg(long, conflicts_with = "interval")]
        once: bool,
    },

    /// Show the latest posts from followed feeds
    Browse {
        #[arg(default_value_t = 2)]
        limit: i64,
    },
}

/// Everything a handler may touch.
pub struct Context {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
}

impl Command {
    fn needs_user(&self) -> bool {
        matches!(
            self,
            Command::Addfeed { .. }
                | Command::Follow { .. }
                | Command::Following
                | Command::Unfollow { .. }
                | Command::Browse { .. }
        )
    }
}

/// Execute one command.
pub async fn run(command: Command, ctx: &mut Context) -> Result<()> {
    let user = if command.needs_user() {
        Some(current_user(ctx).await?)
    } else {
        None
    };

    match (command, user) {
        (Command::Register { name }, _) => register(ctx, &name).await,
        (Command::Login { name }, _) => login(ctx, &name).await,
        (Command::Users, _) => list_users(ctx).await,
        (Command::Reset, _) => reset(ctx).await,
        (Command::Feeds, _) => list_feeds(ctx).await,
        (Command::Agg { interval, once }, _) => aggregate(ctx, interval.as_deref(), once).await,
        (Command::Addfeed { name, url }, Some(user)) => add_feed(ctx, &user, &name, &url).await,
        (Command::Follow { url }, Some(user)) => follow(ctx, &user, &url).await,
        (Command::Following, Some(user)) => following(ctx, &user).await,
        (Command::Unfollow { url }, Some(user)) => unfollow(ctx, &user, &url).await,
        (Command::Browse { limit }, Some(user)) => browse(ctx, &user, limit).await,
        (command, None) => bail!("{:?} requires a logged-in user", command),
    }
}

async fn current_user(ctx: &Context) -> Result<User> {
    let Some(name) = ctx.config.current_user_name.as_deref() else {
        bail!("Not logged in. Run `gator register <name>` or `gator login <name>` first");
    };
    match ctx.db.get_user_by_name(name).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound { .. }) => {
            bail!("Current user {name:?} no longer exists. Run `gator login <name>`")
        }
        Err(e) => Err(e).context("Failed to look up current user"),
    }
}

// ============================================================================
// Users
// ============================================================================

async fn register(ctx: &mut Context, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }

    let user = ctx.db.create_user(name).await?;
    ctx.config
        .set_user(&user.name, &ctx.config_path)
        .context("Failed to save config")?;

    tracing::info!(user = %user.name, id = %user.id, "Registered user");
    println!("User created: {}", user.name);
    Ok(())
}

async fn login(ctx: &mut Context, name: &str) -> Result<()> {
    let user = match ctx.db.get_user_by_name(name).await {
        Ok(user) => user,
        Err(StoreError::NotFound { .. }) => bail!("User {name:?} does not exist"),
        Err(e) => return Err(e.into()),
    };
    ctx.config
        .set_user(&user.name, &ctx.config_path)
        .context("Failed to save config")?;

    println!("Logged in as {}", user.name);
    Ok(())
}

async fn list_users(ctx: &Context) -> Result<()> {
    let current = ctx.config.current_user_name.as_deref();
    for user in ctx.db.get_users().await? {
        if Some(user.name.as_str()) == current {
            println!("* {} (current)", user.name);
        } else {
            println!("* {}", user.name);
        }
    }
    Ok(())
}

async fn reset(ctx: &Context) -> Result<()> {
    let removed = ctx
        .db
        .delete_all_users()
        .await
        .context("Failed to reset database")?;
    println!("Database reset: removed {} user(s)", removed);
    Ok(())
}

// ============================================================================
// Feeds and follows
// ============================================================================

async fn add_feed(ctx: &Context, user: &User, name: &str, url: &str) -> Result<()> {
    let url = validate_feed_url(url).with_context(|| format!("Cannot add feed {url:?}"))?;

    let feed = ctx.db.create_feed(name, url.as_str(), user.id).await?;
    let follow = ctx.db.create_feed_follow(user.id, feed.id).await?;

    tracing::info!(feed = %feed.name, url = %feed.url, "Added feed");
    println!("Feed added:");
    println!("  Name: {}", feed.name);
    println!("  URL:  {}", feed.url);
    println!("{} now follows {}", follow.user_name, follow.feed_name);
    Ok(())
}

async fn list_feeds(ctx: &Context) -> Result<()> {
    let feeds = ctx.db.get_feeds().await?;
    if feeds.is_empty() {
        println!("No feeds registered");
        return Ok(());
    }

    let users = ctx.db.get_users().await?;
    for feed in feeds {
        let owner = users
            .iter()
            .find(|u| u.id == feed.user_id)
            .map_or("?", |u| u.name.as_str());
        println!("* {}", feed.name);
        println!("  URL:   {}", feed.url);
        println!("  Owner: {}", owner);
        match feed.last_fetched() {
            Some(at) => println!("  Last fetched: {}", format_time(at)),
            None => println!("  Last fetched: never"),
        }
    }
    Ok(())
}

async fn follow(ctx: &Context, user: &User, url: &str) -> Result<()> {
    let url = validate_feed_url(url)?;
    let feed = ctx.db.get_feed_by_url(url.as_str()).await?;
    let follow = ctx.db.create_feed_follow(user.id, feed.id).await?;
    println!("{} now follows {}", follow.user_name, follow.feed_name);
    Ok(())
}

async fn following(ctx: &Context, user: &User) -> Result<()> {
    let follows = ctx.db.get_feed_follows_for_user(user.id).await?;
    if follows.is_empty() {
        println!("{} does not follow any feeds", user.name);
        return Ok(());
    }
    for follow in follows {
        println!("* {} ({})", follow.feed_name, follow.feed_url);
    }
    Ok(())
}

async fn unfollow(ctx: &Context, user: &User, url: &str) -> Result<()> {
    let url = validate_feed_url(url)?;
    ctx.db.delete_feed_follow(user.id, url.as_str()).await?;
    println!("{} unfollowed {}", user.name, url);
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

async fn aggregate(ctx: &Context, interval: Option<&str>, once: bool) -> Result<()> {
    // Parse before touching the network so a bad argument fails fast.
    let interval = match (interval, once) {
        (_, true) => None,
        (Some(raw), false) => Some(parse_interval(raw).context("Invalid interval")?),
        (None, false) => bail!("An interval is required unless --once is given"),
    };

    let scheduler = Scheduler::new(ctx.db.clone(), &PollerConfig::from(&ctx.config))
        .context("Failed to build HTTP client")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = tokio::spawn(forward_shutdown_signals(shutdown_tx));

    let result = match interval {
        None => poll_once(&scheduler, shutdown_rx).await,
        Some(interval) => {
            println!("Collecting feeds every {}", format_interval(interval));
            let summary = scheduler.run(interval, shutdown_rx).await;
            println!(
                "Stopped after {} cycle(s): {} new post(s), {} failed cycle(s)",
                summary.cycles, summary.inserted, summary.failed_cycles
            );
            Ok(())
        }
    };

    signals.abort();
    result
}

async fn poll_once(
    scheduler: &Scheduler<Database>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let report = match scheduler.poll_once(shutdown).await {
        Ok(report) => report,
        Err(SchedulerError::NoFeedsRegistered) => {
            bail!("No feeds registered. Add one with `gator addfeed <name> <url>`")
        }
        Err(e) => return Err(e.into()),
    };

    match &report.outcome {
        Ok(ingest) => {
            println!(
                "{}: {} new, {} already stored, {} failed",
                report.channel_title.as_deref().unwrap_or(&report.feed.name),
                ingest.inserted(),
                ingest.skipped(),
                ingest.failed()
            );
            Ok(())
        }
        Err(e) => bail!("Failed to collect {}: {}", report.feed.url, e),
    }
}

/// Flip `shutdown` on Ctrl-C or SIGTERM.
async fn forward_shutdown_signals(shutdown: watch::Sender<bool>) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                return;
            }
            tracing::info!("Received SIGINT, shutting down gracefully");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully");
        }
    }

    let _ = shutdown.send(true);
}

// ============================================================================
// Browse
// ============================================================================

async fn browse(ctx: &Context, user: &User, limit: i64) -> Result<()> {
    let posts = ctx.db.get_posts_for_user(user.id, limit).await?;
    if posts.is_empty() {
        println!("No posts yet. Follow a feed and run `gator agg` to collect some");
        return Ok(());
    }

    for post in posts {
        let published = post
            .published()
            .map_or_else(|| "undated".to_string(), format_time);
        println!("{} from {}", published, one_line(&post.feed_name));
        println!("--- {} ---", one_line(&post.title));
        if let Some(description) = post.description.as_deref() {
            println!(
                "    {}",
                truncate_to_width(&one_line(description), DESCRIPTION_WIDTH)
            );
        }
        println!("Link: {}", post.url);
        println!("=====================================");
    }
    Ok(())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%a %b %e %Y %H:%M").to_string()
}

/// `1h30m0s`-style rendering of a polling interval.
fn format_interval(interval: Duration) -> String {
    let total = interval.as_secs();
    let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
    let millis = interval.subsec_millis();
    match (h, m) {
        (0, 0) if millis > 0 && s == 0 => format!("{}ms", millis),
        (0, 0) if millis > 0 => format!("{}.{:03}s", s, millis),
        (0, 0) => format!("{}s", s),
        (0, _) => format!("{}m{}s", m, s),
        _ => format!("{}h{}m{}s", h, m, s),
    }
}
