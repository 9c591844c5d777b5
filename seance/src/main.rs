//! seance-watch - keep a session's cached views current as its store changes
//!
//! Watches a session-store directory, publishes change notifications onto the
//! event bus, and lets the change monitor coalesce them into cache refreshes.
//! Prints a one-line summary per refresh; logs go to the XDG state directory.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/seance/seance.log (~/.local/state/seance/seance.log)
//! - Config: $XDG_CONFIG_HOME/seance/config.toml (~/.config/seance/config.toml)

mod store;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use seance_core::cache::CacheCoordinator;
use seance_core::monitor::{ChangeMonitor, MonitorCallbacks, MonitorOptions};
use seance_core::rpc::{Invoker, RetryPolicy, SessionClient};
use seance_core::types::{ChangeEvent, ChangeKind, ViewLevel};
use seance_core::{timeline, Config, EventBus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{is_store_path, JsonStoreBackend};

/// Bus channel the watcher publishes store notifications onto
const STORE_CHANNEL: &str = "session-store";

#[derive(Parser)]
#[command(name = "seance-watch")]
#[command(about = "Watch a session store and keep its cached views current")]
#[command(version)]
struct Args {
    /// Session store directory
    #[arg(long)]
    root: PathBuf,

    /// Session to track
    #[arg(long)]
    session: String,

    /// View level (conversation, qa_pairs, assistant_only, user_only);
    /// defaults to the session's stored preference
    #[arg(long)]
    level: Option<ViewLevel>,

    /// Debounce window override in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Refresh once and exit instead of watching
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        seance_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("seance-watch starting");

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("session store not found: {}", args.root.display()))?;

    let backend = Arc::new(JsonStoreBackend::new(root.clone()));
    let invoker = Invoker::new(RetryPolicy {
        max_retries: config.retry.max_retries,
        base_delay: config.retry.base_delay(),
    });
    let client = SessionClient::new(backend, invoker);
    let coordinator = CacheCoordinator::new(client, &config.cache);

    // CLI override wins; otherwise the stored preference decides
    let level = match args.level {
        Some(level) => level.normalize(),
        None => coordinator.get_preference(&args.session).await,
    };

    if args.once {
        refresh_and_report(&coordinator, &args.session, level)
            .await
            .context("refresh failed")?;
        tracing::info!("seance-watch one-shot complete");
        return Ok(());
    }

    // Bridge the filesystem watcher onto the event bus. The watcher callback
    // runs on notify's thread; publish is safe to call from there.
    let bus = Arc::new(EventBus::new());
    let publish_bus = Arc::clone(&bus);
    let watch_root = root.clone();
    let mut watcher = RecommendedWatcher::new(
        move |result: notify::Result<Event>| match result {
            Ok(event) => {
                let kind = match event.kind {
                    EventKind::Create(_) => ChangeKind::Created,
                    EventKind::Remove(_) => ChangeKind::Deleted,
                    EventKind::Modify(_) => ChangeKind::Modified,
                    // access and metadata noise carries no content change
                    _ => return,
                };
                for path in event.paths {
                    let is_relevant = is_store_path(&watch_root, &path);
                    publish_bus.publish(
                        STORE_CHANNEL,
                        ChangeEvent {
                            kind,
                            path,
                            is_relevant,
                            timestamp: Utc::now(),
                        },
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, "filesystem watcher error"),
        },
        notify::Config::default(),
    )
    .context("failed to create filesystem watcher")?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .context("failed to watch session store")?;

    let refresh_coordinator = coordinator.clone();
    let refresh_session = args.session.clone();
    let callbacks = MonitorCallbacks {
        on_change: Arc::new(|event: &ChangeEvent| {
            tracing::debug!(kind = %event.kind, path = %event.path.display(), "store changed");
        }),
        on_refresh: Arc::new(move || {
            let coordinator = refresh_coordinator.clone();
            let session = refresh_session.clone();
            Box::pin(async move { report(&coordinator, &session, level).await })
        }),
    };
    let options = MonitorOptions {
        enabled: config.monitor.enabled,
        debounce_window: args
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.monitor.debounce_window()),
        settle_delay: config.monitor.settle_delay(),
    };
    let mut monitor = ChangeMonitor::start(Arc::clone(&bus), STORE_CHANNEL, options, callbacks);

    // keep the tracked surface warm while we run
    let _auto_refresh = coordinator.start_auto_refresh(&args.session, level);

    refresh_and_report(&coordinator, &args.session, level)
        .await
        .context("initial refresh failed")?;

    println!(
        "Watching {} (session {}, level {}). Press Ctrl+C to stop.",
        root.display(),
        args.session,
        level
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    println!("\nShutting down...");
    monitor.shutdown();
    tracing::info!("seance-watch stopped");

    Ok(())
}

/// Force-refresh all dependent views, then print the summary line.
async fn refresh_and_report(
    coordinator: &CacheCoordinator,
    session: &str,
    level: ViewLevel,
) -> seance_core::Result<()> {
    coordinator.force_refresh(session, level).await?;
    report(coordinator, session, level).await
}

/// One summary line per refresh, in the shape the views are served in.
async fn report(
    coordinator: &CacheCoordinator,
    session: &str,
    level: ViewLevel,
) -> seance_core::Result<()> {
    let preference = coordinator.get_preference(session).await;
    let timestamp = chrono::Local::now().format("%H:%M:%S");

    if level == ViewLevel::QaPairs {
        let pairs = coordinator.get_qa_pairs(session, level).await?;
        let feed = timeline::from_qa_pairs(&pairs);
        println!(
            "[{}] session {}: {} qa pairs, {} timeline messages (preference: {})",
            timestamp,
            session,
            pairs.len(),
            feed.len(),
            preference
        );
    } else {
        let messages = coordinator.get_messages(session, level).await?;
        println!(
            "[{}] session {}: {} messages at level {} (preference: {})",
            timestamp,
            session,
            messages.len(),
            level,
            preference
        );
    }

    Ok(())
}
