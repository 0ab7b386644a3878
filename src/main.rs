//! registry-follower - Follow a CouchDB-style registry change feed
//!
//! This is the main entry point for the registry-follower application.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

use registry_follower::config::Config;
use registry_follower::database::{CursorStore, SqliteCursorStore};
use registry_follower::logging::init_tracing;
use registry_follower::models::FeedCursor;
use registry_follower::sync::{
    ChangeFeedClient, ChangeSink, FeedFollower, JsonLinesSink, SchedulerConfig, SyncScheduler,
    Syncable,
};

/// registry-follower - Follow a CouchDB-style registry change feed
#[derive(Parser, Debug)]
#[command(name = "registry-follower")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "REGISTRY_FOLLOWER_CONFIG", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the database summary
    Summary,

    /// Fetch and print a single page without touching the cursor store
    Page {
        /// Cursor to start from (defaults to the start of history)
        #[arg(long)]
        since: Option<String>,

        /// Maximum number of raw changes to request
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Run the follower once, then exit
    Once,

    /// Follow the feed until interrupted
    Follow,

    /// Print the stored cursor
    Cursor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.feed.base_url,
        "Starting registry-follower"
    );

    match args.command {
        Command::Summary => {
            let client = ChangeFeedClient::from_config(&config)?;
            let summary = client.summary().await?;
            print_json(&serde_json::to_value(&summary)?).await?;
        }
        Command::Page { since, limit } => {
            let client = ChangeFeedClient::from_config(&config)?;
            let cursor = since.as_deref().map(FeedCursor::parse).unwrap_or_default();
            let limit = limit.unwrap_or_else(|| client.page_size());
            let page = client.next_page_with_limit(&cursor, limit).await?;
            print_json(&serde_json::to_value(&page)?).await?;
        }
        Command::Once => {
            let follower = build_follower(&config).await?;
            let result = follower.run_once().await?;
            info!(
                pages = result.pages,
                records = result.records_emitted,
                cursor = %result.cursor,
                "Follow run complete"
            );
        }
        Command::Follow => {
            let follower = build_follower(&config).await?;
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

            let scheduler = SyncScheduler::new(
                SchedulerConfig::from(&config.scheduler),
                vec![Arc::new(follower) as Arc<dyn Syncable>],
                shutdown_rx,
            );
            let handle = tokio::spawn(scheduler.run());

            shutdown_signal().await;
            let _ = shutdown_tx.send(());
            handle.await?;
        }
        Command::Cursor => {
            let store = SqliteCursorStore::new(&config.cursor_store.path).await?;
            let cursor = store
                .load(&config.cursor_store.feed_name)
                .await?
                .unwrap_or_default();
            let updated_at = store.updated_at(&config.cursor_store.feed_name).await?;
            print_json(&serde_json::json!({
                "feed": config.cursor_store.feed_name,
                "cursor": cursor,
                "updated_at": updated_at,
            }))
            .await?;
        }
    }

    info!("registry-follower shutdown complete");
    Ok(())
}

/// Wire the feed client, SQLite cursor store and stdout sink together
async fn build_follower(config: &Config) -> anyhow::Result<FeedFollower> {
    let client = ChangeFeedClient::from_config(config)?;

    let store = SqliteCursorStore::new(&config.cursor_store.path).await?;
    info!(path = %config.cursor_store.path, "Cursor store initialized");

    let sink: Arc<dyn ChangeSink> = Arc::new(JsonLinesSink::stdout());

    Ok(FeedFollower::new(
        config.cursor_store.feed_name.clone(),
        client,
        Arc::new(store),
        sink,
    )
    .with_max_pages(config.scheduler.max_pages_per_run)
    .with_interval(Duration::from_secs(config.scheduler.interval_secs)))
}

/// Write one JSON document to stdout
async fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let mut out = serde_json::to_vec_pretty(value)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
