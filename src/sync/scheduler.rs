//! Follow scheduler
//!
//! Periodically triggers follow runs for every registered source with a
//! configurable interval, random jitter and a per-run timeout. Runs stop when
//! the shutdown broadcast fires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::config::FollowSchedulerConfig;
use crate::error::AppError;

use super::follower::FollowResult;

/// Configuration for the follow scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before the first run (seconds)
    pub initial_delay_secs: u64,
    /// Upper bound of the random delay added to each scheduled run (seconds)
    pub jitter_secs: u64,
    /// Timeout for a single run (seconds)
    pub sync_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&FollowSchedulerConfig::default())
    }
}

impl From<&FollowSchedulerConfig> for SchedulerConfig {
    fn from(config: &FollowSchedulerConfig) -> Self {
        Self {
            initial_delay_secs: config.initial_delay_secs,
            jitter_secs: config.jitter_secs,
            sync_timeout_secs: config.run_timeout_secs,
        }
    }
}

/// Status of a source
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// When the last run finished
    pub last_sync: Option<std::time::SystemTime>,
    /// Result of the last run
    pub last_result: Option<Result<FollowResult, String>>,
    /// Estimate of the next run
    pub next_sync: Option<std::time::SystemTime>,
    /// Whether a run is in progress
    pub in_progress: bool,
}

/// A source the scheduler can run periodically
#[async_trait]
pub trait Syncable: Send + Sync {
    /// Name used in logs and status
    fn name(&self) -> &str;

    /// Time between runs
    fn sync_interval(&self) -> Duration;

    /// Perform one run
    async fn sync(&self) -> Result<FollowResult, AppError>;
}

/// Runs every source on its own interval until shutdown
pub struct SyncScheduler {
    config: SchedulerConfig,
    sources: Vec<Arc<dyn Syncable>>,
    status: Arc<RwLock<HashMap<String, SyncStatus>>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl SyncScheduler {
    pub fn new(
        config: SchedulerConfig,
        sources: Vec<Arc<dyn Syncable>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let status = sources
            .iter()
            .map(|s| (s.name().to_string(), SyncStatus::default()))
            .collect();

        Self {
            config,
            sources,
            status: Arc::new(RwLock::new(status)),
            shutdown_rx,
        }
    }

    /// Get the current status of all sources
    pub async fn get_status(&self) -> HashMap<String, SyncStatus> {
        self.status.read().await.clone()
    }

    /// Shared status map, readable while the scheduler runs
    pub fn status_handle(&self) -> Arc<RwLock<HashMap<String, SyncStatus>>> {
        self.status.clone()
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        info!(sources = self.sources.len(), "Starting follow scheduler");

        if self.config.initial_delay_secs > 0 {
            debug!(
                delay_secs = self.config.initial_delay_secs,
                "Waiting for initial delay"
            );
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received before first run");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.config.initial_delay_secs)) => {}
            }
        }

        let mut handles = Vec::new();
        let (task_shutdown_tx, _) = broadcast::channel::<()>(1);

        for source in &self.sources {
            let source = source.clone();
            let status = self.status.clone();
            let config = self.config.clone();
            let task_shutdown_rx = task_shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                Self::run_source(source, status, config, task_shutdown_rx).await;
            }));
        }

        let _ = self.shutdown_rx.recv().await;
        info!("Shutdown signal received, stopping follow scheduler");
        let _ = task_shutdown_tx.send(());

        for handle in handles {
            let _ = handle.await;
        }

        info!("Follow scheduler stopped");
    }

    async fn run_source(
        source: Arc<dyn Syncable>,
        status: Arc<RwLock<HashMap<String, SyncStatus>>>,
        config: SchedulerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let name = source.name().to_string();
        let interval = source.sync_interval();

        info!(source = name, "Performing initial run");
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(source = name, "Shutdown during initial run");
                return;
            }
            _ = Self::perform_sync(&source, &status, &config) => {}
        }

        let first_jitter = jitter(config.jitter_secs);
        let next_run = Instant::now() + interval + first_jitter;
        debug!(
            source = name,
            interval_secs = interval.as_secs(),
            jitter_ms = first_jitter.as_millis() as u64,
            "Scheduled next run"
        );

        let mut timer = interval_at(next_run, interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(source = name, "Follow task shutting down");
                    break;
                }
                _ = timer.tick() => {
                    let delay = jitter(config.jitter_secs);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    info!(source = name, "Performing scheduled run");
                    Self::perform_sync(&source, &status, &config).await;
                }
            }
        }
    }

    async fn perform_sync(
        source: &Arc<dyn Syncable>,
        status: &Arc<RwLock<HashMap<String, SyncStatus>>>,
        config: &SchedulerConfig,
    ) {
        let name = source.name().to_string();

        {
            let mut status_map = status.write().await;
            if let Some(s) = status_map.get_mut(&name) {
                s.in_progress = true;
            }
        }

        let result =
            tokio::time::timeout(Duration::from_secs(config.sync_timeout_secs), source.sync())
                .await;

        let mut status_map = status.write().await;
        if let Some(s) = status_map.get_mut(&name) {
            s.in_progress = false;
            s.last_sync = Some(std::time::SystemTime::now());

            match result {
                Ok(Ok(outcome)) => {
                    if outcome.pages == 0 {
                        debug!(source = name, cursor = %outcome.cursor, "Already caught up");
                    } else {
                        info!(
                            source = name,
                            pages = outcome.pages,
                            records = outcome.records_emitted,
                            cursor = %outcome.cursor,
                            "Run completed"
                        );
                    }
                    s.last_result = Some(Ok(outcome));
                }
                Ok(Err(err)) => {
                    warn!(source = name, error = %err, "Run failed");
                    s.last_result = Some(Err(err.to_string()));
                }
                Err(_) => {
                    error!(
                        source = name,
                        timeout_secs = config.sync_timeout_secs,
                        "Run timed out"
                    );
                    s.last_result = Some(Err("Run timed out".to_string()));
                }
            }

            s.next_sync = Some(std::time::SystemTime::now() + source.sync_interval());
        }
    }
}

fn jitter(max_secs: u64) -> Duration {
    if max_secs == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_secs * 1000))
}
