//! Configuration management for registry-follower
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Remote change feed configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Retry and timeout policy for every HTTP request
    #[serde(default)]
    pub retry: RetryConfig,

    /// Connection pool configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Cursor persistence configuration
    #[serde(default)]
    pub cursor_store: CursorStoreConfig,

    /// Follow loop scheduling
    #[serde(default)]
    pub scheduler: FollowSchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix REGISTRY_FOLLOWER_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(url) = std::env::var("REGISTRY_FOLLOWER_FEED_BASE_URL") {
            config.feed.base_url = url;
        }
        if let Ok(url) = std::env::var("REGISTRY_FOLLOWER_FEED_REGISTRY_URL") {
            config.feed.registry_url = url;
        }
        if let Ok(size) = std::env::var("REGISTRY_FOLLOWER_FEED_PAGE_SIZE") {
            config.feed.page_size = size
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid page size".to_string()))?;
        }
        if let Ok(deadline) = std::env::var("REGISTRY_FOLLOWER_RETRY_DEADLINE_MS") {
            config.retry.deadline_ms = deadline
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid retry deadline".to_string()))?;
        }
        if let Ok(path) = std::env::var("REGISTRY_FOLLOWER_CURSOR_STORE_PATH") {
            config.cursor_store.path = path;
        }
        if let Ok(level) = std::env::var("REGISTRY_FOLLOWER_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Reject values that would make the follower unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("feed.base_url", &self.feed.base_url),
            ("feed.registry_url", &self.feed.registry_url),
        ] {
            Url::parse(url)
                .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", name, e)))?;
        }
        if self.feed.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "feed.page_size must be greater than zero".to_string(),
            ));
        }
        if self.transport.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "transport.max_concurrent must be greater than zero".to_string(),
            ));
        }
        if self.cursor_store.feed_name.is_empty() {
            return Err(ConfigError::MissingRequired(
                "cursor_store.feed_name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote change feed configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    /// Database root; `GET {base_url}` returns the database summary
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the changes endpoint relative to `base_url`
    #[serde(default = "default_changes_path")]
    pub changes_path: String,

    /// Where full documents are fetched from during enrichment
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Opt-in header required by some replication backends; empty name disables it
    #[serde(default = "default_opt_in_header_name")]
    pub opt_in_header_name: String,

    /// Value sent with the opt-in header
    #[serde(default = "default_opt_in_header_value")]
    pub opt_in_header_value: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            changes_path: default_changes_path(),
            registry_url: default_registry_url(),
            page_size: default_page_size(),
            opt_in_header_name: default_opt_in_header_name(),
            opt_in_header_value: default_opt_in_header_value(),
        }
    }
}

fn default_base_url() -> String {
    "https://replicate.npmjs.com/registry".to_string()
}

fn default_changes_path() -> String {
    "_changes".to_string()
}

fn default_registry_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_opt_in_header_name() -> String {
    "npm-replication-opt-in".to_string()
}

fn default_opt_in_header_value() -> String {
    "true".to_string()
}

/// Retry policy for HTTP requests
///
/// The backoff ceiling starts at `initial_backoff_ms` and doubles after each
/// retry; the actual delay is drawn uniformly below the ceiling. The whole
/// sequence is bounded by `deadline_ms`, each attempt by `attempt_timeout_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Initial jitter window in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Deadline for the whole retry sequence in milliseconds
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,

    /// Timeout for a single attempt in milliseconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            deadline_ms: default_deadline(),
            attempt_timeout_ms: default_attempt_timeout(),
        }
    }
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_deadline() -> u64 {
    30_000
}

fn default_attempt_timeout() -> u64 {
    5_000
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Maximum number of requests in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// How long an idle keep-alive connection stays in the pool
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_pool_idle_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("registry-follower/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Cursor persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorStoreConfig {
    /// Path to SQLite database file
    #[serde(default = "default_cursor_store_path")]
    pub path: String,

    /// Key under which this feed's cursor is stored
    #[serde(default = "default_feed_name")]
    pub feed_name: String,
}

impl Default for CursorStoreConfig {
    fn default() -> Self {
        Self {
            path: default_cursor_store_path(),
            feed_name: default_feed_name(),
        }
    }
}

fn default_cursor_store_path() -> String {
    "/data/db/registry-follower.db".to_string()
}

fn default_feed_name() -> String {
    "npm".to_string()
}

/// Follow loop scheduling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowSchedulerConfig {
    /// Seconds between follow runs
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Delay before the first run
    #[serde(default)]
    pub initial_delay_secs: u64,

    /// Random delay added to each scheduled run
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,

    /// Upper bound for one follow run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Pages fetched per run before yielding back to the scheduler
    #[serde(default = "default_max_pages_per_run")]
    pub max_pages_per_run: u32,
}

impl Default for FollowSchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            initial_delay_secs: 0,
            jitter_secs: default_jitter(),
            run_timeout_secs: default_run_timeout(),
            max_pages_per_run: default_max_pages_per_run(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_jitter() -> u64 {
    5
}

fn default_run_timeout() -> u64 {
    300
}

fn default_max_pages_per_run() -> u32 {
    100
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `text`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
