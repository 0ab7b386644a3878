//! Change feed following
//!
//! This module holds everything between the remote `_changes` endpoint and
//! the sink that consumes enriched records.
//!
//! # Components
//!
//! - [`retry`]: deadline-bounded retry engine with jittered doubling backoff
//! - [`decoder`]: streaming JSON decoder with optional gzip decompression
//! - [`http_client`]: concurrency-limited transport with per-attempt timeouts
//! - [`changes`]: change feed client (summary, pages, enrichment)
//! - [`sink`]: record destinations
//! - [`follower`]: cursor-persisting follow loop
//! - [`scheduler`]: periodic runner with jitter and shutdown
//!
//! # Example
//!
//! ```ignore
//! use registry_follower::config::Config;
//! use registry_follower::models::FeedCursor;
//! use registry_follower::sync::ChangeFeedClient;
//!
//! let client = ChangeFeedClient::from_config(&Config::default())?;
//! let page = client.next_page(&FeedCursor::start()).await?;
//! for record in &page.records {
//!     println!("{} @ {}", record.id, record.sequence);
//! }
//! ```

pub mod changes;
pub mod decoder;
pub mod follower;
pub mod http_client;
pub mod retry;
pub mod scheduler;
pub mod sink;

// Re-export main types for convenience
pub use changes::ChangeFeedClient;
pub use follower::{FeedFollower, FollowResult};
pub use http_client::FeedTransport;
pub use retry::{Backoff, RetryManager};
pub use scheduler::{SchedulerConfig, SyncScheduler, SyncStatus, Syncable};
pub use sink::{ChangeSink, JsonLinesSink, LogSink};
