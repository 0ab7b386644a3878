//! Cursor persistence for registry-follower
//!
//! This module defines the cursor store trait and its SQLite and in-memory
//! implementations. A feed with no stored cursor starts from the beginning of
//! history.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryCursorStore;
pub use sqlite::SqliteCursorStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::FeedCursor;

/// Durable storage for the last processed cursor of each feed
///
/// The follower loads once per run and saves once per completed page.
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, `None` when the feed has never been followed
    async fn load(&self, feed: &str) -> Result<Option<FeedCursor>, StoreError>;

    /// Persist the cursor after a page has been fully processed
    async fn save(&self, feed: &str, cursor: &FeedCursor) -> Result<(), StoreError>;
}
