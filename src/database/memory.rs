//! In-memory cursor store for tests and dry runs

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CursorStore;
use crate::error::StoreError;
use crate::models::FeedCursor;

/// Process-local cursor store; nothing survives a restart
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<String, FeedCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cursor, as if a previous run had saved it
    pub async fn with_cursor(self, feed: &str, cursor: FeedCursor) -> Self {
        self.cursors.write().await.insert(feed.to_string(), cursor);
        self
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, feed: &str) -> Result<Option<FeedCursor>, StoreError> {
        Ok(self.cursors.read().await.get(feed).cloned())
    }

    async fn save(&self, feed: &str, cursor: &FeedCursor) -> Result<(), StoreError> {
        self.cursors
            .write()
            .await
            .insert(feed.to_string(), cursor.clone());
        Ok(())
    }
}
