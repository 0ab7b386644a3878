//! SQLite implementation of the CursorStore trait
//!
//! This module provides a SQLite-based cursor store using rusqlite and
//! tokio-rusqlite for async operations. Cursors are stored as their JSON
//! encoding so integer and string sequences round-trip unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::CursorStore;
use crate::error::StoreError;
use crate::models::FeedCursor;

/// SQLite cursor store
pub struct SqliteCursorStore {
    conn: Connection,
}

impl SqliteCursorStore {
    /// Open (and migrate) a SQLite cursor store
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;

        // Run migrations
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(":memory:").await
    }

    /// When the cursor for `feed` was last saved
    pub async fn updated_at(&self, feed: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let feed = feed.to_string();

        let raw = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT updated_at FROM feed_cursors WHERE feed = ?1",
                    [&feed],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()
            })
            .await?;

        Ok(parse_datetime(raw.flatten()))
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn load(&self, feed: &str) -> Result<Option<FeedCursor>, StoreError> {
        let feed = feed.to_string();

        let raw = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT cursor FROM feed_cursors WHERE feed = ?1",
                    [&feed],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await?;

        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| StoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, feed: &str, cursor: &FeedCursor) -> Result<(), StoreError> {
        let feed = feed.to_string();
        let encoded =
            serde_json::to_string(cursor).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO feed_cursors (feed, cursor, updated_at)
                    VALUES (?1, ?2, CURRENT_TIMESTAMP)
                    ON CONFLICT(feed) DO UPDATE SET
                        cursor = excluded.cursor,
                        updated_at = excluded.updated_at
                    "#,
                    rusqlite::params![feed, encoded],
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await?;

        Ok(())
    }
}

/// Parse datetime string from SQLite
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // Try parsing SQLite's datetime format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
