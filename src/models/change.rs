//! Change feed domain models
//!
//! This module defines the cursor, change record, and page types, plus the
//! raw wire shapes returned by a CouchDB-style `_changes` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque position in the remote change log
///
/// Servers hand out either integer sequences (npm replication) or string
/// sequences (CouchDB 2+). The client never interprets them beyond echoing
/// them back as the `since` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedCursor {
    /// Integer sequence
    Number(u64),
    /// String sequence
    Text(String),
}

impl FeedCursor {
    /// Cursor meaning "start of history"
    pub fn start() -> Self {
        FeedCursor::Number(0)
    }

    /// Check if this cursor is the start-of-history sentinel
    pub fn is_start(&self) -> bool {
        matches!(self, FeedCursor::Number(0))
    }

    /// Parse a cursor given on the command line or read from text storage
    ///
    /// Anything that parses as an unsigned integer is treated as a numeric
    /// sequence, everything else is kept verbatim.
    pub fn parse(input: &str) -> Self {
        match input.parse::<u64>() {
            Ok(n) => FeedCursor::Number(n),
            Err(_) => FeedCursor::Text(input.to_string()),
        }
    }
}

impl Default for FeedCursor {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedCursor::Number(n) => write!(f, "{}", n),
            FeedCursor::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for FeedCursor {
    fn from(n: u64) -> Self {
        FeedCursor::Number(n)
    }
}

impl From<&str> for FeedCursor {
    fn from(s: &str) -> Self {
        FeedCursor::Text(s.to_string())
    }
}

impl From<String> for FeedCursor {
    fn from(s: String) -> Self {
        FeedCursor::Text(s)
    }
}

/// One enriched change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Document identifier (package name for npm)
    pub id: String,

    /// Sequence at which the change was recorded
    pub sequence: FeedCursor,

    /// Revision ids listed by the feed, in server order
    pub revisions: Vec<String>,

    /// Whether the change was a deletion
    pub deleted: bool,

    /// Full document, present only after successful enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
}

/// One page of the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePage {
    /// Where the next page starts
    pub cursor: FeedCursor,

    /// Changes remaining after this page, when the server reports it
    pub pending_count: Option<u64>,

    /// Enriched records in server order
    pub records: Vec<ChangeRecord>,
}

impl ChangePage {
    /// Check if the page carried no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Raw `_changes` response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub results: Vec<RawChange>,

    pub last_seq: Option<FeedCursor>,

    #[serde(default)]
    pub pending: Option<u64>,
}

/// Raw entry of the `results` array
#[derive(Debug, Clone, Deserialize)]
pub struct RawChange {
    #[serde(default)]
    pub id: Option<String>,

    pub seq: FeedCursor,

    #[serde(default)]
    pub changes: Vec<RevisionRef>,

    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevisionRef {
    pub rev: String,
}

impl RawChange {
    /// Identifier usable for enrichment, `None` when absent or empty
    pub fn usable_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Convert into a record, attaching the enriched document
    pub fn into_record(self, document: Option<Value>) -> ChangeRecord {
        ChangeRecord {
            id: self.id.unwrap_or_default(),
            sequence: self.seq,
            revisions: self.changes.into_iter().map(|c| c.rev).collect(),
            deleted: self.deleted,
            document,
        }
    }
}
