//! Change feed client
//!
//! Owns the cursor protocol of a CouchDB-style `_changes` endpoint:
//!
//! - `GET {base}` returns the database summary
//! - `GET {base}/_changes?limit={n}&since={cursor}` returns one page
//! - `GET {registry}/{id}` fetches the full document for one change
//!
//! Every page is enriched before it is returned. Deleted and id-less changes
//! are dropped, documents that 404 are dropped, and any other enrichment
//! failure fails the whole page so the caller can retry it with the same
//! cursor.

use std::sync::Arc;

use futures::future::try_join_all;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Config, FeedConfig};
use crate::error::FeedError;
use crate::models::{
    ChangePage, ChangeRecord, ChangesResponse, DatabaseSummary, FeedCursor, RawChange,
};

use super::http_client::FeedTransport;

/// Client for one remote change feed
#[derive(Debug, Clone)]
pub struct ChangeFeedClient {
    transport: Arc<FeedTransport>,
    base_url: Url,
    changes_url: Url,
    registry_url: Url,
    page_size: u32,
}

impl ChangeFeedClient {
    /// Create a client on top of an existing transport
    pub fn new(transport: Arc<FeedTransport>, config: &FeedConfig) -> Result<Self, FeedError> {
        let base_url = parse_url(&config.base_url)?;
        let changes_url = append_path(&base_url, &config.changes_path)?;
        let registry_url = parse_url(&config.registry_url)?;

        Ok(Self {
            transport,
            base_url,
            changes_url,
            registry_url,
            page_size: config.page_size,
        })
    }

    /// Build the transport and client from application configuration
    pub fn from_config(config: &Config) -> Result<Self, FeedError> {
        let mut transport = FeedTransport::new(config.transport.clone(), config.retry.clone())?;
        if !config.feed.opt_in_header_name.is_empty() {
            transport = transport.with_header(
                &config.feed.opt_in_header_name,
                &config.feed.opt_in_header_value,
            )?;
        }
        Self::new(Arc::new(transport), &config.feed)
    }

    /// Fetch the database summary
    pub async fn summary(&self) -> Result<DatabaseSummary, FeedError> {
        let value = self.transport.get(self.base_url.clone()).await?;
        from_body(value, "database summary")
    }

    /// Fetch the page starting at `cursor` with the configured page size
    pub async fn next_page(&self, cursor: &FeedCursor) -> Result<ChangePage, FeedError> {
        self.next_page_with_limit(cursor, self.page_size).await
    }

    /// Fetch the page starting at `cursor` with at most `limit` raw changes
    ///
    /// The returned cursor is the server's `last_seq`, verbatim.
    pub async fn next_page_with_limit(
        &self,
        cursor: &FeedCursor,
        limit: u32,
    ) -> Result<ChangePage, FeedError> {
        let url = self.page_url(cursor, limit);
        let value = self.transport.get(url).await?;
        let response: ChangesResponse = from_body(value, "changes page")?;

        let next = response
            .last_seq
            .ok_or_else(|| FeedError::InvalidData("changes page has no last_seq".to_string()))?;
        let received = response.results.len();
        let records = self.enrich_all(response.results).await?;

        info!(
            since = %cursor,
            cursor = %next,
            received = received,
            kept = records.len(),
            pending = ?response.pending,
            "Fetched change page"
        );

        Ok(ChangePage {
            cursor: next,
            pending_count: response.pending,
            records,
        })
    }

    /// Enrich every change concurrently, keeping server order
    ///
    /// The first non-404 failure drops the remaining in-flight fetches.
    async fn enrich_all(&self, changes: Vec<RawChange>) -> Result<Vec<ChangeRecord>, FeedError> {
        let enriched = try_join_all(changes.into_iter().map(|change| self.enrich(change))).await?;
        Ok(enriched.into_iter().flatten().collect())
    }

    async fn enrich(&self, change: RawChange) -> Result<Option<ChangeRecord>, FeedError> {
        if change.deleted {
            debug!(id = ?change.id, seq = %change.seq, "Skipping deleted change");
            return Ok(None);
        }
        let id = match change.usable_id() {
            Some(id) => id.to_string(),
            None => {
                warn!(seq = %change.seq, "Skipping change without id");
                return Ok(None);
            }
        };

        let url = self.document_url(&id)?;
        match self.transport.get(url).await {
            Ok(document) => Ok(Some(change.into_record(Some(document)))),
            Err(err) if err.is_not_found() => {
                debug!(id = %id, seq = %change.seq, "Document already removed upstream");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn page_url(&self, cursor: &FeedCursor, limit: u32) -> Url {
        let mut url = self.changes_url.clone();
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("since", &cursor.to_string());
        url
    }

    /// Document URL with the id as a single percent-encoded path segment
    fn document_url(&self, id: &str) -> Result<Url, FeedError> {
        let mut url = self.registry_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FeedError::InvalidRequest(format!("{} cannot be a base", self.registry_url))
            })?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Configured page size
    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

fn parse_url(raw: &str) -> Result<Url, FeedError> {
    Url::parse(raw).map_err(|e| FeedError::InvalidRequest(format!("{}: {}", raw, e)))
}

fn append_path(base: &Url, path: &str) -> Result<Url, FeedError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| FeedError::InvalidRequest(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

fn from_body<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, FeedError> {
    serde_json::from_value(value)
        .map_err(|e| FeedError::InvalidData(format!("malformed {}: {}", what, e)))
}
