//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use registry_follower::config::{Config, FeedConfig, RetryConfig};
use registry_follower::error::SinkError;
use registry_follower::models::ChangeRecord;
use registry_follower::sync::ChangeSink;

/// Configuration pointing at a mock server with fast retries
///
/// The feed lives under `/registry`, documents under `/docs`.
pub fn test_config(server: &MockServer) -> Config {
    Config {
        feed: FeedConfig {
            base_url: format!("{}/registry", server.uri()),
            registry_url: format!("{}/docs", server.uri()),
            page_size: 10,
            ..Default::default()
        },
        retry: RetryConfig {
            initial_backoff_ms: 5,
            deadline_ms: 2_000,
            attempt_timeout_ms: 1_000,
        },
        ..Default::default()
    }
}

/// Raw change entry as the feed serves it
pub fn change(id: &str, seq: u64) -> Value {
    json!({ "id": id, "seq": seq, "changes": [{ "rev": format!("1-{}", id) }] })
}

/// Deleted change entry
pub fn deleted_change(id: &str, seq: u64) -> Value {
    json!({ "id": id, "seq": seq, "deleted": true, "changes": [{ "rev": "2-x" }] })
}

/// `_changes` body
pub fn page_body(results: Vec<Value>, last_seq: u64, pending: u64) -> Value {
    json!({ "results": results, "last_seq": last_seq, "pending": pending })
}

/// Gzip-compress a JSON value
pub fn gzip_json(value: &Value) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&serde_json::to_vec(value).expect("serialize"))
        .expect("compress");
    encoder.finish().expect("finish gzip")
}

/// Serve a `_changes` page for the given `since`
pub async fn mount_page(server: &MockServer, since: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/registry/_changes"))
        .and(query_param("since", since))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Serve a gzip-compressed `_changes` page for the given `since`
pub async fn mount_gzip_page(server: &MockServer, since: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path("/registry/_changes"))
        .and(query_param("since", since))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .insert_header("content-type", "application/json")
                .set_body_bytes(gzip_json(&body)),
        )
        .mount(server)
        .await;
}

/// Serve a package document
pub async fn mount_document(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/docs/{}", id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "_id": id, "name": id })),
        )
        .mount(server)
        .await;
}

/// Sink that keeps every record it receives
#[derive(Default)]
pub struct CollectingSink {
    records: Mutex<Vec<ChangeRecord>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ids(&self) -> Vec<String> {
        self.records
            .lock()
            .expect("sink lock")
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn records(&self) -> Vec<ChangeRecord> {
        self.records.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl ChangeSink for CollectingSink {
    async fn emit(&self, record: &ChangeRecord) -> Result<(), SinkError> {
        self.records.lock().expect("sink lock").push(record.clone());
        Ok(())
    }
}
