//! HTTP transport for the change feed
//!
//! This module provides the single place where requests hit the network. Each
//! call runs the full retry loop from [`super::retry`]; callers only ever see
//! the final success, a fatal error, or the last error once the retry deadline
//! has passed.
//!
//! The keep-alive pool is owned by the transport instance. Concurrency is
//! bounded by a semaphore so enrichment fan-out cannot open more sockets than
//! configured.

use crate::config::{RetryConfig, TransportConfig};
use crate::error::FeedError;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING,
};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::decoder::{decode_json, is_gzip};
use super::retry::RetryManager;

/// HTTP transport with retry, per-attempt timeout and bounded concurrency
///
/// Features:
/// - Keep-alive connection pool private to this instance
/// - Global concurrent request limiting via semaphore
/// - Transparent gzip decoding with streaming JSON parsing
/// - Status code mapping into [`FeedError`]
#[derive(Debug)]
pub struct FeedTransport {
    client: Client,
    semaphore: Arc<Semaphore>,
    headers: HeaderMap,
    retry: RetryManager,
    config: TransportConfig,
}

impl FeedTransport {
    /// Create a new transport
    pub fn new(config: TransportConfig, retry: RetryConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_concurrent)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .tcp_keepalive(Duration::from_secs(config.pool_idle_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, config, retry))
    }

    /// Create a transport around a custom reqwest Client
    pub fn with_client(client: Client, config: TransportConfig, retry: RetryConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            headers,
            retry: RetryManager::new(retry),
            config,
        }
    }

    /// Add a header sent with every request (e.g. a replication opt-in)
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, FeedError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FeedError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FeedError::InvalidRequest(format!("header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Issue a request and decode the JSON response
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, FeedError> {
        let url = Url::parse(url)
            .map_err(|e| FeedError::InvalidRequest(format!("{}: {}", url, e)))?;
        self.request_url(method, url, body).await
    }

    /// Perform a GET request
    pub async fn get(&self, url: Url) -> Result<Value, FeedError> {
        self.request_url(Method::GET, url, None).await
    }

    /// Issue a request against an already parsed URL
    pub async fn request_url(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, FeedError> {
        self.retry
            .execute(|| self.attempt(method.clone(), url.clone(), body))
            .await
    }

    /// One attempt: wait for a slot, then send and decode under the attempt timeout
    async fn attempt(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, FeedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FeedError::Network("transport closed".to_string()))?;

        let timeout = self.retry.config().attempt_timeout();
        // On timeout the in-flight future is dropped, which drops the response
        // body and closes its connection instead of returning it to the pool.
        match tokio::time::timeout(timeout, self.send_and_decode(&method, &url, body)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = %method,
                    url = %url,
                    timeout_ms = timeout.as_millis() as u64,
                    "Attempt timed out"
                );
                Err(FeedError::AttemptTimeout(timeout.as_millis() as u64))
            }
        }
    }

    async fn send_and_decode(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Value, FeedError> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(self.headers.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_server_error() {
            warn!(method = %method, url = %url, status = status.as_u16(), "Server error");
            return Err(FeedError::ServerError(status.as_u16()));
        }
        if status.is_client_error() {
            if status.as_u16() == 404 {
                debug!(method = %method, url = %url, status = 404, "Resource not found");
            } else {
                warn!(method = %method, url = %url, status = status.as_u16(), "Client error");
            }
            return Err(FeedError::Client(status.as_u16()));
        }
        if status.is_informational() {
            warn!(method = %method, url = %url, status = status.as_u16(), "No final status");
            return Err(FeedError::MissingStatus);
        }

        debug!(method = %method, url = %url, status = status.as_u16(), "Request completed");

        let gzip = is_gzip(response.headers());
        decode_json(response.bytes_stream(), gzip).await
    }

    /// Get current configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Get number of available permits (concurrent request slots)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}
