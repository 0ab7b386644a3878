//! Application error types for registry-follower
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::config::ConfigError;

/// Change feed and transport errors
///
/// Every failure the transport can observe is mapped to one of these variants
/// so the retry engine can decide whether another attempt is worthwhile.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// 4xx response; the request itself is wrong and retrying cannot help
    #[error("Client error: HTTP {0}")]
    Client(u16),

    /// 5xx response
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Connection reset by peer
    #[error("Connection reset")]
    ConnectionReset,

    /// Response carried no usable status code
    #[error("Response is missing a status code")]
    MissingStatus,

    /// A single attempt exceeded its own timeout
    #[error("Attempt timed out after {0} ms")]
    AttemptTimeout(u64),

    /// Other socket-level failure (refused, DNS, broken body stream)
    #[error("Network error: {0}")]
    Network(String),

    /// Body was not valid JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Body claimed gzip but could not be inflated
    #[error("Decompression error: {0}")]
    Decompress(String),

    /// Request could not be built (bad URL, bad header)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Body parsed but does not have the shape the protocol requires
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl FeedError {
    /// Returns true for a 404 response
    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedError::Client(404))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            return FeedError::InvalidRequest(err.to_string());
        }
        if is_connection_reset(&err) {
            return FeedError::ConnectionReset;
        }
        FeedError::Network(err.to_string())
    }
}

/// Walk the source chain looking for an `io::ErrorKind::ConnectionReset`
fn is_connection_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io_err) = current.downcast_ref::<std::io::Error>() {
            if io_err.kind() == std::io::ErrorKind::ConnectionReset {
                return true;
            }
        }
        source = current.source();
    }
    false
}

/// Cursor persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored cursor could not be encoded or decoded
    #[error("Cursor serialization error: {0}")]
    Serialization(String),
}

/// Event sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// IO error while writing records
    #[error("Sink IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("Sink serialization error: {0}")]
    Serialization(String),

    /// Downstream consumer rejected the record
    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Application-level error type
///
/// This is the main error type used throughout the application.
/// It aggregates all domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Feed error
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Cursor store error
    #[error("Cursor store error: {0}")]
    Store(#[from] StoreError),

    /// Sink error
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Trait for determining if an error is retryable
pub trait RetryableError {
    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool;
}

impl RetryableError for FeedError {
    fn is_retryable(&self) -> bool {
        match self {
            // Retryable errors
            FeedError::ServerError(_) => true,
            FeedError::ConnectionReset => true,
            FeedError::MissingStatus => true,
            FeedError::AttemptTimeout(_) => true,
            FeedError::Network(_) => true,

            // Non-retryable errors
            FeedError::Client(_) => false,
            FeedError::Parse(_) => false,
            FeedError::Decompress(_) => false,
            FeedError::InvalidRequest(_) => false,
            FeedError::InvalidData(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_messages() {
        assert_eq!(FeedError::Client(404).to_string(), "Client error: HTTP 404");
        assert_eq!(
            FeedError::ServerError(503).to_string(),
            "Server error: HTTP 503"
        );
        assert_eq!(
            FeedError::AttemptTimeout(5000).to_string(),
            "Attempt timed out after 5000 ms"
        );
        assert_eq!(
            FeedError::Parse("expected value".to_string()).to_string(),
            "Parse error: expected value"
        );
    }

    #[test]
    fn test_feed_error_retryable() {
        // Retryable errors
        assert!(FeedError::ServerError(500).is_retryable());
        assert!(FeedError::ServerError(503).is_retryable());
        assert!(FeedError::ConnectionReset.is_retryable());
        assert!(FeedError::MissingStatus.is_retryable());
        assert!(FeedError::AttemptTimeout(5000).is_retryable());
        assert!(FeedError::Network("refused".to_string()).is_retryable());

        // Non-retryable errors
        assert!(!FeedError::Client(400).is_retryable());
        assert!(!FeedError::Client(404).is_retryable());
        assert!(!FeedError::Parse("eof".to_string()).is_retryable());
        assert!(!FeedError::Decompress("bad header".to_string()).is_retryable());
        assert!(!FeedError::InvalidData("no last_seq".to_string()).is_retryable());
    }

    #[test]
    fn test_is_not_found() {
        assert!(FeedError::Client(404).is_not_found());
        assert!(!FeedError::Client(403).is_not_found());
        assert!(!FeedError::ServerError(500).is_not_found());
    }

    #[test]
    fn test_connection_reset_detected_in_source_chain() {
        #[derive(Debug, Error)]
        #[error("wrapper")]
        struct Wrapper(#[source] std::io::Error);

        let err = Wrapper(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(is_connection_reset(&err));

        let err = Wrapper(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(!is_connection_reset(&err));
    }

    #[test]
    fn test_app_error_from_feed_error() {
        let app_err: AppError = FeedError::ConnectionReset.into();

        match app_err {
            AppError::Feed(FeedError::ConnectionReset) => (),
            _ => panic!("Expected AppError::Feed(FeedError::ConnectionReset)"),
        }
    }

    #[test]
    fn test_app_error_display() {
        let app_err = AppError::Feed(FeedError::ServerError(502));
        assert_eq!(app_err.to_string(), "Feed error: Server error: HTTP 502");

        let app_err = AppError::Sink(SinkError::Rejected("duplicate".to_string()));
        assert_eq!(app_err.to_string(), "Sink error: Record rejected: duplicate");
    }

    #[test]
    fn test_store_error_from_sqlite() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("feed".to_string());
        let store_err: StoreError = sqlite_err.into();

        match store_err {
            StoreError::Sqlite(_) => (),
            _ => panic!("Expected StoreError::Sqlite"),
        }
    }

    #[test]
    fn test_sink_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let sink_err: SinkError = io_err.into();

        match sink_err {
            SinkError::Io(_) => (),
            _ => panic!("Expected SinkError::Io"),
        }
    }
}
