//! Streaming JSON response decoder
//!
//! Response bodies are forwarded chunk by chunk to a blocking parser task over
//! a bounded channel, so parsing starts with the first chunk and the body is
//! never held in memory as a whole. Gzip bodies are inflated on the parser side
//! before `serde_json` sees them.
//!
//! Dropping the returned future drops the body stream and the channel sender;
//! the parser then sees a truncated input and its result is discarded.

use crate::error::FeedError;
use bytes::Bytes;
use flate2::bufread::MultiGzDecoder;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_ENCODING};
use serde_json::Value;
use std::io::{BufReader, Read};
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Chunks buffered between the network side and the parser
const CHANNEL_CAPACITY: usize = 16;

/// Check whether a response declares a gzip content encoding
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .any(|enc| enc.eq_ignore_ascii_case("gzip") || enc.eq_ignore_ascii_case("x-gzip"))
        })
        .unwrap_or(false)
}

/// Decode a byte stream into a single JSON value
///
/// A stream error takes precedence over whatever the parser reports for the
/// truncated input it was left with.
pub async fn decode_json<S, E>(body: S, gzip: bool) -> Result<Value, FeedError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<FeedError>,
{
    let mut body = std::pin::pin!(body);
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(CHANNEL_CAPACITY);
    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let reader = SyncIoBridge::new(StreamReader::new(Box::pin(chunks)));
    let parser = tokio::task::spawn_blocking(move || parse_reader(reader, gzip));

    let mut stream_error = None;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                // The parser stops reading once it fails; nothing left to feed
                if tx.send(Ok(bytes)).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                stream_error = Some(err.into());
                break;
            }
        }
    }
    drop(tx);

    let parsed = parser
        .await
        .map_err(|e| FeedError::Parse(format!("decoder task failed: {}", e)))?;

    match stream_error {
        Some(err) => Err(err),
        None => parsed,
    }
}

fn parse_reader<R: Read>(reader: R, gzip: bool) -> Result<Value, FeedError> {
    let input = BufReader::new(reader);
    if gzip {
        let inflated = BufReader::new(MultiGzDecoder::new(input));
        serde_json::from_reader(inflated).map_err(|e| {
            if e.is_io() {
                FeedError::Decompress(e.to_string())
            } else {
                FeedError::Parse(e.to_string())
            }
        })
    } else {
        serde_json::from_reader(input).map_err(|e| {
            if e.is_io() {
                FeedError::Network(e.to_string())
            } else {
                FeedError::Parse(e.to_string())
            }
        })
    }
}
