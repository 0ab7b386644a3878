//! Destinations for enriched change records

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::SinkError;
use crate::models::ChangeRecord;

/// Consumer of enriched change records
///
/// Records arrive in feed order. An error stops the current run before the
/// page's cursor is saved, so the page is delivered again on the next run.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn emit(&self, record: &ChangeRecord) -> Result<(), SinkError>;
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Take the writer back, e.g. to inspect a buffer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> ChangeSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, record: &ChangeRecord) -> Result<(), SinkError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| SinkError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Logs each record instead of forwarding it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ChangeSink for LogSink {
    async fn emit(&self, record: &ChangeRecord) -> Result<(), SinkError> {
        info!(
            id = %record.id,
            sequence = %record.sequence,
            revisions = record.revisions.len(),
            "Change received"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedCursor;
    use serde_json::{json, Value};

    fn record(id: &str, seq: u64) -> ChangeRecord {
        ChangeRecord {
            id: id.to_string(),
            sequence: FeedCursor::Number(seq),
            revisions: vec!["1-a".to_string()],
            deleted: false,
            document: Some(json!({ "name": id })),
        }
    }

    #[tokio::test]
    async fn test_json_lines_one_object_per_line() {
        let sink = JsonLinesSink::new(Vec::new());

        sink.emit(&record("left-pad", 1)).await.unwrap();
        sink.emit(&record("@types/node", 2)).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["id"], "left-pad");
        assert_eq!(second["id"], "@types/node");
        assert_eq!(second["document"]["name"], "@types/node");
    }

    #[tokio::test]
    async fn test_log_sink_accepts_everything() {
        assert!(LogSink.emit(&record("a", 1)).await.is_ok());
    }
}
