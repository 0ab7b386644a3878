//! Database summary returned by the feed root

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::change::FeedCursor;

/// Descriptive metadata about the source database
///
/// Fields are optional because replication front-ends expose different
/// subsets of the CouchDB database info document. Unrecognised fields are
/// kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSummary {
    pub db_name: Option<String>,

    pub doc_count: Option<u64>,

    pub doc_del_count: Option<u64>,

    pub update_seq: Option<FeedCursor>,

    pub sizes: Option<DatabaseSizes>,

    /// Legacy CouchDB 1.x size field
    pub disk_size: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSizes {
    pub file: Option<u64>,
    pub active: Option<u64>,
    pub external: Option<u64>,
}

impl DatabaseSummary {
    /// Best available on-disk size in bytes
    pub fn size_bytes(&self) -> Option<u64> {
        self.sizes
            .as_ref()
            .and_then(|s| s.file)
            .or(self.disk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_couchdb_info() {
        let summary: DatabaseSummary = serde_json::from_value(json!({
            "db_name": "registry",
            "doc_count": 3500000,
            "doc_del_count": 420,
            "update_seq": 98765432,
            "sizes": {"file": 1024, "active": 900, "external": 800},
            "instance_start_time": "0"
        }))
        .unwrap();

        assert_eq!(summary.db_name.as_deref(), Some("registry"));
        assert_eq!(summary.doc_count, Some(3_500_000));
        assert_eq!(summary.update_seq, Some(FeedCursor::Number(98_765_432)));
        assert_eq!(summary.size_bytes(), Some(1024));
        assert_eq!(summary.extra.get("instance_start_time"), Some(&json!("0")));
    }

    #[test]
    fn test_legacy_disk_size_fallback() {
        let summary: DatabaseSummary =
            serde_json::from_value(json!({"db_name": "registry", "disk_size": 77})).unwrap();

        assert_eq!(summary.size_bytes(), Some(77));
        assert!(summary.doc_count.is_none());
    }
}
