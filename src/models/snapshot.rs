//! Snapshot envelope
//!
//! A snapshot is one JSON object mapping each collection name to
//! `{"count": N, "data": [...]}` plus a `_metadata` object:
//!
//! ```json
//! {
//!   "Center": {"count": 2, "data": [{...}, {...}]},
//!   "_metadata": {"backup_time": "20250101_020000", "total_models": 1, ...}
//! }
//! ```
//!
//! Parsing is all-or-nothing: a snapshot that fails any structural check is
//! rejected as corrupt before a single record is handed to the store.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::record::Record;
use crate::error::{VaultError, VaultResult};

/// Timestamp layout used in metadata and artifact names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current envelope version
pub const FORMAT_VERSION: u32 = 1;

/// Reserved top-level key holding the metadata
pub const METADATA_KEY: &str = "_metadata";

/// Name for a data snapshot taken at `at`
pub fn snapshot_filename(at: &DateTime<Utc>, compressed: bool) -> String {
    let ext = if compressed { "json.gz" } else { "json" };
    format!("backup_{}.{}", at.format(TIMESTAMP_FORMAT), ext)
}

/// Name for the companion media archive taken at `at`
pub fn media_filename(at: &DateTime<Utc>) -> String {
    format!("media_{}.tar.gz", at.format(TIMESTAMP_FORMAT))
}

/// Creation time encoded in an artifact name (`backup_…` or `media_…`)
pub fn artifact_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let rest = name
        .strip_prefix("backup_")
        .or_else(|| name.strip_prefix("media_"))?;
    let stamp = rest.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Envelope metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(alias = "backupTime")]
    pub backup_time: String,

    #[serde(default = "default_format_version", alias = "formatVersion")]
    pub format_version: u32,

    /// Number of collections in the envelope
    #[serde(default, alias = "totalModels")]
    pub total_models: usize,

    #[serde(default = "default_backup_format", alias = "backupFormat")]
    pub backup_format: String,

    #[serde(default, alias = "storageType")]
    pub storage_type: String,

    #[serde(default, alias = "includesMedia")]
    pub includes_media: bool,
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

fn default_backup_format() -> String {
    "json".to_string()
}

impl SnapshotMetadata {
    /// Parsed `backup_time`, if well formed
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.backup_time, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// One collection inside the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    pub count: usize,
    pub data: Vec<Record>,
}

/// A parsed or freshly built snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub collections: BTreeMap<String, CollectionSnapshot>,
}

impl Snapshot {
    /// Start an empty snapshot
    pub fn new(created_at: DateTime<Utc>, storage_type: &str, includes_media: bool) -> Self {
        Self {
            metadata: SnapshotMetadata {
                backup_time: created_at.format(TIMESTAMP_FORMAT).to_string(),
                format_version: FORMAT_VERSION,
                total_models: 0,
                backup_format: default_backup_format(),
                storage_type: storage_type.to_string(),
                includes_media,
            },
            collections: BTreeMap::new(),
        }
    }

    /// Add a collection; `count` is taken from the records
    pub fn insert_collection(&mut self, name: impl Into<String>, data: Vec<Record>) {
        let count = data.len();
        self.collections
            .insert(name.into(), CollectionSnapshot { count, data });
        self.metadata.total_models = self.collections.len();
    }

    /// Per-collection record counts
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.collections
            .iter()
            .map(|(name, c)| (name.clone(), c.count))
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.collections.values().map(|c| c.count).sum()
    }

    /// Serialize to pretty-printed UTF-8 JSON
    pub fn to_json_bytes(&self) -> VaultResult<Vec<u8>> {
        let mut root = Map::new();
        for (name, collection) in &self.collections {
            root.insert(name.clone(), serde_json::to_value(collection)?);
        }
        root.insert(
            METADATA_KEY.to_string(),
            serde_json::to_value(&self.metadata)?,
        );
        Ok(serde_json::to_vec_pretty(&Value::Object(root))?)
    }

    /// Parse and validate an envelope
    pub fn from_json_bytes(bytes: &[u8]) -> VaultResult<Self> {
        let root: Value = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::SnapshotCorrupt(format!("not valid JSON: {}", e)))?;

        let Value::Object(mut root) = root else {
            return Err(VaultError::SnapshotCorrupt(
                "top level is not an object".into(),
            ));
        };

        let metadata = root
            .remove(METADATA_KEY)
            .ok_or_else(|| VaultError::SnapshotCorrupt("missing _metadata".into()))?;
        let metadata: SnapshotMetadata = serde_json::from_value(metadata)
            .map_err(|e| VaultError::SnapshotCorrupt(format!("invalid _metadata: {}", e)))?;

        let mut collections = BTreeMap::new();
        for (name, value) in root {
            collections.insert(name.clone(), parse_collection(&name, value)?);
        }

        Ok(Self {
            metadata,
            collections,
        })
    }
}

fn parse_collection(name: &str, value: Value) -> VaultResult<CollectionSnapshot> {
    let Value::Object(mut body) = value else {
        return Err(VaultError::SnapshotCorrupt(format!(
            "collection {} is not an object",
            name
        )));
    };

    let Some(Value::Array(items)) = body.remove("data") else {
        return Err(VaultError::SnapshotCorrupt(format!(
            "collection {} has no data array",
            name
        )));
    };

    let data = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(record) => Ok(record),
            _ => Err(VaultError::SnapshotCorrupt(format!(
                "collection {} entry {} is not an object",
                name, i
            ))),
        })
        .collect::<VaultResult<Vec<_>>>()?;

    let count = match body.get("count") {
        None => data.len(),
        Some(v) => v.as_u64().map(|n| n as usize).ok_or_else(|| {
            VaultError::SnapshotCorrupt(format!("collection {} has a non-numeric count", name))
        })?,
    };

    if count != data.len() {
        return Err(VaultError::SnapshotCorrupt(format!(
            "collection {} declares {} records but holds {}",
            name,
            count,
            data.len()
        )));
    }

    Ok(CollectionSnapshot { count, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 2, 0, 0).unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filenames() {
        assert_eq!(snapshot_filename(&at(), true), "backup_20250115_020000.json.gz");
        assert_eq!(snapshot_filename(&at(), false), "backup_20250115_020000.json");
        assert_eq!(media_filename(&at()), "media_20250115_020000.tar.gz");
    }

    #[test]
    fn test_artifact_timestamp() {
        assert_eq!(
            artifact_timestamp("backup_20250115_020000.json.gz"),
            Some(at())
        );
        assert_eq!(artifact_timestamp("media_20250115_020000.tar.gz"), Some(at()));
        assert_eq!(artifact_timestamp("notes.txt"), None);
        assert_eq!(artifact_timestamp("backup_2025.json"), None);
    }

    #[test]
    fn test_envelope_layout() {
        let mut snapshot = Snapshot::new(at(), "local", false);
        snapshot.insert_collection("A", vec![record(json!({"name": "x"}))]);
        snapshot.insert_collection("B", vec![]);

        let value: Value = serde_json::from_slice(&snapshot.to_json_bytes().unwrap()).unwrap();
        assert_eq!(value["A"]["count"], 1);
        assert_eq!(value["B"]["count"], 0);
        assert_eq!(value["_metadata"]["backup_time"], "20250115_020000");
        assert_eq!(value["_metadata"]["total_models"], 2);
        assert_eq!(value["_metadata"]["storage_type"], "local");
    }

    #[test]
    fn test_parse_preserves_records() {
        let mut snapshot = Snapshot::new(at(), "s3", true);
        snapshot.insert_collection(
            "Center",
            vec![record(json!({"name": "x", "latitude": 37.5, "tags": ["a"], "open": true}))],
        );

        let parsed = Snapshot::from_json_bytes(&snapshot.to_json_bytes().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.metadata.created_at(), Some(at()));
    }

    #[test]
    fn test_parse_camel_case_metadata() {
        let bytes = br#"{"A": {"count": 0, "data": []},
            "_metadata": {"backupTime": "20250115_020000", "totalModels": 1,
                "storageType": "github"}}"#;
        let parsed = Snapshot::from_json_bytes(bytes).unwrap();
        assert_eq!(parsed.metadata.storage_type, "github");
        assert_eq!(parsed.metadata.total_models, 1);
    }

    #[test]
    fn test_missing_metadata_is_corrupt() {
        let err = Snapshot::from_json_bytes(br#"{"A": {"count": 0, "data": []}}"#).unwrap_err();
        assert!(matches!(err, VaultError::SnapshotCorrupt(_)));
    }

    #[test]
    fn test_non_array_data_is_corrupt() {
        let bytes = br#"{"A": {"count": 1, "data": {}},
            "_metadata": {"backup_time": "20250115_020000"}}"#;
        assert!(matches!(
            Snapshot::from_json_bytes(bytes),
            Err(VaultError::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let bytes = br#"{"A": {"count": 3, "data": [{}]},
            "_metadata": {"backup_time": "20250115_020000"}}"#;
        assert!(matches!(
            Snapshot::from_json_bytes(bytes),
            Err(VaultError::SnapshotCorrupt(_))
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        assert!(matches!(
            Snapshot::from_json_bytes(b"\x00\x01not json"),
            Err(VaultError::SnapshotCorrupt(_))
        ));
    }
}
