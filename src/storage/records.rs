//! Record store
//!
//! The pipeline talks to the data layer only through [`RecordStore`]. Every
//! mutating call is one atomic unit: it either lands completely or leaves the
//! collection untouched.
//!
//! [`JsonRecordStore`] keeps one `<collection>.json` array per collection and
//! commits each unit with an atomic file replace before updating its cache.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use serde_json::Value;
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::models::record::{field, key_component};
use crate::models::{CollectionDescriptor, NaturalKey, Record};

use super::file_io::{read_json, write_json_atomic};

/// What one snapshot application did to a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub inserted: usize,
    /// Records whose natural key (or id) was already present
    pub skipped: usize,
    /// Records removed by clear-existing
    pub cleared: usize,
}

/// Access to persisted record collections
pub trait RecordStore: Send + Sync {
    /// All records of a collection, in insertion order
    fn fetch_all(&self, collection: &str) -> VaultResult<Vec<Record>>;

    fn count(&self, collection: &str) -> VaultResult<usize> {
        Ok(self.fetch_all(collection)?.len())
    }

    /// Natural keys currently present in a collection
    fn keys(&self, descriptor: &CollectionDescriptor) -> VaultResult<HashSet<NaturalKey>> {
        Ok(self
            .fetch_all(&descriptor.name)?
            .iter()
            .filter_map(|r| descriptor.key_of(r))
            .collect())
    }

    fn contains_key(
        &self,
        descriptor: &CollectionDescriptor,
        key: &NaturalKey,
    ) -> VaultResult<bool> {
        Ok(self.keys(descriptor)?.contains(key))
    }

    /// First record whose `field` equals `value`
    fn find_by_field(
        &self,
        collection: &str,
        name: &str,
        value: &Value,
    ) -> VaultResult<Option<Record>> {
        Ok(self
            .fetch_all(collection)?
            .into_iter()
            .find(|r| field(r, name) == Some(value)))
    }

    /// Insert one record as its own unit, assigning an `id` when absent.
    ///
    /// Fails with a validation error when the natural key already exists.
    fn insert(&self, descriptor: &CollectionDescriptor, record: Record) -> VaultResult<Record>;

    /// Clear (optionally) and bulk insert as one unit; present keys are no-ops
    fn apply_snapshot(
        &self,
        descriptor: &CollectionDescriptor,
        records: Vec<Record>,
        clear_existing: bool,
    ) -> VaultResult<ApplyOutcome>;
}

/// JSON-file backed record store
pub struct JsonRecordStore {
    data_dir: PathBuf,
    cache: RwLock<HashMap<String, Vec<Record>>>,
}

impl JsonRecordStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn collection_path(&self, collection: &str) -> VaultResult<PathBuf> {
        let valid = !collection.is_empty()
            && collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(VaultError::Validation(format!(
                "Invalid collection name: {:?}",
                collection
            )));
        }
        Ok(self.data_dir.join(format!("{}.json", collection)))
    }

    fn load_collection(&self, collection: &str) -> VaultResult<Vec<Record>> {
        {
            let cache = self.cache.read().map_err(|e| {
                VaultError::Storage(format!("Failed to acquire read lock: {}", e))
            })?;
            if let Some(records) = cache.get(collection) {
                return Ok(records.clone());
            }
        }

        let records: Vec<Record> = read_json(self.collection_path(collection)?)?;
        let mut cache = self.cache.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        Ok(cache
            .entry(collection.to_string())
            .or_insert(records)
            .clone())
    }

    /// Run one atomic unit against a collection.
    ///
    /// The closure works on a copy; the copy is persisted and only then
    /// becomes visible. An error anywhere leaves file and cache unchanged.
    fn unit<T, F>(&self, collection: &str, mutate: F) -> VaultResult<T>
    where
        F: FnOnce(&mut Vec<Record>) -> VaultResult<T>,
    {
        let path = self.collection_path(collection)?;
        let current = self.load_collection(collection)?;

        let mut cache = self.cache.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        let mut working = cache.get(collection).cloned().unwrap_or(current);

        let result = mutate(&mut working)?;
        write_json_atomic(&path, &working)?;
        cache.insert(collection.to_string(), working);

        Ok(result)
    }
}

fn record_id(record: &Record) -> Option<String> {
    record
        .get("id")
        .or_else(|| record.get("pk"))
        .and_then(key_component)
}

fn next_id(records: &[Record]) -> u64 {
    records
        .iter()
        .filter_map(|r| r.get("id").or_else(|| r.get("pk")))
        .filter_map(Value::as_u64)
        .max()
        .unwrap_or(0)
        + 1
}

impl RecordStore for JsonRecordStore {
    fn fetch_all(&self, collection: &str) -> VaultResult<Vec<Record>> {
        self.load_collection(collection)
    }

    fn insert(&self, descriptor: &CollectionDescriptor, mut record: Record) -> VaultResult<Record> {
        self.unit(&descriptor.name, |records| {
            if let Some(key) = descriptor.key_of(&record) {
                if records.iter().any(|r| descriptor.key_of(r).as_ref() == Some(&key)) {
                    return Err(VaultError::Validation(format!(
                        "{} already exists: {}",
                        descriptor.name, key
                    )));
                }
            }
            if record_id(&record).is_none() {
                record.insert("id".to_string(), Value::from(next_id(records)));
            }
            records.push(record.clone());
            Ok(record)
        })
    }

    fn apply_snapshot(
        &self,
        descriptor: &CollectionDescriptor,
        incoming: Vec<Record>,
        clear_existing: bool,
    ) -> VaultResult<ApplyOutcome> {
        let outcome = self.unit(&descriptor.name, |records| {
            let mut outcome = ApplyOutcome::default();
            if clear_existing {
                outcome.cleared = records.len();
                records.clear();
            }

            let mut keys: HashSet<NaturalKey> =
                records.iter().filter_map(|r| descriptor.key_of(r)).collect();
            let mut ids: HashSet<String> = records.iter().filter_map(record_id).collect();

            for mut record in incoming {
                let key = descriptor.key_of(&record);
                let id = record_id(&record);

                let key_taken = key.as_ref().is_some_and(|k| keys.contains(k));
                let id_taken = id.as_ref().is_some_and(|i| ids.contains(i));
                if key_taken || id_taken {
                    outcome.skipped += 1;
                    continue;
                }

                if id.is_none() {
                    let assigned = next_id(records);
                    record.insert("id".to_string(), Value::from(assigned));
                    ids.insert(assigned.to_string());
                }
                if let Some(k) = key {
                    keys.insert(k);
                }
                if let Some(i) = id {
                    ids.insert(i);
                }
                records.push(record);
                outcome.inserted += 1;
            }
            Ok(outcome)
        })?;

        debug!(
            collection = %descriptor.name,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            cleared = outcome.cleared,
            "Applied snapshot records"
        );
        Ok(outcome)
    }
}
