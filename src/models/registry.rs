//! Static collection registry
//!
//! Each backed-up collection is described by its name and the fields forming
//! its natural key. The registry is plain configuration; nothing is discovered
//! at runtime.

use serde::{Deserialize, Serialize};

use super::record::{field, key_component, NaturalKey, Record};

/// Describes one record collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Collection name as it appears in snapshots
    pub name: String,

    /// Fields forming the natural key; empty means "use id/pk"
    #[serde(default)]
    pub natural_key: Vec<String>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, natural_key: &[&str]) -> Self {
        Self {
            name: name.into(),
            natural_key: natural_key.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// The registry used when settings do not override it
    pub fn default_registry() -> Vec<CollectionDescriptor> {
        vec![
            Self::new("Center", &["name", "address"]),
            Self::new("Review", &["center", "user", "title"]),
            Self::new("ExternalReview", &["center", "url"]),
            Self::new("Therapist", &["center", "name"]),
            Self::new("CenterImage", &["center", "image"]),
        ]
    }

    /// Natural key of a record, or None when any key field is missing.
    ///
    /// Records without a key are never treated as duplicates.
    pub fn key_of(&self, record: &Record) -> Option<NaturalKey> {
        if self.natural_key.is_empty() {
            return ["id", "pk"]
                .iter()
                .find_map(|f| field(record, f).and_then(key_component))
                .map(|id| NaturalKey::new(vec![id]));
        }

        self.natural_key
            .iter()
            .map(|f| field(record, f).and_then(key_component))
            .collect::<Option<Vec<_>>>()
            .map(NaturalKey::new)
    }
}
