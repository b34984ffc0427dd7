//! Opaque records and natural keys
//!
//! A record is a field-name to JSON value map. Snapshots written by older
//! tooling carry `{model, pk, fields: {...}}` objects, so field lookup falls
//! back to the nested `fields` map.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single record: field name to value
pub type Record = Map<String, Value>;

/// Look up a field, falling back to the nested `fields` object
pub fn field<'a>(record: &'a Record, name: &str) -> Option<&'a Value> {
    record.get(name).or_else(|| {
        record
            .get("fields")
            .and_then(Value::as_object)
            .and_then(|fields| fields.get(name))
    })
}

/// Render a value as a key component. Null and empty strings yield None.
pub fn key_component(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Field combination that identifies a record outside its generated id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(Vec<String>);

impl NaturalKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" / "))
    }
}
