use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Document field holding the saga identifier.
pub const ID_FIELD: &str = "id";

/// Document field holding the lease expiry as integer Unix seconds.
/// Present only while pessimistic locking is in use.
pub const RESERVE_UNTIL_FIELD: &str = "reserveUntil";

/// Well-known key of the persistence metadata object inside a document.
pub const METADATA_KEY: &str = "_metadata";

/// Metadata entry recording the identifier a record was known by in the
/// legacy store it was migrated from.
pub const MIGRATED_SAGA_ID_KEY: &str = "legacyMigratedId";

/// Value used by the document store to route a document.
///
/// Defaults to the saga id when the processing context does not supply one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The JSON value a document must carry at the partition-key path.
    pub fn as_json(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl From<Uuid> for PartitionKey {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Slash-separated path of the partition-key field, e.g. `/partitionKey`
/// or `/deep/down`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKeyPath(String);

impl PartitionKeyPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PartitionKeyPath {
    fn default() -> Self {
        Self("/partitionKey".to_string())
    }
}

impl fmt::Display for PartitionKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque document version (entity tag) used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single (name, value) pair a saga instance is correlated by before its
/// identifier is known.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationProperty {
    pub name: String,
    pub value: Value,
}

impl CorrelationProperty {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Canonical string rendering used for identity derivation. Strings
    /// render without quotes so `"abc"` and a raw `abc` derive the same id.
    pub fn value_as_string(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
