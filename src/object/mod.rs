//! Observed Objects
//!
//! A weakly-typed view over a remote resource instance. The exporter never
//! needs the schema of the resources it watches, so objects are kept as a
//! [`serde_json::Value`] tree and read through [`fieldpath`] lookups.

pub mod fieldpath;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use fieldpath::{FieldPath, Segment};

/// Identity of an object within a per-resource store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Build a key from an optional namespace and a name.
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self(format!("{}/{}", ns, name)),
            _ => Self(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One remote resource instance at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObservedObject(Value);

impl ObservedObject {
    /// Wrap a raw object tree.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw object tree.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn metadata(&self) -> Option<&serde_json::Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
    }

    /// `metadata.name`, or an empty string when unset.
    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    /// `metadata.namespace`, if the object carries one.
    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace").filter(|ns| !ns.is_empty())
    }

    /// `metadata.resourceVersion`, if set.
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    /// `metadata.creationTimestamp` parsed as RFC 3339.
    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata_str("creationTimestamp")
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// `metadata.labels` in key order. Non-string values are skipped.
    pub fn labels(&self) -> Vec<(&str, &str)> {
        let mut labels: Vec<(&str, &str)> = self
            .metadata()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
                    .collect()
            })
            .unwrap_or_default();
        labels.sort_unstable_by(|a, b| a.0.cmp(b.0));
        labels
    }

    /// The store key for this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }

    /// Resolve a field path to a string.
    pub fn get_string(&self, path: &FieldPath) -> Option<&str> {
        fieldpath::get_string(&self.0, path)
    }
}

impl From<Value> for ObservedObject {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
