//! Status Projector
//!
//! Reads the Crossplane `Ready` and `Synced` conditions out of an object's
//! `status` block. Every missing piece degrades to "unknown" with an epoch
//! transition time; projection never fails. Conditions are read field by
//! field, so a malformed entry or sibling field only loses itself.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::object::{fieldpath, FieldPath, ObservedObject};

/// Condition type reporting whether a resource is usable.
pub const TYPE_READY: &str = "Ready";

/// Condition type reporting whether a resource is in sync with its provider.
pub const TYPE_SYNCED: &str = "Synced";

/// Tri-state condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    /// Exactly `True` and `False` are recognised; anything else is unknown.
    pub fn parse(status: &str) -> Self {
        match status {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }

    /// Gauge value: True=1, False=0, other=-1.
    pub fn value(self) -> f64 {
        match self {
            ConditionStatus::True => 1.0,
            ConditionStatus::False => 0.0,
            ConditionStatus::Unknown => -1.0,
        }
    }
}

/// A single status condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    pub condition_type: String,
    pub status: String,
    pub last_transition_time: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl Condition {
    /// Read one entry of `status.conditions`. Non-string fields count as
    /// absent.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            condition_type: field("type").unwrap_or_default(),
            status: field("status").unwrap_or_default(),
            last_transition_time: field("lastTransitionTime"),
            reason: field("reason"),
            message: field("message"),
        }
    }

    pub fn status(&self) -> ConditionStatus {
        ConditionStatus::parse(&self.status)
    }

    /// Last transition time, epoch when unset or unparseable.
    pub fn transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// The conditions of a Crossplane managed resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionedStatus {
    pub conditions: Vec<Condition>,
}

impl ConditionedStatus {
    /// Read `status.conditions`, empty if absent or not a list. Entries that
    /// are not objects are skipped.
    pub fn from_object(obj: &ObservedObject) -> Self {
        static CONDITIONS: OnceLock<Option<FieldPath>> = OnceLock::new();
        let conditions = CONDITIONS
            .get_or_init(|| FieldPath::parse("status.conditions").ok())
            .as_ref()
            .and_then(|path| fieldpath::get_value(obj.as_value(), path))
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.is_object())
                    .map(Condition::from_value)
                    .collect()
            })
            .unwrap_or_default();
        Self { conditions }
    }

    /// The first condition of the given type.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// Gauge value of the named condition, -1 if it is absent.
pub fn condition_value(status: &ConditionedStatus, condition_type: &str) -> f64 {
    status
        .condition(condition_type)
        .map(Condition::status)
        .unwrap_or(ConditionStatus::Unknown)
        .value()
}

fn condition_time(status: &ConditionedStatus, condition_type: &str) -> DateTime<Utc> {
    status
        .condition(condition_type)
        .map(Condition::transition_time)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Ready/Synced summary of one object.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossplaneStatus {
    pub ready: f64,
    pub synced: f64,
    pub ready_time: DateTime<Utc>,
    pub synced_time: DateTime<Utc>,
}

impl CrossplaneStatus {
    pub fn from_object(obj: &ObservedObject) -> Self {
        Self::from_status(&ConditionedStatus::from_object(obj))
    }

    pub fn from_status(status: &ConditionedStatus) -> Self {
        Self {
            ready: condition_value(status, TYPE_READY),
            synced: condition_value(status, TYPE_SYNCED),
            ready_time: condition_time(status, TYPE_READY),
            synced_time: condition_time(status, TYPE_SYNCED),
        }
    }
}

impl Default for CrossplaneStatus {
    fn default() -> Self {
        Self::from_status(&ConditionedStatus::default())
    }
}
