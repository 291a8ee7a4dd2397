//! Metrics module
//!
//! Derives Prometheus metric families from observed managed resources and
//! keeps them in per-resource stores ready for exposition.

pub mod builder;
pub mod family;
pub mod label;
pub mod status;
pub mod store;

pub use builder::{InfoMapping, ManagedResourceMetrics};
pub use family::{FamilyHeader, Metric, MetricFamily, MetricType};
pub use label::valid_label;
pub use status::{ConditionStatus, ConditionedStatus, CrossplaneStatus};
pub use store::MetricsStore;
