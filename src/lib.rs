//! Managed Metrics - Prometheus exporter for Crossplane managed resources
//!
//! Watches any number of cluster resource types and publishes, for every
//! object, a fixed set of gauge families describing its identity, labels,
//! readiness and sync state.
//!
//! # Architecture
//!
//! ```text
//! cluster API → ResourceSynchronizer (list + watch) → ManagedResourceMetrics
//!             → MetricsStore → MetricsRegistry → /metrics
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - `ResourceSource` implementations (Kubernetes, in-memory)
//! - [`config`] - Resource configuration file
//! - [`domain`] - Resource identity and the remote API port
//! - [`error`] - Error types
//! - [`handler`] - Registry and registration entry point
//! - [`metrics`] - Label sanitizing, status projection, family building, stores
//! - [`object`] - Weakly-typed observed objects and field paths
//! - [`server`] - Scrape and health HTTP servers
//! - [`sync`] - List/watch synchronizer
//! - [`telemetry`] - Exporter self-instrumentation

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod object;
pub mod server;
pub mod sync;
pub mod telemetry;

// Re-export commonly used types
pub use config::ExporterConfig;
pub use domain::{GroupVersionResource, ResourceIdentity, ResourceSource};
pub use error::{Error, Result};
pub use handler::{ManagedMetricsHandler, MetricsRegistry};
pub use metrics::{
    valid_label, CrossplaneStatus, InfoMapping, ManagedResourceMetrics, MetricsStore,
};
pub use object::{FieldPath, ObservedObject};
pub use sync::{ResourceSynchronizer, SyncConfig, SyncState};
pub use telemetry::ExporterMetrics;

/// Crate version, as reported at startup.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
