//! Registration and serving
//!
//! [`MetricsRegistry`] holds the live stores; [`ManagedMetricsHandler`] is
//! the entry point that creates them and renders them for scrapes.

pub mod managed;
pub mod registry;

pub use managed::{series_name, ManagedMetricsHandler};
pub use registry::MetricsRegistry;
