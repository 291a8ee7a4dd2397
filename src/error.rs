//! Error types for the managed resource metrics exporter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the exporter
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON conversion error
    #[error("JSON conversion error: {0}")]
    Json(#[from] serde_json::Error),

    /// Self-instrumentation registry error
    #[error("Prometheus registry error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Field path could not be parsed
    #[error("Invalid field path '{path}': {reason}")]
    InvalidFieldPath { path: String, reason: String },

    /// Field path did not resolve against an object
    #[error("No such field: {0}")]
    FieldNotFound(String),

    /// The watch resource version is too old and a relist is required
    #[error("Watch expired at resource version {resource_version}")]
    WatchExpired { resource_version: String },

    /// Watch stream error
    #[error("Watch error: {0}")]
    Watch(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if recovering from this error needs a full relist.
    pub fn requires_relist(&self) -> bool {
        matches!(self, Error::WatchExpired { .. })
    }
}
