//! Exporter configuration
//!
//! The YAML file listing which resource types to export and how their
//! `_info` family is projected.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::GroupVersionResource;
use crate::error::{Error, Result};
use crate::handler::series_name;
use crate::metrics::builder::validate_info_mappings;
use crate::metrics::{valid_label, InfoMapping};
use crate::sync::SyncConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterConfig {
    /// Periodic relist in seconds; overrides the command line when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resync_seconds: Option<u64>,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// One exported resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    /// Base metric name
    pub name: String,

    #[serde(default)]
    pub group: String,

    pub version: String,

    /// Plural resource name, e.g. `buckets`
    pub resource: String,

    /// Empty watches every namespace
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub info_mappings: Vec<InfoMappingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoMappingConfig {
    pub field_path: String,
    pub label: String,
}

impl ResourceConfig {
    pub fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource::new(&self.group, &self.version, &self.resource)
    }

    pub fn series_name(&self) -> String {
        series_name(&self.name, &self.namespace)
    }

    /// Parsed info mappings. Fails on the first bad field path or label.
    pub fn info_mappings(&self) -> Result<Vec<InfoMapping>> {
        self.info_mappings
            .iter()
            .map(|m| InfoMapping::new(&m.field_path, &m.label))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::Config(format!("resource '{}': {}", self.name, reason));

        if self.name.is_empty() {
            return Err(Error::Config("resource name must not be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(invalid("version must not be empty"));
        }
        if self.resource.is_empty() {
            return Err(invalid("resource must not be empty"));
        }
        if valid_label(&self.name).is_empty() {
            return Err(invalid("name has no valid metric name characters"));
        }

        let scoped = |e: Error| match e {
            Error::Config(reason) => invalid(&reason),
            other => other,
        };
        let mappings = self.info_mappings().map_err(scoped)?;
        validate_info_mappings(&mappings).map_err(scoped)?;
        Ok(())
    }
}

impl ExporterConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        let mut series = HashSet::new();
        for resource in &self.resources {
            resource.validate()?;
            let name = resource.series_name();
            if !series.insert(name.clone()) {
                return Err(Error::Config(format!("duplicate series name '{}'", name)));
            }
        }
        Ok(())
    }

    /// Synchronizer settings, with the file's resync period taking priority
    /// over `default_resync_seconds`.
    pub fn sync_config(&self, default_resync_seconds: u64) -> SyncConfig {
        SyncConfig {
            resync_period: Duration::from_secs(
                self.resync_seconds.unwrap_or(default_resync_seconds),
            ),
            ..SyncConfig::default()
        }
    }
}
