//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! The exporter depends on exactly one external system: the cluster API it
//! lists and watches. This module defines the value objects that identify a
//! watched resource type and the [`ResourceSource`] port that adapters
//! implement.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │            ResourceSource (list + watch)             │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   KubeResourceSource │ InMemoryResourceSource        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::object::ObservedObject;

// =============================================================================
// Value Objects
// =============================================================================

/// Group, version and plural resource name of a remote resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `buckets`
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// A resource type scoped to one namespace, or to the whole cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentity {
    pub gvr: GroupVersionResource,
    namespace: Option<String>,
}

impl ResourceIdentity {
    /// An empty namespace means cluster scope.
    pub fn new(gvr: GroupVersionResource, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            gvr,
            namespace: (!namespace.is_empty()).then_some(namespace),
        }
    }

    pub fn cluster_scoped(gvr: GroupVersionResource) -> Self {
        Self {
            gvr,
            namespace: None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Whether an object in `namespace` falls under this identity.
    pub fn matches_namespace(&self, namespace: Option<&str>) -> bool {
        match &self.namespace {
            None => true,
            Some(ns) => namespace == Some(ns.as_str()),
        }
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} in {}", self.gvr, ns),
            None => write!(f, "{} (all namespaces)", self.gvr),
        }
    }
}

/// Result of a full list.
#[derive(Debug, Clone, Default)]
pub struct ResourceList {
    pub items: Vec<ObservedObject>,
    /// Version to resume watching from
    pub resource_version: Option<String>,
}

/// One change observed on a watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Added(ObservedObject),
    Modified(ObservedObject),
    Deleted(ObservedObject),
    /// Progress marker carrying only a resource version
    Bookmark { resource_version: String },
}

impl ResourceEvent {
    /// The resource version this event moves the watch to.
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            ResourceEvent::Added(obj)
            | ResourceEvent::Modified(obj)
            | ResourceEvent::Deleted(obj) => obj.resource_version(),
            ResourceEvent::Bookmark { resource_version } => Some(resource_version),
        }
    }

    /// Short name used in logs and telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceEvent::Added(_) => "added",
            ResourceEvent::Modified(_) => "modified",
            ResourceEvent::Deleted(_) => "deleted",
            ResourceEvent::Bookmark { .. } => "bookmark",
        }
    }
}

/// Stream of watch events. Stream items that are errors end the watch.
pub type ResourceEventStream = BoxStream<'static, Result<ResourceEvent>>;

// =============================================================================
// Remote API Port
// =============================================================================

/// Port for listing and watching a remote resource type.
///
/// Implementations own transport concerns (authentication, timeouts,
/// connection reuse). Callers own retry policy.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// List every current object of the resource type.
    async fn list(&self, identity: &ResourceIdentity) -> Result<ResourceList>;

    /// Open a watch starting after `resource_version`.
    async fn watch(
        &self,
        identity: &ResourceIdentity,
        resource_version: &str,
    ) -> Result<ResourceEventStream>;
}
