//! Kubernetes Resource Source Adapter
//!
//! Implements the `ResourceSource` port over the dynamic Kubernetes API, so
//! any resource type can be listed and watched from its group, version and
//! plural name alone.

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, WatchEvent, WatchParams};
use kube::Client;
use tracing::{debug, instrument};

use crate::domain::ports::{
    GroupVersionResource, ResourceEvent, ResourceEventStream, ResourceIdentity, ResourceList,
    ResourceSource,
};
use crate::error::{Error, Result};
use crate::object::ObservedObject;

/// HTTP status the API server uses for an expired resource version.
const GONE: u16 = 410;

/// Server-side watch timeout, kept below the client's read timeout.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Dynamic-API backed resource source.
#[derive(Clone)]
pub struct KubeResourceSource {
    client: Client,
}

impl KubeResourceSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, identity: &ResourceIdentity) -> Api<DynamicObject> {
        let resource = api_resource(&identity.gvr);
        match identity.namespace() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

impl std::fmt::Debug for KubeResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceSource").finish()
    }
}

/// Describe a GVR to the dynamic API. The kind is not needed for list and
/// watch URLs, so it is left empty.
pub fn api_resource(gvr: &GroupVersionResource) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: String::new(),
        plural: gvr.resource.clone(),
    }
}

fn to_observed(obj: DynamicObject) -> Result<ObservedObject> {
    Ok(ObservedObject::new(serde_json::to_value(obj)?))
}

fn to_event(event: WatchEvent<DynamicObject>) -> Result<ResourceEvent> {
    match event {
        WatchEvent::Added(obj) => Ok(ResourceEvent::Added(to_observed(obj)?)),
        WatchEvent::Modified(obj) => Ok(ResourceEvent::Modified(to_observed(obj)?)),
        WatchEvent::Deleted(obj) => Ok(ResourceEvent::Deleted(to_observed(obj)?)),
        WatchEvent::Bookmark(bookmark) => Ok(ResourceEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        }),
        WatchEvent::Error(e) if e.code == GONE => Err(Error::WatchExpired {
            resource_version: e.message,
        }),
        WatchEvent::Error(e) => Err(Error::Watch(format!("{} ({})", e.message, e.code))),
    }
}

fn map_open_error(e: kube::Error, resource_version: &str) -> Error {
    match e {
        kube::Error::Api(ref response) if response.code == GONE => Error::WatchExpired {
            resource_version: resource_version.to_string(),
        },
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ResourceSource for KubeResourceSource {
    #[instrument(skip(self), fields(resource = %identity))]
    async fn list(&self, identity: &ResourceIdentity) -> Result<ResourceList> {
        let list = self.api(identity).list(&ListParams::default()).await?;
        debug!(items = list.items.len(), "Listed objects");

        let items = list
            .items
            .into_iter()
            .map(to_observed)
            .collect::<Result<Vec<_>>>()?;

        Ok(ResourceList {
            items,
            resource_version: list.metadata.resource_version,
        })
    }

    #[instrument(skip(self), fields(resource = %identity))]
    async fn watch(
        &self,
        identity: &ResourceIdentity,
        resource_version: &str,
    ) -> Result<ResourceEventStream> {
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let stream = self
            .api(identity)
            .watch(&params, resource_version)
            .await
            .map_err(|e| map_open_error(e, resource_version))?;

        Ok(stream
            .map(|item| item.map_err(Error::Kube).and_then(to_event))
            .boxed())
    }
}
