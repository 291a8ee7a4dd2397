//! In-Memory Resource Source
//!
//! Scripted `ResourceSource` for tests and local runs. Mutations are
//! broadcast to open watches the way an API server would, and failures can be
//! injected on demand.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::domain::ports::{
    GroupVersionResource, ResourceEvent, ResourceEventStream, ResourceIdentity, ResourceList,
    ResourceSource,
};
use crate::error::{Error, Result};
use crate::object::{ObjectKey, ObservedObject};

struct Watcher {
    identity: ResourceIdentity,
    tx: UnboundedSender<Result<ResourceEvent>>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<GroupVersionResource, BTreeMap<ObjectKey, ObservedObject>>,
    resource_version: u64,
    watchers: Vec<Watcher>,
    list_failures: usize,
    watch_failures: usize,
    list_calls: usize,
    watch_calls: usize,
    last_watch_version: Option<String>,
}

impl Inner {
    fn next_version(&mut self, value: &mut Value) {
        self.resource_version += 1;
        if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert(
                "resourceVersion".to_string(),
                Value::String(self.resource_version.to_string()),
            );
        }
    }

    fn broadcast(&mut self, gvr: &GroupVersionResource, event: ResourceEvent) {
        let namespace = match &event {
            ResourceEvent::Added(obj)
            | ResourceEvent::Modified(obj)
            | ResourceEvent::Deleted(obj) => obj.namespace().map(str::to_string),
            ResourceEvent::Bookmark { .. } => None,
        };
        let namespace = namespace.as_deref();
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            if &watcher.identity.gvr == gvr && watcher.identity.matches_namespace(namespace) {
                let _ = watcher.tx.unbounded_send(Ok(event.clone()));
            }
        }
    }
}

/// In-memory stand-in for the cluster API.
#[derive(Default)]
pub struct InMemoryResourceSource {
    inner: Mutex<Inner>,
}

impl InMemoryResourceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or update an object and notify matching watches.
    pub fn apply(&self, identity: &ResourceIdentity, mut value: Value) {
        let mut inner = self.inner.lock();
        inner.next_version(&mut value);
        let obj = ObservedObject::new(value);
        let previous = inner
            .objects
            .entry(identity.gvr.clone())
            .or_default()
            .insert(obj.key(), obj.clone());

        let event = match previous {
            Some(_) => ResourceEvent::Modified(obj),
            None => ResourceEvent::Added(obj),
        };
        inner.broadcast(&identity.gvr, event);
    }

    /// Change an object without telling any watch.
    pub fn insert_silently(&self, identity: &ResourceIdentity, mut value: Value) {
        let mut inner = self.inner.lock();
        inner.next_version(&mut value);
        let obj = ObservedObject::new(value);
        inner
            .objects
            .entry(identity.gvr.clone())
            .or_default()
            .insert(obj.key(), obj);
    }

    /// Delete an object in the identity's namespace and notify watches.
    pub fn remove(&self, identity: &ResourceIdentity, name: &str) -> bool {
        let mut inner = self.inner.lock();
        let key = ObjectKey::new(identity.namespace(), name);
        let removed = inner
            .objects
            .get_mut(&identity.gvr)
            .and_then(|objects| objects.remove(&key));

        match removed {
            Some(obj) => {
                let mut value = obj.into_value();
                inner.next_version(&mut value);
                inner.broadcast(&identity.gvr, ResourceEvent::Deleted(ObservedObject::new(value)));
                true
            }
            None => false,
        }
    }

    /// Send a bookmark to every open watch of the resource type.
    pub fn bookmark(&self, identity: &ResourceIdentity) {
        let mut inner = self.inner.lock();
        inner.resource_version += 1;
        let event = ResourceEvent::Bookmark {
            resource_version: inner.resource_version.to_string(),
        };
        inner.broadcast(&identity.gvr, event);
    }

    /// Make the next `n` list calls fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.inner.lock().list_failures = n;
    }

    /// Make the next `n` watch calls fail.
    pub fn fail_next_watches(&self, n: usize) {
        self.inner.lock().watch_failures = n;
    }

    /// End every open watch with an expired resource version error.
    pub fn expire_watches(&self) {
        let mut inner = self.inner.lock();
        let resource_version = inner.resource_version.to_string();
        for watcher in inner.watchers.drain(..) {
            let _ = watcher.tx.unbounded_send(Err(Error::WatchExpired {
                resource_version: resource_version.clone(),
            }));
        }
    }

    /// Close every open watch cleanly.
    pub fn close_watches(&self) {
        self.inner.lock().watchers.clear();
    }

    /// Number of watches still being consumed.
    pub fn active_watches(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().list_calls
    }

    pub fn watch_calls(&self) -> usize {
        self.inner.lock().watch_calls
    }

    /// Resource version passed to the most recent watch call.
    pub fn last_watch_version(&self) -> Option<String> {
        self.inner.lock().last_watch_version.clone()
    }
}

impl std::fmt::Debug for InMemoryResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("InMemoryResourceSource")
            .field("resource_types", &inner.objects.len())
            .field("resource_version", &inner.resource_version)
            .field("watchers", &inner.watchers.len())
            .finish()
    }
}

#[async_trait]
impl ResourceSource for InMemoryResourceSource {
    async fn list(&self, identity: &ResourceIdentity) -> Result<ResourceList> {
        let mut inner = self.inner.lock();
        inner.list_calls += 1;
        if inner.list_failures > 0 {
            inner.list_failures -= 1;
            return Err(Error::Internal("injected list failure".to_string()));
        }

        let items = inner
            .objects
            .get(&identity.gvr)
            .map(|objects| {
                objects
                    .values()
                    .filter(|obj| identity.matches_namespace(obj.namespace()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(ResourceList {
            items,
            resource_version: Some(inner.resource_version.to_string()),
        })
    }

    async fn watch(
        &self,
        identity: &ResourceIdentity,
        resource_version: &str,
    ) -> Result<ResourceEventStream> {
        let mut inner = self.inner.lock();
        inner.watch_calls += 1;
        inner.last_watch_version = Some(resource_version.to_string());
        if inner.watch_failures > 0 {
            inner.watch_failures -= 1;
            return Err(Error::Watch("injected watch failure".to_string()));
        }

        let (tx, rx) = unbounded();
        inner.watchers.push(Watcher {
            identity: identity.clone(),
            tx,
        });
        Ok(rx.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn identity(namespace: &str) -> ResourceIdentity {
        ResourceIdentity::new(GroupVersionResource::new("example.org", "v1", "widgets"), namespace)
    }

    fn widget(name: &str, namespace: &str) -> Value {
        json!({"metadata": {"name": name, "namespace": namespace}})
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace() {
        let source = InMemoryResourceSource::new();
        source.apply(&identity("a"), widget("x", "a"));
        source.apply(&identity("b"), widget("y", "b"));

        let scoped = source.list(&identity("a")).await.unwrap();
        assert_eq!(scoped.items.len(), 1);
        assert_eq!(scoped.items[0].name(), "x");
        assert_eq!(scoped.resource_version.as_deref(), Some("2"));

        let all = source.list(&identity("")).await.unwrap();
        assert_eq!(all.items.len(), 2);
    }

    #[tokio::test]
    async fn test_watch_receives_changes() {
        let source = InMemoryResourceSource::new();
        let mut stream = source.watch(&identity("a"), "0").await.unwrap();

        source.apply(&identity("a"), widget("x", "a"));
        source.apply(&identity("a"), widget("x", "a"));
        source.apply(&identity("b"), widget("other", "b"));
        assert!(source.remove(&identity("a"), "x"));

        assert_matches!(stream.next().await, Some(Ok(ResourceEvent::Added(_))));
        assert_matches!(stream.next().await, Some(Ok(ResourceEvent::Modified(_))));
        match stream.next().await {
            Some(Ok(ResourceEvent::Deleted(obj))) => {
                assert_eq!(obj.name(), "x");
                assert_eq!(obj.resource_version(), Some("4"));
            }
            other => panic!("expected delete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let source = InMemoryResourceSource::new();
        source.fail_next_lists(1);
        source.fail_next_watches(1);

        assert!(source.list(&identity("a")).await.is_err());
        assert!(source.list(&identity("a")).await.is_ok());
        assert!(source.watch(&identity("a"), "0").await.is_err());
        assert!(source.watch(&identity("a"), "0").await.is_ok());
        assert_eq!(source.list_calls(), 2);
        assert_eq!(source.watch_calls(), 2);
    }

    #[tokio::test]
    async fn test_expire_and_close_watches() {
        let source = InMemoryResourceSource::new();
        let mut expired = source.watch(&identity("a"), "0").await.unwrap();
        source.expire_watches();
        assert_matches!(expired.next().await, Some(Err(Error::WatchExpired { .. })));
        assert!(expired.next().await.is_none());

        let mut closed = source.watch(&identity("a"), "0").await.unwrap();
        assert_eq!(source.active_watches(), 1);
        source.close_watches();
        assert!(closed.next().await.is_none());
        assert_eq!(source.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_is_not_active() {
        let source = InMemoryResourceSource::new();
        let stream = source.watch(&identity("a"), "0").await.unwrap();
        assert_eq!(source.active_watches(), 1);
        drop(stream);
        assert_eq!(source.active_watches(), 0);
    }
}
