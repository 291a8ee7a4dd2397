//! Per-Resource Metrics Store
//!
//! Holds the protobuf samples of every object of one resource type.
//! Samples are generated outside the lock and swapped in under it, so a
//! concurrent render sees each object either entirely before or entirely
//! after an event.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus::proto;

use crate::metrics::builder::ManagedResourceMetrics;
use crate::metrics::family::{encode_text, FamilyHeader, MetricFamily};
use crate::object::{ObjectKey, ObservedObject};

/// Generates the families of one object, in header order.
pub type FamilyGenerator = Arc<dyn Fn(&ObservedObject) -> Vec<MetricFamily> + Send + Sync>;

/// Samples of one object, one entry per family.
type ObjectSamples = Vec<Vec<proto::Metric>>;

/// Store of exposition-ready samples for one resource type.
pub struct MetricsStore {
    headers: Vec<FamilyHeader>,
    generate: FamilyGenerator,
    metrics: RwLock<BTreeMap<ObjectKey, ObjectSamples>>,
}

impl MetricsStore {
    /// Create a store whose generator emits families in `headers` order.
    pub fn new<F>(headers: &[FamilyHeader], generate: F) -> Self
    where
        F: Fn(&ObservedObject) -> Vec<MetricFamily> + Send + Sync + 'static,
    {
        Self {
            headers: headers.to_vec(),
            generate: Arc::new(generate),
            metrics: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store for a managed resource type.
    pub fn for_resource(builder: ManagedResourceMetrics) -> Self {
        let headers = builder.headers().to_vec();
        Self::new(&headers, move |obj| builder.families(obj))
    }

    fn samples(&self, obj: &ObservedObject) -> ObjectSamples {
        (self.generate)(obj)
            .iter()
            .map(MetricFamily::to_proto_metrics)
            .collect()
    }

    /// Insert or replace the families of an object.
    pub fn add(&self, obj: &ObservedObject) {
        let samples = self.samples(obj);
        self.metrics.write().insert(obj.key(), samples);
    }

    /// Same as [`Self::add`].
    pub fn update(&self, obj: &ObservedObject) {
        self.add(obj);
    }

    /// Drop the families of an object. Returns false if it was not stored.
    pub fn delete(&self, obj: &ObservedObject) -> bool {
        self.metrics.write().remove(&obj.key()).is_some()
    }

    /// Replace the whole content with the given objects.
    pub fn replace<'a, I>(&self, objects: I)
    where
        I: IntoIterator<Item = &'a ObservedObject>,
    {
        let fresh: BTreeMap<_, _> = objects
            .into_iter()
            .map(|obj| (obj.key(), self.samples(obj)))
            .collect();
        *self.metrics.write() = fresh;
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.metrics.read().contains_key(key)
    }

    /// Keys of all stored objects, in order.
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.metrics.read().keys().cloned().collect()
    }

    /// One protobuf family per header holding the samples of every object.
    /// Families without samples are left out, so an empty store yields none.
    pub fn collect(&self) -> Vec<proto::MetricFamily> {
        let metrics = self.metrics.read();
        self.headers
            .iter()
            .enumerate()
            .filter_map(|(i, header)| {
                let samples: Vec<_> = metrics
                    .values()
                    .filter_map(|families| families.get(i))
                    .flatten()
                    .cloned()
                    .collect();
                (!samples.is_empty()).then(|| header.to_proto(samples))
            })
            .collect()
    }

    /// Write the exposition text to `w`. The store lock is released before
    /// any byte reaches the writer.
    pub fn write_all(&self, w: &mut dyn Write) -> std::io::Result<()> {
        let families = self.collect();
        encode_text(&families, w)
    }

    /// Exposition text of the store.
    pub fn render_text(&self) -> String {
        let mut out = Vec::new();
        match self.write_all(&mut out) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => String::new(),
        }
    }
}

impl fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsStore")
            .field("headers", &self.headers.len())
            .field("objects", &self.len())
            .finish()
    }
}
