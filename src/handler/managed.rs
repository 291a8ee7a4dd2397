//! Managed Metrics Handler
//!
//! Registration boundary of the exporter. Each call wires one resource type
//! end to end: a builder for its families, a store, a synchronizer on its own
//! task and a registry entry that makes the store visible to scrapes.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::domain::{GroupVersionResource, ResourceIdentity, ResourceSource};
use crate::error::{Error, Result};
use crate::handler::registry::MetricsRegistry;
use crate::metrics::builder::validate_info_mappings;
use crate::metrics::{valid_label, InfoMapping, ManagedResourceMetrics, MetricsStore};
use crate::sync::{ResourceSynchronizer, SyncConfig, SynchronizerHandle};
use crate::telemetry::ExporterMetrics;

/// Series name for a registration: the base name, prefixed by the namespace
/// when one is given, sanitized as a whole.
pub fn series_name(base_name: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        valid_label(base_name)
    } else {
        valid_label(&format!("{}_{}", namespace, base_name))
    }
}

/// Owns the registry and every synchronizer started through it.
pub struct ManagedMetricsHandler {
    source: Arc<dyn ResourceSource>,
    registry: MetricsRegistry,
    sync_config: SyncConfig,
    telemetry: ExporterMetrics,
    root: CancellationToken,
    /// Stopped synchronizers not yet joined
    retired: Mutex<Vec<SynchronizerHandle>>,
}

impl ManagedMetricsHandler {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        sync_config: SyncConfig,
        telemetry: ExporterMetrics,
    ) -> Self {
        Self {
            source,
            registry: MetricsRegistry::new(),
            sync_config,
            telemetry,
            root: CancellationToken::new(),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn telemetry(&self) -> &ExporterMetrics {
        &self.telemetry
    }

    /// Start exporting metrics for `gvr`, scoped to `namespace` (empty means
    /// every namespace).
    ///
    /// Re-registering a series name replaces the previous store and stops
    /// its synchronizer. Info mappings are checked with
    /// [`validate_info_mappings`]. Must be called from within a tokio runtime.
    #[instrument(skip(self, gvr, info_mappings), fields(resource = %gvr))]
    pub fn register_and_add_metric_store_for_gvr(
        &self,
        base_name: &str,
        gvr: GroupVersionResource,
        namespace: &str,
        info_mappings: Vec<InfoMapping>,
    ) -> Result<CancellationToken> {
        let series = series_name(base_name, namespace);
        if series.is_empty() {
            return Err(Error::Config(format!(
                "metric name '{}' has no valid characters",
                base_name
            )));
        }
        validate_info_mappings(&info_mappings)?;

        let identity = ResourceIdentity::new(gvr, namespace);
        let namespaced = identity.namespace().is_some();
        let builder = ManagedResourceMetrics::new(series.clone(), namespaced, info_mappings);
        let store = Arc::new(MetricsStore::for_resource(builder));

        let cancel = self.root.child_token();
        let handle = ResourceSynchronizer::new(
            series.clone(),
            identity,
            self.source.clone(),
            store.clone(),
            self.sync_config.clone(),
            self.telemetry.clone(),
        )
        .spawn(cancel.clone());

        if let Some(old) = self.registry.register(series.clone(), store, handle) {
            self.retire(old);
        }
        self.telemetry.set_registered_stores(self.registry.len());

        info!(series = %series, "Registered metric store");
        Ok(cancel)
    }

    /// Stop exporting `series`. Returns false if it was not registered.
    ///
    /// The synchronizer is cancelled before its telemetry is forgotten, and
    /// a cancelled synchronizer no longer reports.
    pub fn remove_metric_store(&self, series: &str) -> bool {
        let Some(handle) = self.registry.remove(series) else {
            return false;
        };
        self.retire(handle);
        self.telemetry.forget_series(series);
        self.telemetry.set_registered_stores(self.registry.len());

        info!(series = %series, "Removed metric store");
        true
    }

    fn retire(&self, handle: SynchronizerHandle) {
        let mut retired = self.retired.lock();
        retired.retain(|h| !h.is_finished());
        retired.push(handle);
    }

    /// Render every registered store to `w`.
    pub fn render(&self, w: &mut dyn Write) -> std::io::Result<()> {
        self.registry.render_all(w)
    }

    /// Registered series names, sorted.
    pub fn series_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Cancel every synchronizer and wait for all of them to exit.
    pub async fn shutdown(&self) {
        self.root.cancel();

        let mut handles = self.registry.drain();
        handles.append(&mut *self.retired.lock());
        self.telemetry.set_registered_stores(0);

        info!(synchronizers = handles.len(), "Stopping synchronizers");
        for handle in handles {
            handle.join().await;
        }
    }
}

impl std::fmt::Debug for ManagedMetricsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedMetricsHandler")
            .field("registry", &self.registry)
            .field("sync_config", &self.sync_config)
            .finish()
    }
}
