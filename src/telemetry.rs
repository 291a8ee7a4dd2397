//! Exporter self-instrumentation
//!
//! Counters and gauges describing the synchronizers themselves, kept on a
//! registry owned by this struct rather than the process-global default.

use prometheus::core::Collector;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Event kinds recorded per series.
const EVENT_KINDS: [&str; 4] = ["list", "added", "modified", "deleted"];

/// Telemetry shared by the handler and every synchronizer.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    sync_events: IntCounterVec,
    list_failures: IntCounterVec,
    watch_failures: IntCounterVec,
    store_objects: IntGaugeVec,
    registered_stores: IntGauge,
}

impl ExporterMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sync_events = IntCounterVec::new(
            Opts::new(
                "managed_metrics_sync_events_total",
                "List and watch events applied to metric stores",
            ),
            &["series", "event"],
        )?;
        let list_failures = IntCounterVec::new(
            Opts::new(
                "managed_metrics_list_failures_total",
                "Failed list calls against the cluster API",
            ),
            &["series"],
        )?;
        let watch_failures = IntCounterVec::new(
            Opts::new(
                "managed_metrics_watch_failures_total",
                "Watch streams that failed to open or ended with an error",
            ),
            &["series"],
        )?;
        let store_objects = IntGaugeVec::new(
            Opts::new(
                "managed_metrics_store_objects",
                "Objects currently held in a metric store",
            ),
            &["series"],
        )?;
        let registered_stores = IntGauge::new(
            "managed_metrics_registered_stores",
            "Metric stores currently registered for scraping",
        )?;

        registry.register(Box::new(sync_events.clone()))?;
        registry.register(Box::new(list_failures.clone()))?;
        registry.register(Box::new(watch_failures.clone()))?;
        registry.register(Box::new(store_objects.clone()))?;
        registry.register(Box::new(registered_stores.clone()))?;

        Ok(Self {
            registry,
            sync_events,
            list_failures,
            watch_failures,
            store_objects,
            registered_stores,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_event(&self, series: &str, event: &str) {
        self.sync_events.with_label_values(&[series, event]).inc();
    }

    pub fn list_failed(&self, series: &str) {
        self.list_failures.with_label_values(&[series]).inc();
    }

    pub fn watch_failed(&self, series: &str) {
        self.watch_failures.with_label_values(&[series]).inc();
    }

    pub fn set_store_objects(&self, series: &str, objects: usize) {
        self.store_objects
            .with_label_values(&[series])
            .set(objects as i64);
    }

    pub fn set_registered_stores(&self, stores: usize) {
        self.registered_stores.set(stores as i64);
    }

    /// Drop every series of a removed store.
    pub fn forget_series(&self, series: &str) {
        let _ = self.store_objects.remove_label_values(&[series]);
        let _ = self.list_failures.remove_label_values(&[series]);
        let _ = self.watch_failures.remove_label_values(&[series]);
        for event in EVENT_KINDS {
            let _ = self.sync_events.remove_label_values(&[series, event]);
        }
    }

    pub fn events_total(&self, series: &str, event: &str) -> u64 {
        counter_value(&self.sync_events, &[("series", series), ("event", event)])
    }

    pub fn list_failures_total(&self, series: &str) -> u64 {
        counter_value(&self.list_failures, &[("series", series)])
    }

    pub fn watch_failures_total(&self, series: &str) -> u64 {
        counter_value(&self.watch_failures, &[("series", series)])
    }

    /// Text exposition of every self metric.
    pub fn encode(&self) -> Result<String> {
        Ok(TextEncoder::new().encode_to_string(&self.registry.gather())?)
    }
}

/// Current value of the counter matching `labels`, zero if it was never
/// created. Reading never creates a series.
fn counter_value(counters: &IntCounterVec, labels: &[(&str, &str)]) -> u64 {
    counters
        .collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .find(|metric| {
            labels.iter().all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.name() == *name && pair.value() == *value)
            })
        })
        .map(|metric| metric.get_counter().value() as u64)
        .unwrap_or(0)
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("registered_stores", &self.registered_stores.get())
            .finish()
    }
}
