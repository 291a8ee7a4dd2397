//! Metric Families
//!
//! Samples produced by the builder, and their conversion into the
//! `prometheus` protobuf model for exposition with [`TextEncoder`].
//!
//! ```text
//! # HELP widget_ready A metrics series mapping the Ready status condition ...
//! # TYPE widget_ready gauge
//! widget_ready{name="db-1",namespace="team-a"} 1
//! ```

use std::io::{self, Write};

use prometheus::proto;
use prometheus::{Encoder, TextEncoder};

/// Metric type advertised in the `# TYPE` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Gauge,
}

impl MetricType {
    fn to_proto(self) -> proto::MetricType {
        match self {
            MetricType::Gauge => proto::MetricType::GAUGE,
        }
    }
}

/// Name, help text and type of a family, fixed when a store is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyHeader {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
}

impl FamilyHeader {
    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type: MetricType::Gauge,
        }
    }

    /// A protobuf family carrying this header and the given samples.
    pub fn to_proto(&self, metrics: Vec<proto::Metric>) -> proto::MetricFamily {
        let mut family = proto::MetricFamily::default();
        family.set_name(self.name.clone());
        family.set_help(self.help.clone());
        family.set_field_type(self.metric_type.to_proto());
        family.set_metric(metrics);
        family
    }
}

/// One sample: an ordered label set and a value.
///
/// Labels are stored as key/value pairs so keys and values can never drift
/// out of step.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    labels: Vec<(String, String)>,
    pub value: f64,
}

impl Metric {
    pub fn new(value: f64) -> Self {
        Self {
            labels: Vec::new(),
            value,
        }
    }

    /// Build a sample from parallel key and value sequences.
    pub fn with_labels<K, V>(keys: K, values: V, value: f64) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let labels = keys
            .into_iter()
            .map(Into::into)
            .zip(values.into_iter().map(Into::into))
            .collect();
        Self { labels, value }
    }

    /// Append a label.
    pub fn push_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.push((key.into(), value.into()));
    }

    /// Set a label, replacing the value of an existing key in place.
    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.labels.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.labels.push((key, value)),
        }
    }

    pub fn label_keys(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(k, _)| k.as_str())
    }

    pub fn label_values(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(_, v)| v.as_str())
    }

    /// Value of a label, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Gauge sample with labels in insertion order.
    pub fn to_proto(&self) -> proto::Metric {
        let pairs = self
            .labels
            .iter()
            .map(|(key, value)| {
                let mut pair = proto::LabelPair::default();
                pair.set_name(key.clone());
                pair.set_value(value.clone());
                pair
            })
            .collect();

        let mut gauge = proto::Gauge::default();
        gauge.set_value(self.value);

        let mut metric = proto::Metric::from_label(pairs);
        metric.set_gauge(gauge);
        metric
    }
}

/// A named group of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub metrics: Vec<Metric>,
}

impl MetricFamily {
    pub fn new(name: impl Into<String>, metrics: Vec<Metric>) -> Self {
        Self {
            name: name.into(),
            metrics,
        }
    }

    /// A family holding a single sample.
    pub fn single(name: impl Into<String>, metric: Metric) -> Self {
        Self::new(name, vec![metric])
    }

    pub fn to_proto_metrics(&self) -> Vec<proto::Metric> {
        self.metrics.iter().map(Metric::to_proto).collect()
    }
}

/// Write families in the Prometheus text format. Families without samples
/// must be filtered out beforehand.
pub fn encode_text(families: &[proto::MetricFamily], mut w: &mut dyn Write) -> io::Result<()> {
    TextEncoder::new()
        .encode(families, &mut w)
        .map_err(|e| match e {
            prometheus::Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        })
}
