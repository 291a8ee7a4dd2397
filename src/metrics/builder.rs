//! Metric Family Builder
//!
//! Turns one observed managed resource into the fixed set of families the
//! exporter publishes for it. The family order here is the order headers are
//! bound in the store, so the two must stay aligned.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::metrics::family::{FamilyHeader, Metric, MetricFamily};
use crate::metrics::label::valid_label;
use crate::metrics::status::CrossplaneStatus;
use crate::object::{FieldPath, ObservedObject};

/// Family suffixes and help texts, in emission order.
const FAMILIES: [(&str, &str); 8] = [
    ("", "A metrics series for each object"),
    ("_created", "Unix creation timestamp"),
    ("_labels", "Labels from the kubernetes object"),
    ("_info", "A metrics series exposing parameters as labels"),
    (
        "_ready",
        "A metrics series mapping the Ready status condition to a value (True=1,False=0,other=-1)",
    ),
    ("_ready_time", "Unix timestamp of last ready change"),
    (
        "_synced",
        "A metrics series mapping the Synced status condition to a value (True=1,False=0,other=-1)",
    ),
    ("_synced_time", "Unix timestamp of last synced change"),
];

/// Prefix added to every object label key in the `_labels` family.
pub const LABEL_PREFIX: &str = "label_";

/// Projection of an object field into a label of the `_info` family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoMapping {
    pub field_path: FieldPath,
    /// Sanitized label name
    pub label: String,
}

/// Labels every family already carries.
pub const IDENTITY_LABELS: [&str; 2] = ["name", "namespace"];

impl InfoMapping {
    /// Parse the field path and sanitize the label. Labels that sanitize to
    /// nothing or to an identity label are rejected.
    pub fn new(field_path: &str, label: &str) -> Result<Self> {
        let mapping = Self {
            field_path: FieldPath::parse(field_path)?,
            label: valid_label(label),
        };
        if mapping.label.is_empty() {
            return Err(Error::Config(format!(
                "info label '{}' has no valid characters",
                label
            )));
        }
        check_info_label(&mapping.label)?;
        Ok(mapping)
    }
}

fn check_info_label(label: &str) -> Result<()> {
    if label.is_empty() || valid_label(label) != label {
        return Err(Error::Config(format!("info label '{}' is not a valid label name", label)));
    }
    if IDENTITY_LABELS.contains(&label) {
        return Err(Error::Config(format!("info label '{}' is reserved", label)));
    }
    Ok(())
}

/// Check the mappings of one `_info` family. Each label must pass the
/// single-label rules and appear once.
pub fn validate_info_mappings(mappings: &[InfoMapping]) -> Result<()> {
    let mut labels = HashSet::new();
    for mapping in mappings {
        check_info_label(&mapping.label)?;
        if !labels.insert(mapping.label.as_str()) {
            return Err(Error::Config(format!("duplicate info label '{}'", mapping.label)));
        }
    }
    Ok(())
}

/// Builds the metric families of one resource type.
#[derive(Debug, Clone)]
pub struct ManagedResourceMetrics {
    prefix: String,
    namespaced: bool,
    info_mappings: Vec<InfoMapping>,
    headers: Vec<FamilyHeader>,
}

impl ManagedResourceMetrics {
    /// `prefix` must already be a valid metric name. `namespaced` adds the
    /// `namespace` identity label.
    pub fn new(
        prefix: impl Into<String>,
        namespaced: bool,
        info_mappings: Vec<InfoMapping>,
    ) -> Self {
        let prefix = prefix.into();
        let headers = FAMILIES
            .iter()
            .map(|(suffix, help)| FamilyHeader::gauge(format!("{}{}", prefix, suffix), *help))
            .collect();

        Self {
            prefix,
            namespaced,
            info_mappings,
            headers,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Headers in the same order as [`Self::families`] output.
    pub fn headers(&self) -> &[FamilyHeader] {
        &self.headers
    }

    pub fn info_mappings(&self) -> &[InfoMapping] {
        &self.info_mappings
    }

    /// Identity labels shared by every family.
    pub fn identity_label_keys(&self) -> &'static [&'static str] {
        if self.namespaced {
            &["name", "namespace"]
        } else {
            &["name"]
        }
    }

    fn identity_metric(&self, obj: &ObservedObject, value: f64) -> Metric {
        let mut metric = Metric::new(value);
        metric.push_label("name", obj.name());
        if self.namespaced {
            metric.push_label("namespace", obj.namespace().unwrap_or_default());
        }
        metric
    }

    fn family(&self, index: usize, metric: Metric) -> MetricFamily {
        MetricFamily::single(self.headers[index].name.clone(), metric)
    }

    /// Build all families for one object.
    pub fn families(&self, obj: &ObservedObject) -> Vec<MetricFamily> {
        let created = obj
            .creation_timestamp()
            .map(|t| t.timestamp() as f64)
            .unwrap_or(0.0);

        let mut labels = self.identity_metric(obj, 1.0);
        // Keys arrive sorted, so when two keys sanitize to the same name the
        // lexicographically last original key wins.
        for (key, value) in obj.labels() {
            labels.set_label(format!("{}{}", LABEL_PREFIX, valid_label(key)), value);
        }

        let mut info = self.identity_metric(obj, 1.0);
        for mapping in &self.info_mappings {
            let value = obj.get_string(&mapping.field_path).unwrap_or_default();
            info.push_label(mapping.label.clone(), value);
        }

        let status = CrossplaneStatus::from_object(obj);

        vec![
            self.family(0, self.identity_metric(obj, 1.0)),
            self.family(1, self.identity_metric(obj, created)),
            self.family(2, labels),
            self.family(3, info),
            self.family(4, self.identity_metric(obj, status.ready)),
            self.family(5, self.identity_metric(obj, status.ready_time.timestamp() as f64)),
            self.family(6, self.identity_metric(obj, status.synced)),
            self.family(7, self.identity_metric(obj, status.synced_time.timestamp() as f64)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::family::encode_text;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn widget() -> ObservedObject {
        ObservedObject::new(json!({
            "metadata": {
                "name": "db-1",
                "namespace": "team-a",
                "creationTimestamp": "2024-03-01T12:00:00Z",
                "labels": {"env": "prod"}
            },
            "spec": {"forProvider": {"region": "eu-west-1"}},
            "status": {
                "conditions": [
                    {"type": "Ready", "status": "True",
                     "lastTransitionTime": "2024-03-01T12:05:00Z"},
                    {"type": "Synced", "status": "False",
                     "lastTransitionTime": "2024-03-01T12:06:00Z"}
                ]
            }
        }))
    }

    /// Sample lines of each family, encoded under its header.
    fn render(builder: &ManagedResourceMetrics, families: &[MetricFamily]) -> Vec<String> {
        families
            .iter()
            .zip(builder.headers())
            .map(|(family, header)| {
                let mut out = Vec::new();
                encode_text(&[header.to_proto(family.to_proto_metrics())], &mut out).unwrap();
                String::from_utf8(out)
                    .unwrap()
                    .lines()
                    .filter(|line| !line.starts_with('#'))
                    .map(|line| format!("{}\n", line))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_headers_bound_to_prefix() {
        let builder = ManagedResourceMetrics::new("widget", true, vec![]);
        let names: Vec<_> = builder.headers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "widget",
                "widget_created",
                "widget_labels",
                "widget_info",
                "widget_ready",
                "widget_ready_time",
                "widget_synced",
                "widget_synced_time",
            ]
        );
    }

    #[test]
    fn test_families_follow_header_order() {
        let builder = ManagedResourceMetrics::new("widget", true, vec![]);
        let families = builder.families(&widget());
        assert_eq!(families.len(), builder.headers().len());
        for (family, header) in families.iter().zip(builder.headers()) {
            assert_eq!(family.name, header.name);
        }
    }

    #[test]
    fn test_namespaced_scenario() {
        let builder = ManagedResourceMetrics::new("widget", true, vec![]);
        let lines = render(&builder, &builder.families(&widget()));

        assert_eq!(lines[0], "widget{name=\"db-1\",namespace=\"team-a\"} 1\n");
        assert_eq!(
            lines[1],
            "widget_created{name=\"db-1\",namespace=\"team-a\"} 1709294400\n"
        );
        assert_eq!(
            lines[2],
            "widget_labels{name=\"db-1\",namespace=\"team-a\",label_env=\"prod\"} 1\n"
        );
        assert_eq!(lines[3], "widget_info{name=\"db-1\",namespace=\"team-a\"} 1\n");
        assert_eq!(lines[4], "widget_ready{name=\"db-1\",namespace=\"team-a\"} 1\n");
        assert_eq!(
            lines[5],
            "widget_ready_time{name=\"db-1\",namespace=\"team-a\"} 1709294700\n"
        );
        assert_eq!(lines[6], "widget_synced{name=\"db-1\",namespace=\"team-a\"} 0\n");
        assert_eq!(
            lines[7],
            "widget_synced_time{name=\"db-1\",namespace=\"team-a\"} 1709294760\n"
        );
    }

    #[test]
    fn test_cluster_scoped_uses_name_only() {
        let builder = ManagedResourceMetrics::new("widget", false, vec![]);
        assert_eq!(builder.identity_label_keys(), &["name"]);

        let lines = render(&builder, &builder.families(&widget()));
        assert_eq!(lines[0], "widget{name=\"db-1\"} 1\n");
    }

    #[test]
    fn test_info_mappings_keep_fixed_shape() {
        let mappings = vec![
            InfoMapping::new("spec.forProvider.region", "region").unwrap(),
            InfoMapping::new("spec.forProvider.zone", "zone").unwrap(),
        ];
        let builder = ManagedResourceMetrics::new("widget", false, mappings);
        let lines = render(&builder, &builder.families(&widget()));

        assert_eq!(
            lines[3],
            "widget_info{name=\"db-1\",region=\"eu-west-1\",zone=\"\"} 1\n"
        );
    }

    #[test]
    fn test_info_mapping_label_is_sanitized() {
        let mapping = InfoMapping::new("spec.forProvider.region", "provider-region").unwrap();
        assert_eq!(mapping.label, "provider_region");
        assert!(InfoMapping::new("spec..region", "region").is_err());
    }

    #[test]
    fn test_info_mapping_rejects_unusable_labels() {
        assert_matches!(InfoMapping::new("spec.x", "!!!"), Err(Error::Config(_)));
        assert_matches!(InfoMapping::new("metadata.namespace", "name"), Err(Error::Config(_)));
        assert_matches!(InfoMapping::new("spec.x", "namespace"), Err(Error::Config(_)));
    }

    #[test]
    fn test_validate_info_mappings() {
        let region = InfoMapping::new("spec.forProvider.region", "region").unwrap();
        let zone = InfoMapping::new("spec.forProvider.zone", "zone").unwrap();
        assert!(validate_info_mappings(&[region.clone(), zone]).is_ok());

        let again = InfoMapping::new("spec.location", "region").unwrap();
        assert_matches!(
            validate_info_mappings(&[region.clone(), again]),
            Err(Error::Config(msg)) if msg.contains("duplicate")
        );

        let forged = InfoMapping {
            field_path: region.field_path.clone(),
            label: "name".to_string(),
        };
        assert_matches!(validate_info_mappings(&[forged]), Err(Error::Config(_)));

        let unsanitized = InfoMapping {
            field_path: region.field_path,
            label: "".to_string(),
        };
        assert_matches!(validate_info_mappings(&[unsanitized]), Err(Error::Config(_)));
    }

    #[test]
    fn test_label_keys_sanitized_and_collisions_resolved() {
        let obj = ObservedObject::new(json!({
            "metadata": {
                "name": "x",
                "labels": {
                    "app.kubernetes.io/name": "first",
                    "app_kubernetes_io/name": "second",
                    "tier": "gold"
                }
            }
        }));
        let builder = ManagedResourceMetrics::new("w", false, vec![]);
        let labels = &builder.families(&obj)[2].metrics[0];

        assert_eq!(
            labels.label_keys().collect::<Vec<_>>(),
            vec!["name", "label_app_kubernetes_io_name", "label_tier"]
        );
        // "app_kubernetes_io/name" sorts after "app.kubernetes.io/name".
        assert_eq!(labels.label("label_app_kubernetes_io_name"), Some("second"));
        assert_eq!(labels.label("label_tier"), Some("gold"));
    }

    #[test]
    fn test_bare_object_degrades_to_defaults() {
        let obj = ObservedObject::new(json!({}));
        let builder = ManagedResourceMetrics::new("w", true, vec![]);
        let lines = render(&builder, &builder.families(&obj));

        assert_eq!(lines[0], "w{name=\"\",namespace=\"\"} 1\n");
        assert_eq!(lines[1], "w_created{name=\"\",namespace=\"\"} 0\n");
        assert_eq!(lines[4], "w_ready{name=\"\",namespace=\"\"} -1\n");
        assert_eq!(lines[5], "w_ready_time{name=\"\",namespace=\"\"} 0\n");
        assert_eq!(lines[6], "w_synced{name=\"\",namespace=\"\"} -1\n");
    }

    #[test]
    fn test_identical_objects_build_identical_families() {
        let builder = ManagedResourceMetrics::new("widget", true, vec![]);
        assert_eq!(builder.families(&widget()), builder.families(&widget()));
    }
}
