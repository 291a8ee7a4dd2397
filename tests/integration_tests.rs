//! Managed Metrics Integration Tests
//!
//! Drives the exporter end to end through the in-memory resource source:
//! - Registration and scraping of several resource types
//! - Removal and re-registration at runtime
//! - Live watch updates reaching the scrape output
//! - Configuration file to running handler

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use managed_metrics::adapters::InMemoryResourceSource;
use managed_metrics::{
    ExporterConfig, ExporterMetrics, GroupVersionResource, ManagedMetricsHandler,
    ResourceIdentity, SyncConfig,
};

// =============================================================================
// Helpers
// =============================================================================

fn widgets() -> GroupVersionResource {
    GroupVersionResource::new("example.org", "v1", "widgets")
}

fn buckets() -> GroupVersionResource {
    GroupVersionResource::new("s3.aws.upbound.io", "v1beta1", "buckets")
}

fn fast_sync() -> SyncConfig {
    SyncConfig {
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..SyncConfig::default()
    }
}

fn setup() -> (Arc<InMemoryResourceSource>, ManagedMetricsHandler) {
    let source = Arc::new(InMemoryResourceSource::new());
    let handler =
        ManagedMetricsHandler::new(source.clone(), fast_sync(), ExporterMetrics::new().unwrap());
    (source, handler)
}

fn object(name: &str, namespace: &str, labels: Value, ready: &str, synced: &str) -> Value {
    json!({
        "metadata": {
            "name": name,
            "namespace": namespace,
            "creationTimestamp": "2024-01-01T00:00:00Z",
            "labels": labels,
        },
        "status": {"conditions": [
            {"type": "Ready", "status": ready, "lastTransitionTime": "2024-01-02T03:04:05Z"},
            {"type": "Synced", "status": synced, "lastTransitionTime": "2024-01-01T00:00:00Z"},
        ]}
    })
}

fn scrape(handler: &ManagedMetricsHandler) -> String {
    let mut out = Vec::new();
    handler.render(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Scrape Output
// =============================================================================

mod scrape_tests {
    use super::*;

    #[tokio::test]
    async fn test_namespaced_widget_scenario() {
        let (source, handler) = setup();
        let identity = ResourceIdentity::new(widgets(), "team-a");
        source.apply(
            &identity,
            object("db-1", "team-a", json!({"env": "prod"}), "True", "False"),
        );

        handler
            .register_and_add_metric_store_for_gvr("widget", widgets(), "team-a", vec![])
            .unwrap();
        eventually(|| scrape(&handler).contains("db-1")).await;

        let text = scrape(&handler);
        assert!(text.contains("# HELP team_a_widget A metrics series for each object\n"));
        assert!(text.contains("# TYPE team_a_widget gauge\n"));
        assert!(text.contains("team_a_widget{name=\"db-1\",namespace=\"team-a\"} 1\n"));
        assert!(text.contains(
            "team_a_widget_labels{name=\"db-1\",namespace=\"team-a\",label_env=\"prod\"} 1\n"
        ));
        assert!(text.contains("team_a_widget_ready{name=\"db-1\",namespace=\"team-a\"} 1\n"));
        assert!(text.contains(
            "team_a_widget_ready_time{name=\"db-1\",namespace=\"team-a\"} 1704164645\n"
        ));
        assert!(text.contains("team_a_widget_synced{name=\"db-1\",namespace=\"team-a\"} 0\n"));
        assert!(text.contains(
            "team_a_widget_created{name=\"db-1\",namespace=\"team-a\"} 1704067200\n"
        ));

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_two_types_without_cross_contamination() {
        let (source, handler) = setup();
        source.apply(
            &ResourceIdentity::cluster_scoped(widgets()),
            object("w1", "team-a", json!({"tier": "gold"}), "True", "True"),
        );
        source.apply(
            &ResourceIdentity::cluster_scoped(buckets()),
            object("b1", "team-b", json!({"region": "eu"}), "False", "True"),
        );

        handler
            .register_and_add_metric_store_for_gvr("widget", widgets(), "", vec![])
            .unwrap();
        handler
            .register_and_add_metric_store_for_gvr("bucket", buckets(), "", vec![])
            .unwrap();
        eventually(|| {
            let text = scrape(&handler);
            text.contains("w1") && text.contains("b1")
        })
        .await;

        let text = scrape(&handler);
        assert!(text.contains("# TYPE widget_ready gauge\n"));
        assert!(text.contains("# TYPE bucket_ready gauge\n"));
        assert!(text.contains("widget_labels{name=\"w1\",label_tier=\"gold\"} 1\n"));
        assert!(text.contains("bucket_labels{name=\"b1\",label_region=\"eu\"} 1\n"));
        assert!(text.contains("bucket_ready{name=\"b1\"} 0\n"));

        for line in text.lines().filter(|l| l.starts_with("widget")) {
            assert!(!line.contains("b1") && !line.contains("label_region"), "{}", line);
        }
        for line in text.lines().filter(|l| l.starts_with("bucket")) {
            assert!(!line.contains("w1") && !line.contains("label_tier"), "{}", line);
        }

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_info_mappings_project_fields() {
        let (source, handler) = setup();
        let mut bucket = object("b1", "", json!({}), "True", "True");
        bucket["spec"] = json!({"forProvider": {"region": "eu-west-1"}});
        source.apply(&ResourceIdentity::cluster_scoped(buckets()), bucket);

        let mappings = vec![
            managed_metrics::InfoMapping::new("spec.forProvider.region", "region").unwrap(),
            managed_metrics::InfoMapping::new("spec.forProvider.zone", "zone").unwrap(),
        ];
        handler
            .register_and_add_metric_store_for_gvr("bucket", buckets(), "", mappings)
            .unwrap();
        eventually(|| scrape(&handler).contains("b1")).await;

        assert!(scrape(&handler)
            .contains("bucket_info{name=\"b1\",region=\"eu-west-1\",zone=\"\"} 1\n"));

        handler.shutdown().await;
    }
}

// =============================================================================
// Runtime Registration
// =============================================================================

mod registration_tests {
    use super::*;

    #[tokio::test]
    async fn test_removed_series_is_not_rendered() {
        let (source, handler) = setup();
        source.apply(
            &ResourceIdentity::cluster_scoped(widgets()),
            object("w1", "", json!({}), "True", "True"),
        );
        source.apply(
            &ResourceIdentity::cluster_scoped(buckets()),
            object("b1", "", json!({}), "True", "True"),
        );

        let token = handler
            .register_and_add_metric_store_for_gvr("widget", widgets(), "", vec![])
            .unwrap();
        handler
            .register_and_add_metric_store_for_gvr("bucket", buckets(), "", vec![])
            .unwrap();
        eventually(|| {
            let text = scrape(&handler);
            text.contains("w1") && text.contains("b1")
        })
        .await;

        assert!(handler.remove_metric_store("widget"));
        assert!(token.is_cancelled());

        let text = scrape(&handler);
        assert!(!text.contains("widget"));
        assert!(text.contains("bucket{name=\"b1\"} 1\n"));
        assert_eq!(handler.series_names(), vec!["bucket"]);

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_reregistration_replaces_store() {
        let (source, handler) = setup();
        source.apply(
            &ResourceIdentity::cluster_scoped(widgets()),
            object("w1", "", json!({}), "True", "True"),
        );
        source.apply(
            &ResourceIdentity::cluster_scoped(buckets()),
            object("b1", "", json!({}), "True", "True"),
        );

        let first = handler
            .register_and_add_metric_store_for_gvr("thing", widgets(), "", vec![])
            .unwrap();
        eventually(|| scrape(&handler).contains("w1")).await;

        handler
            .register_and_add_metric_store_for_gvr("thing", buckets(), "", vec![])
            .unwrap();
        assert!(first.is_cancelled());
        eventually(|| scrape(&handler).contains("b1")).await;

        let text = scrape(&handler);
        assert!(!text.contains("w1"));
        assert_eq!(text.matches("# TYPE thing gauge\n").count(), 1);

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_watch_updates_reach_scrape() {
        let (source, handler) = setup();
        let identity = ResourceIdentity::cluster_scoped(widgets());
        handler
            .register_and_add_metric_store_for_gvr("widget", widgets(), "", vec![])
            .unwrap();
        eventually(|| source.active_watches() == 1).await;
        assert_eq!(scrape(&handler), "");

        source.apply(&identity, object("w1", "", json!({}), "False", "True"));
        eventually(|| scrape(&handler).contains("widget_ready{name=\"w1\"} 0\n")).await;

        source.apply(&identity, object("w1", "", json!({}), "True", "True"));
        eventually(|| scrape(&handler).contains("widget_ready{name=\"w1\"} 1\n")).await;

        source.remove(&identity, "w1");
        eventually(|| scrape(&handler).is_empty()).await;

        handler.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_data_survives_api_outage() {
        let (source, handler) = setup();
        let identity = ResourceIdentity::cluster_scoped(widgets());
        source.apply(&identity, object("w1", "", json!({}), "True", "True"));

        handler
            .register_and_add_metric_store_for_gvr("widget", widgets(), "", vec![])
            .unwrap();
        eventually(|| source.active_watches() == 1).await;

        source.fail_next_lists(3);
        source.expire_watches();
        eventually(|| handler.telemetry().list_failures_total("widget") == 3).await;

        // Failed relists keep the last materialized state.
        assert!(scrape(&handler).contains("widget{name=\"w1\"} 1\n"));

        handler.shutdown().await;
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod config_tests {
    use super::*;

    #[tokio::test]
    async fn test_config_registers_every_resource() {
        let config = ExporterConfig::from_yaml_str(
            r#"
resources:
  - name: widget
    group: example.org
    version: v1
    resource: widgets
  - name: bucket
    group: s3.aws.upbound.io
    version: v1beta1
    resource: buckets
    namespace: infra
    infoMappings:
      - fieldPath: "metadata.labels['app.kubernetes.io/name']"
        label: app
"#,
        )
        .unwrap();

        let source = Arc::new(InMemoryResourceSource::new());
        let handler = ManagedMetricsHandler::new(
            source.clone(),
            config.sync_config(0),
            ExporterMetrics::new().unwrap(),
        );
        for resource in &config.resources {
            handler
                .register_and_add_metric_store_for_gvr(
                    &resource.name,
                    resource.gvr(),
                    &resource.namespace,
                    resource.info_mappings().unwrap(),
                )
                .unwrap();
        }
        assert_eq!(handler.series_names(), vec!["infra_bucket", "widget"]);

        source.apply(
            &ResourceIdentity::new(buckets(), "infra"),
            object(
                "b1",
                "infra",
                json!({"app.kubernetes.io/name": "billing"}),
                "True",
                "True",
            ),
        );
        eventually(|| {
            scrape(&handler).contains(
                "infra_bucket_info{name=\"b1\",namespace=\"infra\",app=\"billing\"} 1\n",
            )
        })
        .await;
        assert!(scrape(&handler).contains(concat!(
            "infra_bucket_labels{name=\"b1\",namespace=\"infra\",",
            "label_app_kubernetes_io_name=\"billing\"} 1\n",
        )));

        handler.shutdown().await;
    }
}
