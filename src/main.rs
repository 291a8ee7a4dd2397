//! Managed Metrics Exporter
//!
//! Exposes Prometheus metrics for Crossplane managed resources.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Managed Metrics Exporter                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ Synchronizer │───▶│    Store     │───▶│   Registry   │──▶ /metrics
//! │  │ (list+watch) │    │  (families)  │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use managed_metrics::adapters::KubeResourceSource;
use managed_metrics::error::{Error, Result};
use managed_metrics::server::{run_health_server, run_metrics_server};
use managed_metrics::{ExporterConfig, ExporterMetrics, ManagedMetricsHandler};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Managed Metrics - Prometheus metrics for Crossplane managed resources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Resource configuration file (YAML)
    #[arg(long, env = "MANAGED_METRICS_CONFIG")]
    config: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Periodic relist interval in seconds (0 disables)
    #[arg(long, env = "RESYNC_SECONDS", default_value = "0")]
    resync_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Managed Metrics Exporter {}", managed_metrics::version());
    info!("  Metrics address: {}", args.metrics_addr);
    info!("  Health address: {}", args.health_addr);

    let config = match &args.config {
        Some(path) => {
            info!("  Config file: {}", path.display());
            ExporterConfig::load(path)?
        }
        None => {
            warn!("No config file given, no resources will be exported");
            ExporterConfig::default()
        }
    };
    let sync_config = config.sync_config(args.resync_seconds);
    info!("  Resync period: {:?}", sync_config.resync_period);

    let client = Client::try_default().await.map_err(|e| {
        error!("Failed to create Kubernetes client: {}", e);
        Error::Internal(format!("Kubernetes client creation failed: {}", e))
    })?;

    info!("Connected to Kubernetes cluster");

    let telemetry = ExporterMetrics::new()?;
    let handler = Arc::new(ManagedMetricsHandler::new(
        Arc::new(KubeResourceSource::new(client)),
        sync_config,
        telemetry.clone(),
    ));

    for resource in &config.resources {
        handler.register_and_add_metric_store_for_gvr(
            &resource.name,
            resource.gvr(),
            &resource.namespace,
            resource.info_mappings()?,
        )?;
    }
    info!("Exporting {} resource types", handler.series_names().len());

    let servers = CancellationToken::new();

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_cancel = servers.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, telemetry, health_cancel).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_handler = handler.clone();
    let metrics_cancel = servers.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics_handler, metrics_cancel).await {
            error!("Metrics server error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    servers.cancel();
    handler.shutdown().await;

    info!("Exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
