//! HTTP endpoints
//!
//! Two plain HTTP/1 servers: the scrape endpoint rendering every registered
//! store, and the health endpoint that also carries the exporter's own
//! telemetry.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::handler::ManagedMetricsHandler;
use crate::telemetry::ExporterMetrics;

/// Content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    text_response(StatusCode::NOT_FOUND, "text/plain", "not found")
}

fn internal_error(message: String) -> Response<Full<Bytes>> {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", message)
}

/// Render one scrape of every registered store.
pub fn serve_metrics(handler: &ManagedMetricsHandler) -> Response<Full<Bytes>> {
    let mut body = Vec::new();
    match handler.render(&mut body) {
        Ok(()) => text_response(StatusCode::OK, EXPOSITION_CONTENT_TYPE, body),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            internal_error(format!("failed to render metrics: {}", e))
        }
    }
}

fn route_metrics(path: &str, handler: &ManagedMetricsHandler) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => serve_metrics(handler),
        _ => not_found(),
    }
}

fn route_health(path: &str, telemetry: &ExporterMetrics) -> Response<Full<Bytes>> {
    match path {
        "/healthz" | "/livez" | "/readyz" => text_response(StatusCode::OK, "text/plain", "ok"),
        "/metrics" => match telemetry.encode() {
            Ok(text) => text_response(StatusCode::OK, EXPOSITION_CONTENT_TYPE, text),
            Err(e) => internal_error(format!("failed to encode telemetry: {}", e)),
        },
        _ => not_found(),
    }
}

async fn bind(addr: &str, server: &str) -> Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid {} server address: {}", server, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", server, e)))?;

    info!("{} server listening on {}", server, addr);
    Ok(listener)
}

/// Serve connections from `listener` with `route` until `cancel` fires.
async fn serve<F>(
    listener: TcpListener,
    server: &'static str,
    route: F,
    cancel: CancellationToken,
) -> Result<()>
where
    F: Fn(&str) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(server, "Server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("{} server accept error: {}", server, e)))?,
        };

        let io = TokioIo::new(stream);
        let route = route.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = route(req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(server, peer = %peer, "Connection error: {}", e);
            }
        });
    }
}

/// Serve `/metrics` for every store registered on `handler`.
pub async fn run_metrics_server(
    addr: &str,
    handler: Arc<ManagedMetricsHandler>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(addr, "Metrics").await?;
    let route = move |path: &str| route_metrics(path, &handler);
    serve(listener, "metrics", route, cancel).await
}

/// Serve liveness, readiness and the exporter's own telemetry.
pub async fn run_health_server(
    addr: &str,
    telemetry: ExporterMetrics,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(addr, "Health").await?;
    let route = move |path: &str| route_health(path, &telemetry);
    serve(listener, "health", route, cancel).await
}
