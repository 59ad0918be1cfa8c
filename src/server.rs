//! Operational HTTP server exposing liveness and Prometheus metrics.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;

/// Install the process-wide Prometheus recorder. Returns `None` when a
/// recorder is already installed (only possible in tests).
pub fn install_metrics_recorder() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

pub async fn run_ops_server(
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
    token: CancellationToken,
) {
    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.map(|handle| handle.render()).unwrap_or_default() }
            }),
        );

    tracing::info!(addr = %addr, "Starting ops server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %addr, error = %err, "Failed to bind ops server");
            return;
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
    {
        tracing::error!(error = %err, "Ops server failed");
    }
}
