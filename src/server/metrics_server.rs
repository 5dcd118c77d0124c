// src/server/metrics_server.rs

//! A minimal standalone HTTP server exposing `/metrics` in the Prometheus
//! text exposition format. Unlike a poll-at-scrape-time design, our gauges
//! and counters are updated inline at their call sites (see `core::metrics`),
//! so this handler only needs to encode whatever is currently registered.

use std::net::SocketAddr;

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::core::metrics::gather_metrics;

async fn metrics_handler() -> impl IntoResponse {
    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs the metrics server until `shutdown_rx` fires.
pub async fn run_metrics_server(addr: SocketAddr, mut shutdown_rx: broadcast::Receiver<()>) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    info!(%addr, "goahead metrics server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "failed to bind metrics server");
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("metrics server shutting down");
        })
        .await
        .unwrap_or_else(|e| error!(error = %e, "metrics server exited with error"));
}
