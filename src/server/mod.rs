// src/server/mod.rs

//! Wires configuration, the engine context, and the HTTPS transport
//! together and runs the listener to completion.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;

mod context;
mod initialization;
mod metrics_server;
mod routes;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    let server_context = initialization::setup(config).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    if let Some(metrics_addr) = server_context.metrics_addr {
        let metrics_shutdown = shutdown_tx.subscribe();
        tokio::spawn(metrics_server::run_metrics_server(metrics_addr, metrics_shutdown));
    }

    let app = routes::router(server_context.engine.clone());
    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), shutdown_tx));

    info!(addr = %server_context.addr, "accepting connections");
    axum_server::bind_rustls(server_context.addr, server_context.tls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn shutdown_signal(handle: axum_server::Handle, shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(());
    handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
}
