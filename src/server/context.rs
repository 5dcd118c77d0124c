// src/server/context.rs

//! Bundles everything the transport layer needs to accept connections and
//! serve requests: the shared engine context, the bound listener address,
//! and the resolved TLS configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;

use crate::core::context::EngineContext;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub engine: Arc<EngineContext>,
    pub addr: SocketAddr,
    pub tls_config: RustlsConfig,
    pub metrics_addr: Option<SocketAddr>,
}
