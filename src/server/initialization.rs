// src/server/initialization.rs

//! Handles the complete server initialization process: configuration is
//! already loaded by the caller, so this module resolves cluster settings,
//! builds the engine context, replays any in-flight restarts, and sets up
//! the HTTPS (optionally mutual-TLS) listener.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum_server::tls_rustls::RustlsConfig;
use rustls::RootCertStore;
use rustls::server::WebPkiClientVerifier;
use rustls_pemfile::{certs, private_key};

use super::context::ServerContext;
use crate::config::Config;
use crate::core::context::EngineContext;
use crate::core::recovery;
use crate::core::registry::ClusterRegistry;
use crate::core::store::StateStore;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let cluster_settings = crate::config::load_cluster_settings(&config.include_dir)
        .context("failed to load cluster settings")?;
    info!(clusters = cluster_settings.len(), "loaded cluster settings");

    let registry = ClusterRegistry::new(cluster_settings);
    let store = StateStore::new(config.save_state_dir.clone());
    let engine = Arc::new(EngineContext::new(registry, store, config.timeout));

    recovery::recover_sleeping_watchers(&engine);

    let server_config = build_tls_server_config(&config)?;
    let tls_config = RustlsConfig::from_config(Arc::new(server_config));

    let addr: SocketAddr = format!("{}:{}", config.listen_address, config.listen_port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address '{}:{}'",
                config.listen_address, config.listen_port
            )
        })?;
    info!(%addr, "goahead listening");

    let metrics_addr = if config.metrics.enabled {
        Some(
            format!("{}:{}", config.listen_address, config.metrics.port)
                .parse()
                .with_context(|| format!("invalid metrics address on port {}", config.metrics.port))?,
        )
    } else {
        None
    };

    Ok(ServerContext {
        engine,
        addr,
        tls_config,
        metrics_addr,
    })
}

/// Builds the rustls server config, wiring in client-certificate
/// verification against the configured CA bundle when mutual TLS is
/// required. Minimum TLS version is whatever rustls's safe default
/// provider negotiates, which is TLS 1.2 and up.
fn build_tls_server_config(config: &Config) -> Result<rustls::ServerConfig> {
    let certs = load_certs(&config.tls.certificate_file)?;
    let key = load_key(&config.tls.private_key)?;

    let server_config = if config.tls.require_and_verify_client_cert {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(&config.tls.client_cert_ca_file)? {
            roots
                .add(cert)
                .map_err(|e| anyhow!("invalid CA certificate in client_cert_ca_file: {e}"))?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| anyhow!("failed to build client certificate verifier: {e}"))?;
        rustls::ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?
    } else {
        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?
    };

    Ok(server_config)
}

fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file =
        File::open(path).map_err(|e| anyhow!("failed to open certificate file '{path}': {e}"))?;
    let mut cert_reader = BufReader::new(cert_file);
    let parsed = certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if parsed.is_empty() {
        return Err(anyhow!("no certificates found in '{path}'"));
    }
    Ok(parsed)
}

fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file =
        File::open(path).map_err(|e| anyhow!("failed to open private key file '{path}': {e}"))?;
    let mut key_reader = BufReader::new(key_file);
    private_key(&mut key_reader)?.ok_or_else(|| anyhow!("no private key found in '{path}'"))
}

fn log_startup_info(config: &Config) {
    info!(
        include_dir = %config.include_dir,
        save_state_dir = %config.save_state_dir.display(),
        mutual_tls = config.tls.require_and_verify_client_cert,
        "goahead configuration resolved"
    );
}
