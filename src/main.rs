// src/main.rs

//! The main entry point for the goahead reboot-coordination service.

use std::env;

use anyhow::Result;
use goahead::config::Config;
use goahead::server;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("goahead version {VERSION}");
        return Ok(());
    }

    let debug = args.contains(&"--debug".to_string());

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if debug {
            "debug".to_string()
        } else {
            config.log_level.clone()
        }
    });

    // The reload layer lets the log level be adjusted without a restart,
    // mirroring how the filter is wired elsewhere; nothing currently
    // triggers a reload since this service's only external surface is the
    // documented HTTP endpoints.
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    if let Err(e) = server::run(config).await {
        error!("server runtime error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}
