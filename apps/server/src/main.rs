//! SlimHub Server - headless jukebox server for Squeezebox-family players.
//!
//! Runs the SlimProto listener, the UDP discovery responder and the HTTP API
//! on a single event loop until interrupted.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use slimhub_core::bootstrap_services;
use tokio::signal;

use crate::config::ServerConfig;

/// SlimHub Server - drives Squeezebox players from one synchronized source.
#[derive(Parser, Debug)]
#[command(name = "slimhub-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SLIMHUB_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind address (overrides config file).
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// HTTP port (overrides config file).
    #[arg(short = 'p', long)]
    http_port: Option<u16>,

    /// Name announced to players (overrides config file).
    #[arg(short = 'n', long)]
    name: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("SlimHub Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(name) = args.name {
        config.hostname = Some(name);
    }

    log::info!(
        "Configuration: bind={}, slimproto={}, discovery={}, http={}",
        config.bind_address,
        config.slimproto_port,
        config.discovery_port,
        config.http_port
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;
    services
        .start_background_tasks()
        .await
        .context("Failed to start listeners")?;

    log::info!("Background tasks started");

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    services.shutdown().await;

    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
