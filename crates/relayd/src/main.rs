//! # relayd
//!
//! Relay broadcast server binary — wires the hub and transport together
//! and runs until interrupted.

#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_hub::RelayHub;
use relay_server::config::ServerConfig;
use relay_server::metrics::install_recorder;
use relay_server::server::RelayServer;
use tracing_subscriber::EnvFilter;

/// Relay broadcast server.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Relay broadcast server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Maximum concurrent WebSocket connections.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Per-connection outbound channel capacity.
    #[arg(long)]
    channel_capacity: Option<usize>,
}

impl Cli {
    fn into_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host,
            port: self.port,
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            channel_capacity: self.channel_capacity.unwrap_or(defaults.channel_capacity),
            ..defaults
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_logging();
    let metrics = install_recorder();

    let config = args.into_config();
    let hub = Arc::new(RelayHub::new());
    let server = RelayServer::new(config, hub, metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("relayd listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if server.shutdown().graceful_shutdown(vec![handle], None).await {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown timed out with sessions still draining");
    }
    Ok(())
}
