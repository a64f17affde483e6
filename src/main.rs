//! Engine proxy binary.
//!
//! ```text
//!                    ┌───────────────────────────────────────────┐
//!                    │                ENGINE PROXY                │
//!   Client ──────────┼─▶ http server ─▶ internal handlers ──┐    │
//!                    │        │              │               │    │
//!                    │        │         licensing state      │    │
//!                    │        ▼              │               ▼    │
//!                    │   forward / ws   engine supervisor ─▶ spawner ─▶ Engine
//!                    │     bridge  ◀──── snapshot()              │   Process
//!                    └───────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use engine_proxy::config::{load_config, ProxyConfig};
use engine_proxy::engine::{EngineSupervisor, ProcessSpawner};
use engine_proxy::http::HttpServer;
use engine_proxy::licensing::{HostedExchangeClient, LicensingState};
use engine_proxy::lifecycle::Shutdown;
use engine_proxy::observability;

/// Reverse proxy and process supervisor for a licensed compute engine.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "engine-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        engine_command = %config.engine.command,
        engine_address = %config.engine.address,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let spawner = Arc::new(ProcessSpawner::new(config.engine.log_buffer_lines));
    let supervisor = EngineSupervisor::new(
        config.engine.clone(),
        Duration::from_secs(config.timeouts.connect_secs),
        spawner,
    );
    let exchange = Arc::new(HostedExchangeClient::new(
        config.licensing.exchange_url.clone(),
        Duration::from_secs(config.licensing.exchange_timeout_secs),
    )?);
    let licensing = LicensingState::new(exchange);
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for connections");

    let server = HttpServer::new(
        config,
        supervisor.clone(),
        licensing,
        shutdown.clone(),
    );
    server.run(listener, shutdown).await?;

    // The listener is gone; make sure the engine process does not outlive us.
    supervisor.stop().await;
    tracing::info!("shutdown complete");
    Ok(())
}
