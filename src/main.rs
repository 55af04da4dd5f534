//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────▶ axum server ──▶ route table ──▶ stage chain ───────────────▶ endpoint
//!                                             request_id                    forward → user/order service
//!                                             cors (preflight ends here)    health
//!                                             rate_limit (429)
//!                                             auth (401) / role (403)
//!     Client Response
//!     ◀────── backend status, headers and body streamed back unchanged
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::load_config;
use edge_gateway::lifecycle::signals::spawn_signal_listener;
use edge_gateway::observability::{logging, metrics};
use edge_gateway::{GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-gateway")]
#[command(about = "Edge gateway: rate limiting, token verification and reverse proxy", long_about = None)]
struct Args {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // The subscriber depends on the config, so load errors go to stderr.
    let loaded = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let config = loaded.config;

    logging::init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");

    match &loaded.config_file {
        Some(path) => tracing::info!(path = %path.display(), "Loaded config file"),
        None => tracing::debug!("No config file given, using defaults"),
    }
    match &loaded.dotenv_file {
        Some(path) => tracing::info!(path = %path.display(), "Loaded .env file"),
        None => tracing::debug!("No .env file found, using process environment"),
    }

    if config.auth.uses_default_secret() {
        tracing::warn!("JWT_SECRET not set, using the development default secret");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        user_service = %config.upstreams.user_service_url,
        order_service = %config.upstreams.order_service_url,
        rate_limit_enabled = config.rate_limit.enabled,
        requests_per_second = config.rate_limit.requests_per_second,
        burst_size = config.rate_limit.burst_size,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(config)?;

    let shutdown = Arc::new(Shutdown::new());
    let receiver = shutdown.subscribe();
    spawn_signal_listener(shutdown.clone());

    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
