//! # Relay Server
//!
//! Broadcast relay hub: clients connect over WebSocket, get a small numeric
//! identity, hear about each other's joins and leaves, and receive every
//! message any other client sends.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on 8080 with 8 identity slots
//! relay
//!
//! # Listen on 9000
//! relay 9000
//!
//! # Counter identities, no connection limit
//! relay --unbounded
//!
//! # Run with custom config, no terminal view
//! relay --config /path/to/relay.toml --no-status
//!
//! # Run with environment variables
//! RELAY_PORT=8080 RELAY_HOST=0.0.0.0 relay
//! ```

mod cli;
mod config;
mod handlers;
mod http;
mod metrics;
mod view;

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tenvis_relay_core::{spawn_hub, HubConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Logs go to stderr; stdout belongs to the status view
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,tenvis_relay_core=info,tenvis_relay_transport=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::for_cli(&cli)?;
    let interval = config.status_interval();

    info!(
        "Starting relay on {}:{} ({:?})",
        config.host,
        config.port,
        config.identity_mode()
    );

    let (hub, _hub_task) = spawn_hub(HubConfig {
        identity_mode: config.identity_mode(),
        status_interval: interval,
        ..Default::default()
    });

    if config.metrics.enabled {
        metrics::init_metrics();
        match metrics::start_metrics_server(config.metrics.port) {
            Ok(()) => {
                tokio::spawn(metrics::export_deliveries(hub.status(), interval));
            }
            Err(e) => error!("Failed to start metrics server: {}", e),
        }
    }

    if let Some(port) = config.status.http_port {
        let addr = SocketAddr::new(config.bind_addr()?.ip(), port);
        let feed = hub.status();
        tokio::spawn(async move {
            if let Err(e) = http::serve(addr, feed).await {
                error!("Status endpoint failed: {:#}", e);
            }
        });
    }

    if config.status.enabled {
        let banner = view::banner(&config.host, config.port);
        let feed = hub.status();
        tokio::spawn(async move {
            if let Err(e) = view::run(feed, banner, interval).await {
                error!("Status view stopped: {}", e);
            }
        });
    }

    handlers::run_server(&config, hub).await
}
