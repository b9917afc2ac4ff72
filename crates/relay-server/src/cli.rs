//! Command line arguments.

use clap::Parser;
use std::path::PathBuf;

/// Broadcast relay hub
#[derive(Parser, Debug, Default)]
#[command(name = "relay")]
#[command(about = "Relay every client message to every other connected client")]
#[command(version)]
pub struct Cli {
    /// Port to listen on (overrides the config file)
    pub port: Option<u16>,

    /// Configuration file (default: search relay.toml, /etc/relay, ~/.config/relay)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Number of identity slots
    #[arg(short, long, conflicts_with = "unbounded")]
    pub max_connections: Option<usize>,

    /// Hand out ever-increasing identities with no connection limit
    #[arg(long)]
    pub unbounded: bool,

    /// Status refresh interval in milliseconds
    #[arg(long)]
    pub status_interval_ms: Option<u64>,

    /// Disable the terminal status view
    #[arg(long)]
    pub no_status: bool,
}
