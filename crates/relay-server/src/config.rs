//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (RELAY_HOST, RELAY_PORT) as defaults
//! - TOML configuration file
//! - Command line arguments, which win over both

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tenvis_relay_core::{IdentityMode, DEFAULT_CAPACITY, DEFAULT_OUTBOX_CAPACITY};

use crate::cli::Cli;

const CONFIG_PATHS: [&str; 3] = [
    "relay.toml",
    "/etc/relay/relay.toml",
    "~/.config/relay/relay.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Status output.
    #[serde(default)]
    pub status: StatusConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Identity assignment policy as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityModeSetting {
    /// Reusable slots `1..=max_connections`.
    #[default]
    Bounded,
    /// Counter-based identities, no connection limit.
    Unbounded,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Identity policy.
    #[serde(default)]
    pub identity_mode: IdentityModeSetting,

    /// Number of identity slots (bounded mode).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Messages queued per connection before deliveries are dropped.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Time a new socket gets to finish the WebSocket handshake.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

/// Status output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Draw the terminal status view.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refresh interval in milliseconds (default depends on identity mode).
    #[serde(default)]
    pub interval_ms: Option<u64>,

    /// Serve `/health` and `/status` on this port.
    #[serde(default)]
    pub http_port: Option<u16>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_outbound_buffer() -> usize {
    DEFAULT_OUTBOX_CAPACITY
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            status: StatusConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            identity_mode: IdentityModeSetting::default(),
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            outbound_buffer: default_outbound_buffer(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: None,
            http_port: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration for a command line invocation.
    ///
    /// Uses `--config` if given, otherwise the first file found on the
    /// search path, otherwise defaults; then applies the remaining flags.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn for_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(shellexpand::tilde(&path.to_string_lossy()).as_ref())?,
            None => Self::load()?,
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Load configuration from the search path or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlay command line flags.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(host) = &cli.host {
            self.host.clone_from(host);
        }
        if let Some(max) = cli.max_connections {
            self.limits.identity_mode = IdentityModeSetting::Bounded;
            self.limits.max_connections = max;
        }
        if cli.unbounded {
            self.limits.identity_mode = IdentityModeSetting::Unbounded;
        }
        if let Some(interval) = cli.status_interval_ms {
            self.status.interval_ms = Some(interval);
        }
        if cli.no_status {
            self.status.enabled = false;
        }
    }

    /// Identity policy for the hub.
    #[must_use]
    pub fn identity_mode(&self) -> IdentityMode {
        match self.limits.identity_mode {
            IdentityModeSetting::Bounded => IdentityMode::Bounded {
                capacity: self.limits.max_connections,
            },
            IdentityModeSetting::Unbounded => IdentityMode::Unbounded,
        }
    }

    /// Status refresh interval: 100 ms bounded, 10 ms unbounded unless set.
    #[must_use]
    pub fn status_interval(&self) -> Duration {
        let default_ms = match self.limits.identity_mode {
            IdentityModeSetting::Bounded => 100,
            IdentityModeSetting::Unbounded => 10,
        };
        Duration::from_millis(self.status.interval_ms.unwrap_or(default_ms).max(1))
    }

    /// Time a new socket gets to complete its handshake.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.handshake_timeout_ms.max(1))
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` does not resolve.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("No address for {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.identity_mode, IdentityModeSetting::Bounded);
        assert_eq!(config.limits.max_connections, 8);
        assert_eq!(config.limits.outbound_buffer, 1024);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert!(config.status.enabled);
        assert_eq!(config.status.http_port, None);
        assert_eq!(
            config.identity_mode(),
            IdentityMode::Bounded { capacity: 8 }
        );
        assert_eq!(config.status_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_bind_addr() {
        let mut config = Config::default();
        config.host = "127.0.0.1".to_string();
        config.port = 8080;
        assert_eq!(config.bind_addr().unwrap(), SocketAddr::from(([127, 0, 0, 1], 8080)));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            identity_mode = "unbounded"
            max_message_size = 1024
            handshake_timeout_ms = 250

            [status]
            enabled = false
            http_port = 9100
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.identity_mode(), IdentityMode::Unbounded);
        assert_eq!(config.limits.max_message_size, 1024);
        assert_eq!(config.handshake_timeout(), Duration::from_millis(250));
        assert_eq!(config.status_interval(), Duration::from_millis(10));
        assert!(!config.status.enabled);
        assert_eq!(config.status.http_port, Some(9100));
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config: Config = toml::from_str(
            r#"
            port = 9000
            [limits]
            identity_mode = "unbounded"
            "#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "relay",
            "7000",
            "--max-connections",
            "3",
            "--status-interval-ms",
            "50",
            "--no-status",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.port, 7000);
        assert_eq!(config.identity_mode(), IdentityMode::Bounded { capacity: 3 });
        assert_eq!(config.status_interval(), Duration::from_millis(50));
        assert!(!config.status.enabled);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::from_file("/nonexistent/relay.toml").is_err());
    }
}
