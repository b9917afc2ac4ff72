//! Connection handling.
//!
//! The accept loop hands every new socket to its own task, which finishes
//! the transport handshake under a deadline. That task registers with the hub, then pumps in both directions: inbound
//! messages go to the hub, and whatever the hub queued in the connection's
//! outbox goes to the socket. When either side ends, the task reports the
//! disconnect to the hub once and closes the socket.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tenvis_relay_core::{Admission, HubHandle, Outbound, Outbox};
use tenvis_relay_transport::{
    Connection, PendingConnection, Transport, TransportError, WebSocketConfig,
    WebSocketTransport,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, TagLabels};

/// Shared settings for every connection task.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Hub the connections join.
    pub hub: HubHandle,
    /// Outbox capacity per connection.
    pub outbound_buffer: usize,
    /// Deadline for the transport handshake.
    pub handshake_timeout: Duration,
    /// Tag label values for inbound metrics.
    pub tags: Arc<TagLabels>,
}

impl ConnectionContext {
    /// Context for a hub using the configured limits.
    #[must_use]
    pub fn new(config: &Config, hub: HubHandle) -> Self {
        Self {
            hub,
            outbound_buffer: config.limits.outbound_buffer,
            handshake_timeout: config.handshake_timeout(),
            tags: Arc::new(TagLabels::new()),
        }
    }
}

/// Bind the WebSocket listener and serve until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: &Config, hub: HubHandle) -> Result<()> {
    let addr = config.bind_addr()?;
    let transport = WebSocketTransport::new(WebSocketConfig {
        bind_addr: addr,
        max_message_size: config.limits.max_message_size,
    })
    .await
    .with_context(|| format!("Failed to listen on {}", addr))?;

    info!("Relay listening on ws://{}", addr);

    accept_loop(&transport, ConnectionContext::new(config, hub)).await;
    Ok(())
}

/// Accept connections forever, one task per connection.
///
/// Handshakes run in the spawned task, never in this loop.
pub async fn accept_loop(transport: &dyn Transport, ctx: ConnectionContext) {
    loop {
        match transport.accept().await {
            Ok(pending) => {
                tokio::spawn(establish(pending, ctx.clone()));
            }
            Err(TransportError::Io(e)) => {
                // Usually descriptor exhaustion; back off instead of spinning.
                warn!(transport = transport.name(), error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                debug!(transport = transport.name(), error = %e, "Connection setup failed");
            }
        }
    }
}

/// Finish the handshake, then serve the connection.
async fn establish(pending: PendingConnection, ctx: ConnectionContext) {
    match timeout(ctx.handshake_timeout, pending).await {
        Ok(Ok(conn)) => serve_connection(conn, ctx).await,
        Ok(Err(e)) => debug!(error = %e, "Handshake failed"),
        Err(_) => debug!(
            timeout_ms = ctx.handshake_timeout.as_millis() as u64,
            "Handshake timed out"
        ),
    }
}

/// Drive one connection from admission to disconnect.
pub async fn serve_connection(mut conn: Box<dyn Connection>, ctx: ConnectionContext) {
    let ConnectionContext {
        hub,
        outbound_buffer,
        tags,
        ..
    } = ctx;
    let (outbox, mut outbound) = Outbox::channel(outbound_buffer);

    let (key, identity) = match hub.connect(outbox).await {
        Ok(Admission::Admitted { key, identity }) => (key, identity),
        Ok(Admission::Rejected) => {
            metrics::record_rejection();
            debug!(connection = %conn.id(), "Rejected: no free identity");
            let _ = conn.close().await;
            return;
        }
        Err(e) => {
            warn!(connection = %conn.id(), error = %e, "Hub unavailable");
            let _ = conn.close().await;
            return;
        }
    };

    let _metrics_guard = ConnectionMetricsGuard::new();
    debug!(
        connection = %conn.id(),
        identity = %identity,
        remote = conn.remote_addr().as_deref().unwrap_or("-"),
        "Connection admitted"
    );

    loop {
        tokio::select! {
            inbound = conn.recv() => match inbound {
                Ok(Some(message)) => {
                    metrics::record_inbound(&tags, &message);
                    if hub.message(key, message).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(identity = %identity, error = %e, "Receive failed");
                    break;
                }
            },

            item = outbound.recv() => match item {
                Some(Outbound::Message(message)) => {
                    if let Err(e) = conn.send(message).await {
                        debug!(identity = %identity, error = %e, "Send failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
        }
    }

    if let Err(e) = hub.disconnect(key).await {
        debug!(identity = %identity, error = %e, "Disconnect not delivered");
    }
    let _ = conn.close().await;

    debug!(identity = %identity, "Connection closed");
}
