//! Transport abstraction traits.
//!
//! A transport yields connections; a connection carries whole messages as
//! raw bytes. Framing, pings and handshakes stay inside the implementation.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of an accepted socket, used in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Inbound message exceeds the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Handshake with the peer failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A connection whose protocol handshake has not run yet.
///
/// Awaiting it performs the handshake. Callers drive it outside the accept
/// loop, typically under a timeout, so a silent peer cannot hold up others.
pub type PendingConnection =
    Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, TransportError>> + Send>>;

/// A transport that can accept connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept the next raw connection.
    ///
    /// Returns as soon as a peer has connected; the handshake happens when
    /// the returned [`PendingConnection`] is awaited.
    async fn accept(&self) -> Result<PendingConnection, TransportError>;

    /// Transport name (e.g., "websocket").
    fn name(&self) -> &'static str;
}

/// An active connection over a transport.
#[async_trait]
pub trait Connection: Send {
    /// The connection's identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next message.
    ///
    /// Returns `None` once the peer has closed the connection cleanly.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Send one message.
    async fn send(&mut self, message: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Remote address, if the transport has one.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_str() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.to_string(), "test-id");
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::MessageTooLarge { size: 10, max: 4 };
        assert_eq!(err.to_string(), "Message too large: 10 bytes (max: 4)");
    }
}
