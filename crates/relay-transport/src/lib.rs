//! # tenvis-relay-transport
//!
//! Transport abstraction for the relay hub.
//!
//! The hub is payload-agnostic: a transport only has to deliver whole
//! messages as raw bytes in both directions and report when a connection
//! closes.
//!
//! - **WebSocket** - The production transport (tokio-tungstenite)
//! - **Memory** - In-process connection pairs for tests
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Transport` and `Connection` traits,
//! allowing the server to be protocol-agnostic.
//!
//! ```rust,ignore
//! use tenvis_relay_transport::Connection;
//!
//! async fn echo(mut conn: Box<dyn Connection>) {
//!     while let Ok(Some(message)) = conn.recv().await {
//!         let _ = conn.send(message).await;
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, PendingConnection, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
