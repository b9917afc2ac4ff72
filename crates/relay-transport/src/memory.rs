//! In-process transport.
//!
//! [`pair`] returns two connected ends; whatever one side sends the other
//! receives, and closing one side ends the other's stream. Used to drive the
//! server's connection handling in tests without sockets.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, TransportError};

/// One end of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

/// Create two connected ends.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();

    let a = MemoryConnection {
        id: ConnectionId::generate(),
        tx: Some(a_tx),
        rx: a_rx,
    };
    let b = MemoryConnection {
        id: ConnectionId::generate(),
        tx: Some(b_tx),
        rx: b_rx,
    };
    (a, b)
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.tx.is_none() {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(message).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (mut a, mut b) = pair();

        a.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), Some(Bytes::from_static(b"ping")));

        b.send(Bytes::from_static(b"pong")).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), Some(Bytes::from_static(b"pong")));
    }

    #[tokio::test]
    async fn test_close_ends_peer_stream() {
        let (mut a, mut b) = pair();
        assert!(a.is_open());

        a.close().await.unwrap();
        a.close().await.unwrap();

        assert!(!a.is_open());
        assert_eq!(b.recv().await.unwrap(), None);
        assert!(b.send(Bytes::from_static(b"late")).await.is_err());
        assert_eq!(a.recv().await.unwrap(), None);
    }
}
