//! Per-connection outbound sink.
//!
//! The hub never writes to a socket itself. Each admitted connection hands the
//! hub an [`Outbox`]; the connection's own task drains the matching
//! [`OutboxReceiver`] and writes to the transport.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default outbox depth per connection.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 1024;

/// Items queued for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to write as one message.
    Message(Bytes),
    /// Close the connection.
    Close,
}

/// Delivery failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The outbox is full; the recipient is not keeping up.
    #[error("Outbox full")]
    Full,

    /// The receiving side is gone.
    #[error("Outbox closed")]
    Closed,
}

/// Receiving half of an outbox.
pub type OutboxReceiver = mpsc::Receiver<Outbound>;

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    /// Create an outbox holding at most `capacity` pending items.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the outbox is full or closed.
    pub fn deliver(&self, message: Bytes) -> Result<(), SinkError> {
        self.tx
            .try_send(Outbound::Message(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => SinkError::Full,
                TrySendError::Closed(_) => SinkError::Closed,
            })
    }

    /// Ask the connection task to close the connection.
    ///
    /// Best effort: if the outbox is full or gone the request is dropped.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    /// Check whether the receiving side still exists.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbox_deliver() {
        let (outbox, mut rx) = Outbox::channel(4);
        outbox.deliver(Bytes::from_static(b"hello")).unwrap();
        outbox.close();

        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Message(Bytes::from_static(b"hello"))
        );
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[test]
    fn test_outbox_full() {
        let (outbox, _rx) = Outbox::channel(1);
        outbox.deliver(Bytes::from_static(b"a")).unwrap();
        assert_eq!(outbox.deliver(Bytes::from_static(b"b")), Err(SinkError::Full));
    }

    #[test]
    fn test_outbox_closed() {
        let (outbox, rx) = Outbox::channel(DEFAULT_OUTBOX_CAPACITY);
        drop(rx);
        assert!(!outbox.is_open());
        assert_eq!(outbox.deliver(Bytes::from_static(b"a")), Err(SinkError::Closed));
    }
}
