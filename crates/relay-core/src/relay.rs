//! Broadcast relay.
//!
//! Forwards a message from one connection to every other admitted
//! connection. Delivery is best effort: a recipient whose outbox is full or
//! closed simply misses that message, and the loop carries on with the rest.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, trace};

use crate::registry::{Connection, ConnectionKey, Registry};

/// Delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Messages queued to a recipient.
    pub delivered: u64,
    /// Messages a recipient missed (outbox full or closed).
    pub dropped: u64,
}

/// Fan-out engine.
#[derive(Debug, Default)]
pub struct Relay {
    stats: RelayStats,
}

impl Relay {
    /// Create a relay with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivery counters so far.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// Forward `message` unmodified to every admitted connection except the sender.
    ///
    /// Returns the number of recipients the message was queued for. A sender
    /// that is not (or no longer) registered relays nothing.
    pub fn relay(&mut self, registry: &Registry, sender: ConnectionKey, message: &Bytes) -> usize {
        let Some(origin) = registry.identity_of(sender) else {
            debug!(connection = %sender, "Relay from unregistered connection ignored");
            return 0;
        };

        let recipients = registry
            .members()
            .filter(|member| member.identity() != origin);
        let count = self.broadcast(recipients, message);

        trace!(identity = %origin, recipients = count, bytes = message.len(), "Relayed message");
        count
    }

    /// Deliver `message` to each of `recipients`.
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast<'a>(
        &mut self,
        recipients: impl IntoIterator<Item = &'a Connection>,
        message: &Bytes,
    ) -> usize {
        recipients
            .into_iter()
            .filter(|recipient| self.send_to(recipient, message.clone()))
            .count()
    }

    /// Deliver `message` to a single connection.
    ///
    /// Returns `false` if the recipient's outbox refused it.
    pub fn send_to(&mut self, recipient: &Connection, message: Bytes) -> bool {
        match recipient.outbox().deliver(message) {
            Ok(()) => {
                self.stats.delivered += 1;
                true
            }
            Err(e) => {
                self.stats.dropped += 1;
                debug!(identity = %recipient.identity(), error = %e, "Delivery dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{Outbound, Outbox, OutboxReceiver};
    use crate::registry::Admission;
    use crate::slots::IdentityMode;

    struct Peer {
        key: ConnectionKey,
        rx: OutboxReceiver,
    }

    fn received(rx: &mut OutboxReceiver) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(bytes) = item {
                out.push(bytes);
            }
        }
        out
    }

    fn join(registry: &mut Registry, relay: &mut Relay, depth: usize) -> Peer {
        let (outbox, mut rx) = Outbox::channel(depth);
        let Admission::Admitted { key, .. } = registry.admit(outbox, relay) else {
            panic!("admission failed");
        };
        received(&mut rx);
        Peer { key, rx }
    }

    #[test]
    fn test_relay_excludes_sender() {
        let mut registry = Registry::new(IdentityMode::default());
        let mut relay = Relay::new();
        let mut a = join(&mut registry, &mut relay, 16);
        let mut b = join(&mut registry, &mut relay, 16);
        let mut c = join(&mut registry, &mut relay, 16);
        received(&mut a.rx);
        received(&mut b.rx);

        let message = Bytes::from_static(b"chat||hi");
        assert_eq!(relay.relay(&registry, a.key, &message), 2);

        assert!(received(&mut a.rx).is_empty());
        assert_eq!(received(&mut b.rx), vec![message.clone()]);
        assert_eq!(received(&mut c.rx), vec![message]);
    }

    #[test]
    fn test_relay_preserves_sender_order() {
        let mut registry = Registry::new(IdentityMode::default());
        let mut relay = Relay::new();
        let a = join(&mut registry, &mut relay, 16);
        let mut b = join(&mut registry, &mut relay, 16);

        for i in 0..5 {
            relay.relay(&registry, a.key, &Bytes::from(format!("n||{i}")));
        }

        let got: Vec<_> = received(&mut b.rx)
            .into_iter()
            .map(|b| String::from_utf8(b.to_vec()).unwrap())
            .collect();
        assert_eq!(got, vec!["n||0", "n||1", "n||2", "n||3", "n||4"]);
    }

    #[test]
    fn test_failed_recipient_does_not_abort_broadcast() {
        let mut registry = Registry::new(IdentityMode::default());
        let mut relay = Relay::new();
        let a = join(&mut registry, &mut relay, 16);
        let b = join(&mut registry, &mut relay, 16);
        let mut c = join(&mut registry, &mut relay, 16);
        received(&mut c.rx);

        // b's task is gone but the transport has not reported the close yet
        drop(b.rx);

        let before = relay.stats();
        let message = Bytes::from_static(b"x");
        assert_eq!(relay.relay(&registry, a.key, &message), 1);
        assert_eq!(received(&mut c.rx), vec![message]);

        let after = relay.stats();
        assert_eq!(after.dropped - before.dropped, 1);
        assert_eq!(after.delivered - before.delivered, 1);
        // Still registered until the transport says otherwise
        assert_eq!(registry.len(), 3);
        assert!(!registry.get(relay_protocol::Identity::new(2)).unwrap().is_live());
    }

    #[test]
    fn test_full_outbox_drops_only_that_message() {
        let mut registry = Registry::new(IdentityMode::default());
        let mut relay = Relay::new();
        let a = join(&mut registry, &mut relay, 16);
        // The join already overflowed once: `connect||1` did not fit behind `self||2`
        let mut slow = join(&mut registry, &mut relay, 1);
        let dropped = relay.stats().dropped;

        relay.relay(&registry, a.key, &Bytes::from_static(b"first"));
        relay.relay(&registry, a.key, &Bytes::from_static(b"second"));

        assert_eq!(received(&mut slow.rx), vec![Bytes::from_static(b"first")]);
        assert_eq!(relay.stats().dropped - dropped, 1);
    }

    #[test]
    fn test_relay_from_unknown_sender() {
        let mut registry = Registry::new(IdentityMode::default());
        let mut relay = Relay::new();
        let gone = join(&mut registry, &mut relay, 4).key;
        let _other = join(&mut registry, &mut relay, 4);
        registry.remove(gone, &mut relay);

        assert_eq!(relay.relay(&registry, gone, &Bytes::from_static(b"late")), 0);
    }
}
