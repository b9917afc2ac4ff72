//! Connection registry.
//!
//! The registry owns the live set of connections. It admits new connections
//! through the slot allocator, announces joins and leaves to the other
//! members, and keeps two explicit indexes:
//!
//! - identity -> connection (ordered, so enumeration is ascending by identity)
//! - connection key -> identity
//!
//! A [`ConnectionKey`] is never reused, unlike identities in bounded mode, so
//! an event that arrives for a connection that has already been removed cannot
//! be attributed to a newer connection holding the same identity.

use relay_protocol::{ControlMessage, Identity};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::outbox::Outbox;
use crate::relay::Relay;
use crate::slots::{IdentityMode, SlotAllocator};

/// Registry-issued handle for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey(u64);

impl ConnectionKey {
    /// Get the raw key value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Arrived, identity not yet announced.
    Pending,
    /// Registered and visible to peers.
    Admitted,
    /// Removed from the live set.
    Closed,
}

/// One client session.
#[derive(Debug)]
pub struct Connection {
    key: ConnectionKey,
    identity: Identity,
    outbox: Outbox,
    state: ConnectionState,
}

impl Connection {
    /// Registry key.
    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Identity announced to peers.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Outbound sink.
    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Whether the connection's task is still draining its outbox.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Admitted && self.outbox.is_open()
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The connection is registered under `identity`.
    Admitted {
        /// Handle for later events from this connection.
        key: ConnectionKey,
        /// Identity announced to peers.
        identity: Identity,
    },
    /// No slot was free; the connection was told to close.
    Rejected,
}

impl Admission {
    /// The assigned identity, if admitted.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Admission::Admitted { identity, .. } => Some(*identity),
            Admission::Rejected => None,
        }
    }
}

/// The live set of connections.
#[derive(Debug)]
pub struct Registry {
    slots: SlotAllocator,
    members: BTreeMap<Identity, Connection>,
    keys: HashMap<ConnectionKey, Identity>,
    next_key: u64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(mode: IdentityMode) -> Self {
        info!("Creating registry with identity mode: {:?}", mode);
        Self {
            slots: SlotAllocator::new(mode),
            members: BTreeMap::new(),
            keys: HashMap::new(),
            next_key: 1,
        }
    }

    /// Number of admitted connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if no connection is admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Maximum number of connections, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.slots.capacity()
    }

    /// Look up the identity held by a connection.
    #[must_use]
    pub fn identity_of(&self, key: ConnectionKey) -> Option<Identity> {
        self.keys.get(&key).copied()
    }

    /// Look up a connection by identity.
    #[must_use]
    pub fn get(&self, identity: Identity) -> Option<&Connection> {
        self.members.get(&identity)
    }

    /// Iterate admitted connections in ascending identity order.
    pub fn members(&self) -> impl Iterator<Item = &Connection> {
        self.members.values()
    }

    /// Identities of all admitted connections, ascending.
    #[must_use]
    pub fn identities(&self) -> Vec<Identity> {
        self.members.keys().copied().collect()
    }

    /// Admit a new connection.
    ///
    /// On success the new client receives `self||id` followed by one
    /// `connect||peer` per existing member, and every existing member receives
    /// `connect||id`. When no slot is free the connection is asked to close
    /// and nobody is notified.
    pub fn admit(&mut self, outbox: Outbox, relay: &mut Relay) -> Admission {
        if self.slots.is_full() {
            debug!(
                connections = self.members.len(),
                "Capacity reached, rejecting connection"
            );
            outbox.close();
            return Admission::Rejected;
        }

        let identity = match self.slots.reserve() {
            Ok(identity) => identity,
            Err(e) => {
                debug!(error = %e, "Slot reservation failed, rejecting connection");
                outbox.close();
                return Admission::Rejected;
            }
        };

        let key = ConnectionKey(self.next_key);
        self.next_key += 1;

        let mut connection = Connection {
            key,
            identity,
            outbox,
            state: ConnectionState::Pending,
        };

        relay.send_to(&connection, ControlMessage::self_id(identity).encode());

        let joined = ControlMessage::connect(identity).encode();
        for peer in self.members.values() {
            relay.send_to(peer, joined.clone());
            relay.send_to(&connection, ControlMessage::connect(peer.identity).encode());
        }

        connection.state = ConnectionState::Admitted;
        self.members.insert(identity, connection);
        self.keys.insert(key, identity);

        debug!(
            connection = %key,
            identity = %identity,
            connections = self.members.len(),
            "Connection admitted"
        );

        Admission::Admitted { key, identity }
    }

    /// Remove a connection and announce its departure.
    ///
    /// The identity is released and the connection removed before the
    /// remaining members receive `disconnect||id`. Returns the removed
    /// connection, now [`ConnectionState::Closed`], or `None` if the key is
    /// unknown (never admitted, or already removed).
    pub fn remove(&mut self, key: ConnectionKey, relay: &mut Relay) -> Option<Connection> {
        let identity = self.keys.remove(&key)?;
        let mut connection = self.members.remove(&identity)?;
        connection.state = ConnectionState::Closed;
        self.slots.release(identity);

        let left = ControlMessage::disconnect(identity).encode();
        relay.broadcast(self.members.values(), &left);

        debug!(
            connection = %key,
            identity = %identity,
            connections = self.members.len(),
            "Connection removed"
        );

        Some(connection)
    }
}
