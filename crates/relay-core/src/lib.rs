//! # tenvis-relay-core
//!
//! Connection registry, broadcast relay and message analytics for the relay
//! hub.
//!
//! This crate provides the building blocks the server wires together:
//!
//! - **Slots** - Identity allocation, bounded (reused) or unbounded
//! - **Registry** - The live set of connections and join/leave notifications
//! - **Relay** - Best-effort fan-out of a message to every other member
//! - **Analytics** - Request, byte and per-tag counters
//! - **Status** - Snapshots and a periodic status feed
//! - **Hub** - Single owner of all of the above, driven by commands
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  HubCommand  ┌─────────────────────────────┐
//! │ Connection  │─────────────▶│            Hub              │
//! │    task     │              │  Registry ─ Relay ─ Analytics│
//! └─────────────┘              └─────────────────────────────┘
//!        ▲                          │                   │
//!        │        Outbox            │                   ▼
//!        └──────────────────────────┘            StatusPublisher
//! ```
//!
//! ## Example
//!
//! ```
//! use bytes::Bytes;
//! use tenvis_relay_core::{Admission, Hub, IdentityMode, Outbox};
//!
//! let mut hub = Hub::new(IdentityMode::Bounded { capacity: 2 });
//! let (outbox_a, _rx_a) = Outbox::channel(16);
//! let (outbox_b, mut rx_b) = Outbox::channel(16);
//!
//! let Admission::Admitted { key: a, .. } = hub.connect(outbox_a) else { unreachable!() };
//! hub.connect(outbox_b);
//!
//! assert_eq!(hub.message(a, &Bytes::from_static(b"chat||hi")), 1);
//! assert_eq!(hub.snapshot().requests, 1);
//! # let _ = rx_b.try_recv();
//! ```

pub mod analytics;
pub mod hub;
pub mod outbox;
pub mod registry;
pub mod relay;
pub mod slots;
pub mod status;

pub use analytics::Analytics;
pub use hub::{spawn_hub, Hub, HubConfig, HubError, HubHandle};
pub use outbox::{Outbound, Outbox, OutboxReceiver, SinkError, DEFAULT_OUTBOX_CAPACITY};
pub use registry::{Admission, Connection, ConnectionKey, ConnectionState, Registry};
pub use relay::{Relay, RelayStats};
pub use slots::{IdentityMode, SlotAllocator, SlotError, DEFAULT_CAPACITY};
pub use status::{format_average, format_bytes, MetricsSnapshot, StatusFeed, StatusPublisher, TagCount};
