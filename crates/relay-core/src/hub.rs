//! The relay hub.
//!
//! [`Hub`] is the single owned state object: registry, relay and analytics.
//! All mutation goes through its `&mut self` methods, so every broadcast
//! enumerates a consistent view of the live set.
//!
//! [`spawn_hub`] moves a `Hub` into a tokio task and returns a cloneable
//! [`HubHandle`]. Connection tasks talk to the hub only through the handle;
//! commands are applied one at a time in arrival order.

use bytes::Bytes;
use relay_protocol::Identity;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::analytics::Analytics;
use crate::outbox::Outbox;
use crate::registry::{Admission, ConnectionKey, Registry};
use crate::relay::Relay;
use crate::slots::IdentityMode;
use crate::status::{MetricsSnapshot, StatusFeed, StatusPublisher, TagCount};

/// Hub errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The hub task has stopped.
    #[error("Hub is not running")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Identity assignment policy.
    pub identity_mode: IdentityMode,
    /// How often a status snapshot is published.
    pub status_interval: Duration,
    /// Depth of the command queue.
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            identity_mode: IdentityMode::default(),
            status_interval: Duration::from_millis(100),
            command_buffer: 4096,
        }
    }
}

/// Registry, relay and analytics under one owner.
#[derive(Debug)]
pub struct Hub {
    registry: Registry,
    relay: Relay,
    analytics: Analytics,
    started: Instant,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new(mode: IdentityMode) -> Self {
        Self {
            registry: Registry::new(mode),
            relay: Relay::new(),
            analytics: Analytics::new(),
            started: Instant::now(),
        }
    }

    /// Admit a connection that delivers through `outbox`.
    pub fn connect(&mut self, outbox: Outbox) -> Admission {
        self.registry.admit(outbox, &mut self.relay)
    }

    /// Record an inbound message, then forward it to every other member.
    ///
    /// Returns the number of recipients. Messages from unknown keys are
    /// neither recorded nor relayed.
    pub fn message(&mut self, sender: ConnectionKey, payload: &Bytes) -> usize {
        if self.registry.identity_of(sender).is_none() {
            debug!(connection = %sender, "Message from unregistered connection dropped");
            return 0;
        }

        self.analytics.record(payload);
        self.relay.relay(&self.registry, sender, payload)
    }

    /// Remove a connection and notify the remaining members.
    pub fn disconnect(&mut self, key: ConnectionKey) -> Option<Identity> {
        self.registry
            .remove(key, &mut self.relay)
            .map(|connection| connection.identity())
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let stats = self.relay.stats();
        MetricsSnapshot {
            connections: self.registry.len(),
            capacity: self.registry.capacity(),
            requests: self.analytics.requests(),
            bytes: self.analytics.bytes(),
            tags: self
                .analytics
                .tags()
                .into_iter()
                .map(|(tag, count)| TagCount { tag, count })
                .collect(),
            delivered: stats.delivered,
            dropped: stats.dropped,
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The analytics counters.
    #[must_use]
    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect { outbox, reply } => {
                let admission = self.connect(outbox);
                if reply.send(admission).is_err() {
                    // The connection task went away before learning its key.
                    if let Admission::Admitted { key, .. } = admission {
                        self.disconnect(key);
                    }
                }
            }
            HubCommand::Message { sender, payload } => {
                self.message(sender, &payload);
            }
            HubCommand::Disconnect { key } => {
                self.disconnect(key);
            }
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }
}

/// Commands processed by the hub task.
#[derive(Debug)]
enum HubCommand {
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<Admission>,
    },
    Message {
        sender: ConnectionKey,
        payload: Bytes,
    },
    Disconnect {
        key: ConnectionKey,
    },
    Snapshot {
        reply: oneshot::Sender<MetricsSnapshot>,
    },
}

/// Cloneable handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    status: StatusFeed,
}

impl HubHandle {
    /// Register a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn connect(&self, outbox: Outbox) -> Result<Admission, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Connect { outbox, reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Hand an inbound message to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn message(&self, sender: ConnectionKey, payload: Bytes) -> Result<(), HubError> {
        self.send(HubCommand::Message { sender, payload }).await
    }

    /// Report that a connection has closed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn disconnect(&self, key: ConnectionKey) -> Result<(), HubError> {
        self.send(HubCommand::Disconnect { key }).await
    }

    /// Take a snapshot now, bypassing the publish cadence.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub has stopped.
    pub async fn snapshot(&self) -> Result<MetricsSnapshot, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Periodically published snapshots.
    #[must_use]
    pub fn status(&self) -> StatusFeed {
        self.status.clone()
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.tx.send(command).await.map_err(|_| HubError::Closed)
    }
}

/// Start a hub task.
///
/// The task runs until every [`HubHandle`] has been dropped.
#[must_use]
pub fn spawn_hub(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let publisher = StatusPublisher::new();
    let status = publisher.feed();
    let hub = Hub::new(config.identity_mode);

    info!(
        mode = ?config.identity_mode,
        status_interval_ms = config.status_interval.as_millis() as u64,
        "Starting hub"
    );

    let task = tokio::spawn(run_hub(hub, rx, publisher, config.status_interval));
    (HubHandle { tx, status }, task)
}

async fn run_hub(
    mut hub: Hub,
    mut rx: mpsc::Receiver<HubCommand>,
    publisher: StatusPublisher,
    period: Duration,
) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                publisher.publish(hub.snapshot());
            }

            command = rx.recv() => match command {
                Some(command) => hub.handle(command),
                None => break,
            },
        }
    }

    publisher.publish(hub.snapshot());
    info!("Hub stopped");
}
