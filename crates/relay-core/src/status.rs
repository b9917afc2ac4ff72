//! Status snapshots.
//!
//! The hub periodically publishes an immutable [`MetricsSnapshot`] through a
//! [`StatusPublisher`]. Consumers (the terminal view, the HTTP status
//! endpoint) hold a [`StatusFeed`] and either read the latest snapshot or
//! sample it on a fixed cadence as a stream. Publishing never waits for
//! consumers.

use futures_util::stream::{self, Stream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};

const AVERAGE_SUFFIXES: [&str; 5] = ["", "k", "m", "b", "t"];
const BYTE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Message count for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    /// Tag text.
    pub tag: String,
    /// Messages seen with this tag.
    pub count: u64,
}

/// Point-in-time copy of the hub's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Admitted connections.
    pub connections: usize,
    /// Connection limit, if bounded.
    pub capacity: Option<usize>,
    /// Messages received from clients.
    pub requests: u64,
    /// Bytes received from clients.
    pub bytes: u64,
    /// Per-tag counts in first-seen order.
    pub tags: Vec<TagCount>,
    /// Messages queued to recipients.
    pub delivered: u64,
    /// Messages recipients missed.
    pub dropped: u64,
    /// Time since the hub started, in milliseconds.
    pub uptime_ms: u64,
}

impl MetricsSnapshot {
    /// Human-readable lines for the status view.
    #[must_use]
    pub fn render_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(4 + self.tags.len());

        lines.push(match self.capacity {
            Some(capacity) => format!("Connections: {}/{}", self.connections, capacity),
            None => format!("Connections: {}", self.connections),
        });
        lines.push(format!("Requests: {}", format_average(self.requests)));
        lines.push(format!("Bytes: {}", format_bytes(self.bytes)));

        if self.tags.is_empty() {
            lines.push("Tags: (none)".to_string());
            return lines;
        }

        lines.push("Tags:".to_string());
        let last = self.tags.len() - 1;
        for (i, entry) in self.tags.iter().enumerate() {
            let branch = if i == last { "└─" } else { "├─" };
            lines.push(format!("{} {}: {}", branch, entry.tag, format_average(entry.count)));
        }

        lines
    }
}

/// Abbreviate a count with two decimals: `999.00`, `1.23k`, `4.56m`, `7.89b`.
#[must_use]
pub fn format_average(value: u64) -> String {
    let mut scaled = value as f64;
    let mut unit = 0;
    while unit + 1 < AVERAGE_SUFFIXES.len() && (scaled * 100.0).round() / 100.0 >= 1000.0 {
        scaled /= 1000.0;
        unit += 1;
    }
    format!("{:.2}{}", scaled, AVERAGE_SUFFIXES[unit])
}

/// Render a byte count in binary units: `512 B`, `1.50 KiB`, `3.00 MiB`.
#[must_use]
pub fn format_bytes(value: u64) -> String {
    if value < 1024 {
        return format!("{} B", value);
    }

    let mut scaled = value as f64;
    let mut unit = 0;
    while unit + 1 < BYTE_UNITS.len() && (scaled * 100.0).round() / 100.0 >= 1024.0 {
        scaled /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", scaled, BYTE_UNITS[unit])
}

/// Write side of the status channel.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<Arc<MetricsSnapshot>>,
}

impl StatusPublisher {
    /// Create a publisher holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(MetricsSnapshot::default()));
        Self { tx }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// Create a feed for a consumer.
    #[must_use]
    pub fn feed(&self) -> StatusFeed {
        StatusFeed {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the status channel.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    rx: watch::Receiver<Arc<MetricsSnapshot>>,
}

impl StatusFeed {
    /// The most recently published snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.rx.borrow().clone()
    }

    /// Sample the latest snapshot every `period`, forever.
    ///
    /// The stream is lazy (the timer starts on first poll) and each call
    /// returns an independent stream, so a consumer can restart by calling
    /// it again. The first item is yielded immediately.
    pub fn snapshots(
        &self,
        period: Duration,
    ) -> impl Stream<Item = Arc<MetricsSnapshot>> + Send + 'static {
        let period = period.max(Duration::from_millis(1));
        let rx = self.rx.clone();

        stream::unfold(
            (None::<Interval>, rx),
            move |(ticker, rx)| async move {
                let mut ticker = ticker.unwrap_or_else(|| {
                    let mut ticker = interval(period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    ticker
                });
                ticker.tick().await;
                let snapshot = rx.borrow().clone();
                Some((snapshot, (Some(ticker), rx)))
            },
        )
    }
}
