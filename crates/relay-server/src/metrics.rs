//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use dashmap::DashSet;
use futures_util::StreamExt;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_protocol::codec::split_tag;
use std::net::SocketAddr;
use std::time::Duration;
use tenvis_relay_core::StatusFeed;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "relay_connections_rejected_total";
    pub const MESSAGES_TOTAL: &str = "relay_messages_total";
    pub const MESSAGES_BYTES: &str = "relay_messages_bytes";
    pub const TAG_MESSAGES: &str = "relay_tag_messages_total";
    pub const DELIVERIES: &str = "relay_deliveries";
    pub const DELIVERIES_DROPPED: &str = "relay_deliveries_dropped";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of admitted connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of admitted connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections closed because every identity slot was taken"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total inbound messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total inbound bytes");
    metrics::describe_counter!(names::TAG_MESSAGES, "Inbound messages per tag");
    metrics::describe_gauge!(names::DELIVERIES, "Messages queued to recipients");
    metrics::describe_gauge!(
        names::DELIVERIES_DROPPED,
        "Messages recipients missed because their outbox was full or closed"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Longest tag exported as its own label value.
pub const MAX_TAG_LABEL_LEN: usize = 32;

/// Distinct tag label values exported before new tags fold into `other`.
pub const MAX_TAG_SERIES: usize = 64;

/// Label for messages without a `||` delimiter.
pub const UNTAGGED_LABEL: &str = "untagged";

/// Label for tags past the length or series limit.
pub const OTHER_LABEL: &str = "other";

/// Chooses the `tag` label for inbound messages.
///
/// Clients pick tags freely, so only short, delimited tags get a series of
/// their own, and only the first [`MAX_TAG_SERIES`] of them. Concurrent
/// first sightings may overshoot the limit by the number of racing tasks.
#[derive(Debug, Default)]
pub struct TagLabels {
    seen: DashSet<String>,
}

impl TagLabels {
    /// Create an empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Label value for one inbound message.
    pub fn label(&self, message: &[u8]) -> String {
        let tag = match split_tag(message) {
            (tag, Some(_)) => tag,
            (_, None) => return UNTAGGED_LABEL.to_string(),
        };
        if tag.len() > MAX_TAG_LABEL_LEN {
            return OTHER_LABEL.to_string();
        }

        let tag = String::from_utf8_lossy(tag).into_owned();
        if self.seen.contains(&tag) {
            return tag;
        }
        if self.seen.len() >= MAX_TAG_SERIES {
            return OTHER_LABEL.to_string();
        }
        self.seen.insert(tag.clone());
        tag
    }
}

/// Record an inbound message.
pub fn record_inbound(labels: &TagLabels, message: &[u8]) {
    counter!(names::MESSAGES_TOTAL).increment(1);
    counter!(names::MESSAGES_BYTES).increment(message.len() as u64);
    counter!(names::TAG_MESSAGES, "tag" => labels.label(message)).increment(1);
}

/// Record a connection turned away for lack of a slot.
pub fn record_rejection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Mirror hub delivery counters into gauges on every status tick.
pub async fn export_deliveries(feed: StatusFeed, period: Duration) {
    let mut snapshots = Box::pin(feed.snapshots(period));
    while let Some(snapshot) = snapshots.next().await {
        gauge!(names::DELIVERIES).set(snapshot.delivered as f64);
        gauge!(names::DELIVERIES_DROPPED).set(snapshot.dropped as f64);
    }
}

/// Metrics guard for an admitted connection; records the disconnect on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_series(rendered: &str) -> Vec<&str> {
        rendered
            .lines()
            .filter(|line| line.starts_with("relay_tag_messages_total{"))
            .collect()
    }

    #[test]
    fn test_recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let labels = TagLabels::new();

        metrics::with_local_recorder(&recorder, || {
            let guard = ConnectionMetricsGuard::new();
            record_inbound(&labels, b"chat||hi");
            record_inbound(&labels, b"chat||again");
            record_rejection();
            drop(guard);
        });

        let rendered = handle.render();
        assert!(rendered.contains("relay_connections_total 1"));
        assert!(rendered.contains("relay_messages_total 2"));
        assert!(rendered.contains("relay_tag_messages_total{tag=\"chat\"} 2"));
        assert!(rendered.contains("relay_connections_rejected_total 1"));
    }

    #[test]
    fn test_tag_label_choice() {
        let labels = TagLabels::new();
        assert_eq!(labels.label(b"chat||hi"), "chat");
        assert_eq!(labels.label(b"||empty tag"), "");
        assert_eq!(labels.label(b"no delimiter at all"), UNTAGGED_LABEL);
        assert_eq!(labels.label(b""), UNTAGGED_LABEL);

        let long = format!("{}||x", "t".repeat(MAX_TAG_LABEL_LEN + 1));
        assert_eq!(labels.label(long.as_bytes()), OTHER_LABEL);
        let fits = format!("{}||x", "t".repeat(MAX_TAG_LABEL_LEN));
        assert_eq!(labels.label(fits.as_bytes()), "t".repeat(MAX_TAG_LABEL_LEN));
    }

    #[test]
    fn test_untagged_payloads_share_one_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let labels = TagLabels::new();

        metrics::with_local_recorder(&recorder, || {
            for i in 0..500u32 {
                let mut payload = vec![b'x'; 4096];
                payload[..4].copy_from_slice(&i.to_be_bytes());
                record_inbound(&labels, &payload);
            }
        });

        let rendered = handle.render();
        let series = tag_series(&rendered);
        assert_eq!(series, vec!["relay_tag_messages_total{tag=\"untagged\"} 500"]);
        assert!(rendered.len() < 16 * 1024);
    }

    #[test]
    fn test_tag_series_are_capped() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let labels = TagLabels::new();

        metrics::with_local_recorder(&recorder, || {
            for i in 0..1000 {
                record_inbound(&labels, format!("tag{}||payload", i).as_bytes());
            }
            // Tags seen before the cap keep their own series
            record_inbound(&labels, b"tag0||again");
        });

        let rendered = handle.render();
        let series = tag_series(&rendered);
        assert_eq!(series.len(), MAX_TAG_SERIES + 1);
        assert!(rendered.contains("relay_tag_messages_total{tag=\"tag0\"} 2"));
        let other = 1000 - MAX_TAG_SERIES;
        assert!(rendered.contains(&format!(
            "relay_tag_messages_total{{tag=\"other\"}} {}",
            other
        )));
    }
}
