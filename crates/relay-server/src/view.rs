//! Terminal status view.
//!
//! Redraws the hub's status in place on stdout: the listening address in
//! red, then connections, requests, bytes and the tag tree. Logs go to
//! stderr so they do not tear the view.

use crossterm::{
    cursor::{MoveTo, MoveToNextLine},
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use futures_util::StreamExt;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tenvis_relay_core::{MetricsSnapshot, StatusFeed};
use tracing::debug;

/// Address shown in the banner.
///
/// A wildcard bind shows the machine's LAN address so clients elsewhere
/// know where to connect; otherwise the configured host is shown as is.
#[must_use]
pub fn banner(host: &str, port: u16) -> String {
    let shown = match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => lan_address().to_string(),
        _ => host.to_string(),
    };
    format!("{}:{}", shown, port)
}

fn lan_address() -> IpAddr {
    local_ip_address::local_ip().unwrap_or_else(|e| {
        debug!(error = %e, "No local IPv4 address, using loopback");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    })
}

/// Redraw the view every `period` until the feed ends.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub async fn run(feed: StatusFeed, banner: String, period: Duration) -> io::Result<()> {
    let mut snapshots = Box::pin(feed.snapshots(period));
    let mut stdout = io::stdout();

    while let Some(snapshot) = snapshots.next().await {
        render(&mut stdout, &banner, &snapshot)?;
    }
    Ok(())
}

/// Draw one frame.
pub fn render(out: &mut impl Write, banner: &str, snapshot: &MetricsSnapshot) -> io::Result<()> {
    queue!(
        out,
        MoveTo(0, 0),
        Clear(ClearType::FromCursorDown),
        SetForegroundColor(Color::Red),
        Print(banner),
        ResetColor,
        MoveToNextLine(1)
    )?;

    for (i, line) in snapshot.render_lines().iter().enumerate() {
        match i {
            0 => queue!(out, SetForegroundColor(Color::Yellow))?,
            1 => queue!(out, SetForegroundColor(Color::Green))?,
            _ => {}
        }
        queue!(out, Print(line), ResetColor, MoveToNextLine(1))?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenvis_relay_core::TagCount;

    #[test]
    fn test_banner_keeps_explicit_host() {
        assert_eq!(banner("127.0.0.1", 8080), "127.0.0.1:8080");
        assert_eq!(banner("relay.local", 9000), "relay.local:9000");
    }

    #[test]
    fn test_banner_resolves_wildcard() {
        let shown = banner("0.0.0.0", 8080);
        assert!(shown.ends_with(":8080"));
        assert!(!shown.starts_with("0.0.0.0"));
    }

    #[test]
    fn test_render_frame() {
        let snapshot = MetricsSnapshot {
            connections: 1,
            capacity: Some(8),
            requests: 2,
            bytes: 16,
            tags: vec![TagCount {
                tag: "chat".into(),
                count: 2,
            }],
            ..Default::default()
        };

        let mut out = Vec::new();
        render(&mut out, "10.0.0.5:8080", &snapshot).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("10.0.0.5:8080"));
        assert!(text.contains("Connections: 1/8"));
        assert!(text.contains("Requests: 2.00"));
        assert!(text.contains("Bytes: 16 B"));
        assert!(text.contains("└─ chat: 2.00"));
    }
}
