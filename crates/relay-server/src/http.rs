//! HTTP health and status endpoints.

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::net::SocketAddr;
use tenvis_relay_core::{MetricsSnapshot, StatusFeed};
use tokio::net::TcpListener;
use tracing::info;

/// Routes served on the status port.
pub fn router(feed: StatusFeed) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(feed)
}

/// Serve the status routes until the process exits.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, feed: StatusFeed) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {}", addr))?;

    info!("Status endpoint listening on http://{}", addr);

    axum::serve(listener, router(feed)).await?;
    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Latest published snapshot.
async fn status_handler(State(feed): State<StatusFeed>) -> Json<MetricsSnapshot> {
    Json(MetricsSnapshot::clone(&feed.latest()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenvis_relay_core::StatusPublisher;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get_body(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
            path
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_status_handler_returns_latest() {
        let publisher = StatusPublisher::new();
        publisher.publish(MetricsSnapshot {
            connections: 3,
            requests: 7,
            ..Default::default()
        });

        let Json(snapshot) = status_handler(State(publisher.feed())).await;
        assert_eq!(snapshot.connections, 3);
        assert_eq!(snapshot.requests, 7);
    }

    #[tokio::test]
    async fn test_routes_over_http() {
        let publisher = StatusPublisher::new();
        publisher.publish(MetricsSnapshot {
            connections: 1,
            capacity: Some(8),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(publisher.feed());
        tokio::spawn(async move { axum::serve(listener, app).await });

        let health = get_body(addr, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.contains("\"status\":\"ok\""));

        let status = get_body(addr, "/status").await;
        assert!(status.contains("\"connections\":1"));
        assert!(status.contains("\"capacity\":8"));
    }
}
