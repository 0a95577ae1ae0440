//! Process counters with Prometheus text exposition and a health endpoint.
//!
//! All counters are bare atomics -- no mutex, no allocation on the event
//! path. The HTTP side is two routes rendered on the cold scrape path.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Metrics {
    /// Stream frames dispatched to a handler.
    pub events: AtomicU64,
    /// Frames or payloads that failed to decode.
    pub decode_errors: AtomicU64,
    /// Events that failed to persist (logged and skipped).
    pub persist_errors: AtomicU64,
    /// Events published to the bus.
    pub published: AtomicU64,
    /// Events whose publish failed.
    pub publish_errors: AtomicU64,
    /// Successful websocket dials after the first.
    pub reconnections: AtomicU64,
    /// Whether the stream connection is currently up.
    pub connected: AtomicBool,
    /// Rows written by the backfill coordinator.
    pub backfill_rows: AtomicU64,
    /// (symbol, interval) pairs whose backfill failed.
    pub backfill_errors: AtomicU64,

    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            persist_errors: AtomicU64::new(0),
            published: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            backfill_rows: AtomicU64::new(0),
            backfill_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(1024);

        let counters: [(&str, &str, u64); 8] = [
            (
                "collector_events_total",
                "Stream events dispatched to handlers",
                self.events.load(Relaxed),
            ),
            (
                "collector_decode_errors_total",
                "Messages dropped as malformed",
                self.decode_errors.load(Relaxed),
            ),
            (
                "collector_persist_errors_total",
                "Events that failed to persist",
                self.persist_errors.load(Relaxed),
            ),
            (
                "collector_published_total",
                "Events published to the bus",
                self.published.load(Relaxed),
            ),
            (
                "collector_publish_errors_total",
                "Events whose publish failed",
                self.publish_errors.load(Relaxed),
            ),
            (
                "collector_reconnections_total",
                "WebSocket reconnections",
                self.reconnections.load(Relaxed),
            ),
            (
                "collector_backfill_rows_total",
                "Candles written by backfill",
                self.backfill_rows.load(Relaxed),
            ),
            (
                "collector_backfill_errors_total",
                "Backfill pairs that failed",
                self.backfill_errors.load(Relaxed),
            ),
        ];

        for (name, help, value) in counters {
            writeln!(out, "# HELP {name} {help}").unwrap();
            writeln!(out, "# TYPE {name} counter").unwrap();
            writeln!(out, "{name} {value}").unwrap();
        }

        writeln!(out, "# HELP collector_stream_up Stream connection status (1=connected)").unwrap();
        writeln!(out, "# TYPE collector_stream_up gauge").unwrap();
        writeln!(
            out,
            "collector_stream_up {}",
            u64::from(self.connected.load(Relaxed))
        )
        .unwrap();

        writeln!(out, "# HELP collector_uptime_seconds Seconds since process start").unwrap();
        writeln!(out, "# TYPE collector_uptime_seconds gauge").unwrap();
        writeln!(
            out,
            "collector_uptime_seconds {}",
            self.start_time.elapsed().as_secs()
        )
        .unwrap();

        out
    }
}

/// Serve `/health` and `/metrics` on the given port until cancelled.
pub async fn serve_http(port: u16, metrics: Arc<Metrics>, cancel: CancellationToken) {
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prom_metrics))
        .with_state(metrics);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(port, error = %e, "failed to bind metrics port");
            return;
        }
    };

    info!(port, "metrics/health HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .ok();
}

/// `GET /health` -- `OK` while the stream connection is up, `DOWN` otherwise.
async fn health(State(metrics): State<Arc<Metrics>>) -> (StatusCode, &'static str) {
    if metrics.connected.load(Relaxed) {
        (StatusCode::OK, "OK\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "DOWN\n")
    }
}

/// `GET /metrics` -- Prometheus text exposition format.
async fn prom_metrics(State(metrics): State<Arc<Metrics>>) -> String {
    metrics.to_prometheus()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render() {
        let metrics = Metrics::new();
        metrics.events.fetch_add(3, Relaxed);
        metrics.published.fetch_add(2, Relaxed);
        metrics.connected.store(true, Relaxed);

        let out = metrics.to_prometheus();
        assert!(out.contains("collector_events_total 3"));
        assert!(out.contains("collector_published_total 2"));
        assert!(out.contains("collector_stream_up 1"));
        assert!(out.contains("# TYPE collector_events_total counter"));
    }

    #[tokio::test]
    async fn health_tracks_connection_gauge() {
        let metrics = Arc::new(Metrics::new());

        let (status, body) = health(State(metrics.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "DOWN\n");

        metrics.connected.store(true, Relaxed);
        let (status, body) = health(State(metrics)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK\n");
    }
}
