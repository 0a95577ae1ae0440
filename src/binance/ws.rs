//! Multiplexed Binance WebSocket client.
//!
//! One connection subscribes to every configured stream via
//! `/stream?streams=a/b/c`; each frame is a `{"stream", "data"}` envelope and
//! `data` is handed verbatim to the handler registered for that stream name.
//! Handlers run on the read task, so delivery within a connection is strictly
//! in arrival order.
//!
//! Reconnects are transparent: consecutive dial failures count toward
//! `max_reconnect_attempts` (exhaustion is the only fatal streaming error),
//! a successful dial resets the counter, and a read failure closes the
//! socket, waits `reconnect_delay` and redials.

use std::collections::HashMap;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;

/// Write deadline for keep-alive pings. A slow write is logged, not fatal --
/// the read loop notices a dead connection on its own.
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Per-stream event handler. Receives the envelope's `data` member verbatim.
pub type Handler = Box<dyn Fn(Box<RawValue>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Multiplexed stream envelope.
#[derive(Deserialize)]
struct StreamFrame {
    stream: String,
    data: Box<RawValue>,
}

pub struct WsClient {
    base_url: String,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    ping_interval: Duration,
    handlers: HashMap<String, Handler>,
    metrics: Arc<Metrics>,
}

impl WsClient {
    pub fn new(ws_url: &str, config: &StreamConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            base_url: ws_url.trim_end_matches('/').to_string(),
            reconnect_delay: Duration::from_secs(config.reconnect_delay),
            max_reconnect_attempts: config.max_reconnect_attempts,
            ping_interval: Duration::from_secs(config.ping_interval),
            handlers: HashMap::new(),
            metrics,
        }
    }

    /// Register the handler for one stream name. Registration happens before
    /// [`run`](Self::run); the map is immutable while the connection lives.
    pub fn register_handler(&mut self, stream: impl Into<String>, handler: Handler) {
        self.handlers.insert(stream.into(), handler);
    }

    /// Connect and pump frames until cancelled (clean `Ok`) or the reconnect
    /// budget is exhausted.
    pub async fn run(&self, streams: &[String], cancel: CancellationToken) -> Result<()> {
        let url = format!("{}/stream?streams={}", self.base_url, streams.join("/"));
        let mut dial_failures = 0u32;
        let mut ever_connected = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            info!(stream_count = streams.len(), %url, "connecting");

            let ws = match connect_async(&url).await {
                Ok((ws, _)) => ws,
                Err(e) => {
                    dial_failures += 1;
                    if dial_failures >= self.max_reconnect_attempts {
                        error!(attempts = dial_failures, error = %e, "reconnect budget exhausted");
                        return Err(Error::ReconnectExhausted(dial_failures));
                    }
                    warn!(
                        attempt = dial_failures,
                        delay_secs = self.reconnect_delay.as_secs(),
                        error = %e,
                        "dial failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                    continue;
                }
            };

            info!("connected");
            // Only consecutive dial failures accumulate.
            dial_failures = 0;
            if ever_connected {
                self.metrics.reconnections.fetch_add(1, Relaxed);
            }
            ever_connected = true;
            self.metrics.connected.store(true, Relaxed);

            let stopped = self.pump(ws, &cancel).await;
            self.metrics.connected.store(false, Relaxed);
            if stopped {
                return Ok(());
            }

            // Read failure: cool down, then redial.
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    info!("attempting to reconnect");
                }
            }
        }
    }

    /// Read/ping loop for one connection. Returns `true` on cancellation
    /// (stop for good), `false` when the connection died and the caller
    /// should redial.
    async fn pump(
        &self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        cancel: &CancellationToken,
    ) -> bool {
        let (mut write, mut read) = ws.split();
        let mut ping = tokio::time::interval(self.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // `interval` fires immediately; swallow the first tick so the first
        // ping goes out one full interval after connect.
        ping.reset();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutting down stream connection");
                    let _ = write.send(Message::Close(None)).await;
                    return true;
                }
                _ = ping.tick() => {
                    let send = write.send(Message::Ping(Vec::new()));
                    match tokio::time::timeout(PING_WRITE_DEADLINE, send).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(error = %e, "failed to send ping"),
                        Err(_) => warn!(deadline_secs = PING_WRITE_DEADLINE.as_secs(), "ping write timed out"),
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text).await,
                        Some(Ok(_)) => {} // ping/pong/binary control traffic
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read error");
                            return false;
                        }
                        None => {
                            warn!("stream ended");
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Demux one frame. Unknown streams and handler failures are logged and
    /// dropped -- a single bad event never takes the connection down.
    async fn dispatch(&self, text: &str) {
        let frame: StreamFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to decode stream envelope");
                return;
            }
        };

        match self.handlers.get(&frame.stream) {
            Some(handler) => {
                if let Err(e) = handler(frame.data).await {
                    error!(stream = %frame.stream, error = %e, "handler error");
                }
            }
            None => warn!(stream = %frame.stream, "no handler registered, dropping"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream naming
// ---------------------------------------------------------------------------

/// Build the full stream list for a symbol set: one kline stream per
/// configured interval plus ticker, depth diff and aggregated trades.
pub fn build_stream_names(symbols: &[String], intervals: &[String]) -> Vec<String> {
    let mut streams = Vec::with_capacity(symbols.len() * (intervals.len() + 3));

    for symbol in symbols {
        let lower = symbol.to_lowercase();
        for interval in intervals {
            streams.push(format!("{lower}@kline_{interval}"));
        }
        streams.push(format!("{lower}@ticker"));
        streams.push(format!("{lower}@depth@1000ms"));
        streams.push(format!("{lower}@aggTrade"));
    }

    streams
}

/// Stream class parsed back out of a stream name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    Kline { symbol: String, interval: String },
    Ticker { symbol: String },
    Depth { symbol: String },
    AggTrade { symbol: String },
}

/// Parse a stream name produced by [`build_stream_names`]. The symbol comes
/// back upper-cased, as stored and published.
pub fn parse_stream_name(stream: &str) -> Option<StreamKind> {
    let mut parts = stream.split('@');
    let symbol = parts.next().filter(|s| !s.is_empty())?.to_uppercase();
    let kind = parts.next()?;

    if let Some(interval) = kind.strip_prefix("kline_") {
        return Some(StreamKind::Kline {
            symbol,
            interval: interval.to_string(),
        });
    }
    match kind {
        "ticker" => Some(StreamKind::Ticker { symbol }),
        "depth" => Some(StreamKind::Depth { symbol }),
        "aggTrade" => Some(StreamKind::AggTrade { symbol }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names_cover_every_class() {
        let streams = build_stream_names(
            &["BTCUSDT".to_string()],
            &["1m".to_string(), "1h".to_string()],
        );
        assert_eq!(
            streams,
            vec![
                "btcusdt@kline_1m",
                "btcusdt@kline_1h",
                "btcusdt@ticker",
                "btcusdt@depth@1000ms",
                "btcusdt@aggTrade",
            ]
        );
    }

    #[test]
    fn stream_names_for_multiple_symbols() {
        let streams = build_stream_names(
            &["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            &["1m".to_string()],
        );
        assert_eq!(streams.len(), 8);
        assert!(streams.contains(&"ethusdt@kline_1m".to_string()));
        assert!(streams.contains(&"ethusdt@aggTrade".to_string()));
    }

    #[test]
    fn parse_round_trips_every_kind() {
        assert_eq!(
            parse_stream_name("btcusdt@kline_15m"),
            Some(StreamKind::Kline {
                symbol: "BTCUSDT".into(),
                interval: "15m".into()
            })
        );
        assert_eq!(
            parse_stream_name("btcusdt@ticker"),
            Some(StreamKind::Ticker {
                symbol: "BTCUSDT".into()
            })
        );
        assert_eq!(
            parse_stream_name("btcusdt@depth@1000ms"),
            Some(StreamKind::Depth {
                symbol: "BTCUSDT".into()
            })
        );
        assert_eq!(
            parse_stream_name("btcusdt@aggTrade"),
            Some(StreamKind::AggTrade {
                symbol: "BTCUSDT".into()
            })
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_stream_name("btcusdt"), None);
        assert_eq!(parse_stream_name("@ticker"), None);
        assert_eq!(parse_stream_name("btcusdt@bookTicker"), None);
    }
}
