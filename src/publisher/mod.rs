//! Event publishing onto the Redis bus.
//!
//! One capability set, two codecs: the compact protobuf envelope (default)
//! and a JSON fallback for consumers that want text. The concrete codec is
//! picked once at construction behind [`Publish`].
//!
//! Every event goes to its class topic and, except trades, refreshes a
//! latest-value cache key with the configured TTL. Cache writes are
//! best-effort: a failed SET is logged and swallowed, a failed PUBLISH is
//! returned to the caller.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::RedisBus;
use crate::error::{Error, Result};
use crate::types::{DepthSnapshot, Kline, Symbol, Ticker, Trade};

mod json;
mod proto;

pub use json::JsonPublisher;
pub use proto::ProtobufPublisher;

/// Generated wire messages for the protobuf codec.
#[allow(clippy::pedantic)] // Generated code.
pub mod pb {
    include!("../gen/livedata.rs");
}

/// Latest-cache key for the active-symbol roster.
pub const ACTIVE_SYMBOLS_KEY: &str = "binance:symbols:active";

/// Wire codec for published envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Protobuf,
    Json,
}

/// The publishing capability set. One method per event class plus the
/// startup roster refresh.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish_kline(&self, kline: &Kline) -> Result<()>;
    async fn publish_ticker(&self, ticker: &Ticker) -> Result<()>;
    async fn publish_depth(&self, depth: &DepthSnapshot) -> Result<()>;
    async fn publish_trade(&self, trade: &Trade) -> Result<()>;
    async fn publish_symbols(&self, symbols: &[Symbol]) -> Result<()>;
}

/// Construct the publisher for the chosen codec.
pub fn new(bus: RedisBus, codec: Codec) -> Arc<dyn Publish> {
    match codec {
        Codec::Protobuf => Arc::new(ProtobufPublisher::new(bus)),
        Codec::Json => Arc::new(JsonPublisher::new(bus)),
    }
}

// ---------------------------------------------------------------------------
// Topic layout
// ---------------------------------------------------------------------------

pub fn kline_channel(symbol: &str, interval: &str) -> String {
    format!("binance:kline:{symbol}:{interval}")
}

pub fn kline_latest_key(symbol: &str, interval: &str) -> String {
    format!("binance:latest:kline:{symbol}:{interval}")
}

pub fn ticker_channel(symbol: &str) -> String {
    format!("binance:ticker:{symbol}")
}

pub fn ticker_latest_key(symbol: &str) -> String {
    format!("binance:latest:ticker:{symbol}")
}

pub fn depth_channel(symbol: &str) -> String {
    format!("binance:depth:{symbol}")
}

pub fn depth_latest_key(symbol: &str) -> String {
    format!("binance:latest:depth:{symbol}")
}

pub fn trade_channel(symbol: &str) -> String {
    format!("binance:trade:{symbol}")
}

/// Parse the storage serialization of one book side --
/// `[["price","quantity"], …]` -- back into pairs, order preserved
/// (bids arrive descending, asks ascending).
pub(crate) fn parse_levels(raw: &str) -> Result<Vec<[String; 2]>> {
    serde_json::from_str(raw).map_err(|e| Error::decode(format!("depth levels: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_layout() {
        assert_eq!(kline_channel("BTCUSDT", "1m"), "binance:kline:BTCUSDT:1m");
        assert_eq!(
            kline_latest_key("BTCUSDT", "1m"),
            "binance:latest:kline:BTCUSDT:1m"
        );
        assert_eq!(ticker_channel("ETHUSDT"), "binance:ticker:ETHUSDT");
        assert_eq!(ticker_latest_key("ETHUSDT"), "binance:latest:ticker:ETHUSDT");
        assert_eq!(depth_channel("BTCUSDT"), "binance:depth:BTCUSDT");
        assert_eq!(depth_latest_key("BTCUSDT"), "binance:latest:depth:BTCUSDT");
        assert_eq!(trade_channel("BTCUSDT"), "binance:trade:BTCUSDT");
        assert_eq!(ACTIVE_SYMBOLS_KEY, "binance:symbols:active");
    }

    #[test]
    fn parse_levels_preserves_order() {
        let levels =
            parse_levels(r#"[["37000.0","1.5"],["36999.5","2.0"],["36999.0","0.1"]]"#).unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], ["37000.0".to_string(), "1.5".to_string()]);
        assert_eq!(levels[2][0], "36999.0");
    }

    #[test]
    fn parse_levels_rejects_garbage() {
        assert!(parse_levels("not json").is_err());
        assert!(parse_levels(r#"[["price-only"]]"#).is_err());
    }
}
