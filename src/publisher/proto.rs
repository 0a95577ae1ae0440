//! Protobuf codec: the default, compact wire form.
//!
//! Envelope timestamps stay in milliseconds; the candle payload's
//! open/close times are divided down to seconds. External consumers depend
//! on exactly this split.

use std::time::Duration;

use prost::Message;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::bus::RedisBus;
use crate::error::Result;
use crate::types::{now_ms, DepthSnapshot, Kline, Symbol, Ticker, Trade};

use super::{
    depth_channel, depth_latest_key, kline_channel, kline_latest_key, parse_levels, pb,
    ticker_channel, ticker_latest_key, trade_channel, Publish, ACTIVE_SYMBOLS_KEY,
};

pub struct ProtobufPublisher {
    bus: RedisBus,
}

impl ProtobufPublisher {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }

    /// Best-effort latest-cache refresh; TTL zero selects the configured
    /// default.
    async fn cache_latest(&self, key: &str, payload: Vec<u8>) {
        if let Err(e) = self.bus.set_with_ttl(key, payload, Duration::ZERO).await {
            warn!(key, error = %e, "failed to refresh latest cache");
        }
    }
}

#[async_trait::async_trait]
impl Publish for ProtobufPublisher {
    async fn publish_kline(&self, kline: &Kline) -> Result<()> {
        let payload = kline_envelope(kline).encode_to_vec();
        self.bus
            .publish(&kline_channel(&kline.symbol, &kline.interval), payload.clone())
            .await?;
        self.cache_latest(&kline_latest_key(&kline.symbol, &kline.interval), payload)
            .await;
        Ok(())
    }

    async fn publish_ticker(&self, ticker: &Ticker) -> Result<()> {
        let payload = ticker_envelope(ticker).encode_to_vec();
        self.bus
            .publish(&ticker_channel(&ticker.symbol), payload.clone())
            .await?;
        self.cache_latest(&ticker_latest_key(&ticker.symbol), payload)
            .await;
        Ok(())
    }

    async fn publish_depth(&self, depth: &DepthSnapshot) -> Result<()> {
        let payload = depth_envelope(depth)?.encode_to_vec();
        self.bus
            .publish(&depth_channel(&depth.symbol), payload.clone())
            .await?;
        self.cache_latest(&depth_latest_key(&depth.symbol), payload)
            .await;
        Ok(())
    }

    async fn publish_trade(&self, trade: &Trade) -> Result<()> {
        let payload = trade_envelope(trade).encode_to_vec();
        self.bus
            .publish(&trade_channel(&trade.symbol), payload)
            .await?;
        Ok(())
    }

    async fn publish_symbols(&self, symbols: &[Symbol]) -> Result<()> {
        let roster = pb::SymbolList {
            symbols: symbols.iter().map(|s| s.symbol.clone()).collect(),
            timestamp: now_ms(),
        };
        self.bus
            .set_with_ttl(ACTIVE_SYMBOLS_KEY, roster.encode_to_vec(), Duration::ZERO)
            .await
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn to_f64_opt(value: Option<Decimal>) -> Option<f64> {
    value.map(to_f64)
}

pub(crate) fn kline_envelope(kline: &Kline) -> pb::LiveData {
    pb::LiveData {
        r#type: pb::DataType::Kline as i32,
        symbol: kline.symbol.clone(),
        timestamp: kline.open_time,
        payload: Some(pb::live_data::Payload::Kline(pb::KlineData {
            interval: kline.interval.clone(),
            // Milliseconds to seconds, truncating.
            open_time: kline.open_time / 1000,
            close_time: kline.close_time / 1000,
            open_price: to_f64(kline.open_price),
            high_price: to_f64(kline.high_price),
            low_price: to_f64(kline.low_price),
            close_price: to_f64(kline.close_price),
            volume: to_f64(kline.volume),
            quote_volume: to_f64(kline.quote_volume),
            trades_count: kline.trades_count,
            taker_buy_volume: to_f64(kline.taker_buy_volume),
            taker_buy_quote_volume: to_f64(kline.taker_buy_quote_volume),
        })),
    }
}

pub(crate) fn ticker_envelope(ticker: &Ticker) -> pb::LiveData {
    pb::LiveData {
        r#type: pb::DataType::Ticker as i32,
        symbol: ticker.symbol.clone(),
        timestamp: ticker.timestamp,
        payload: Some(pb::live_data::Payload::Ticker(pb::TickerData {
            price: to_f64(ticker.price),
            bid_price: to_f64_opt(ticker.bid_price),
            bid_qty: to_f64_opt(ticker.bid_qty),
            ask_price: to_f64_opt(ticker.ask_price),
            ask_qty: to_f64_opt(ticker.ask_qty),
            volume_24h: to_f64_opt(ticker.volume_24h),
            quote_volume_24h: to_f64_opt(ticker.quote_volume_24h),
            price_change_24h: to_f64_opt(ticker.price_change_24h),
            price_change_percent_24h: to_f64_opt(ticker.price_change_percent_24h),
            high_24h: to_f64_opt(ticker.high_24h),
            low_24h: to_f64_opt(ticker.low_24h),
            trades_count_24h: ticker.trades_count_24h,
        })),
    }
}

pub(crate) fn depth_envelope(depth: &DepthSnapshot) -> Result<pb::LiveData> {
    let to_levels = |raw: &str| -> Result<Vec<pb::PriceLevel>> {
        Ok(parse_levels(raw)?
            .into_iter()
            .map(|[price, quantity]| pb::PriceLevel { price, quantity })
            .collect())
    };

    Ok(pb::LiveData {
        r#type: pb::DataType::Depth as i32,
        symbol: depth.symbol.clone(),
        timestamp: depth.timestamp,
        payload: Some(pb::live_data::Payload::Depth(pb::DepthData {
            last_update_id: depth.last_update_id,
            bids: to_levels(&depth.bids)?,
            asks: to_levels(&depth.asks)?,
        })),
    })
}

pub(crate) fn trade_envelope(trade: &Trade) -> pb::LiveData {
    pb::LiveData {
        r#type: pb::DataType::Trade as i32,
        symbol: trade.symbol.clone(),
        timestamp: trade.timestamp,
        payload: Some(pb::live_data::Payload::Trade(pb::TradeData {
            trade_id: trade.trade_id,
            price: to_f64(trade.price),
            quantity: to_f64(trade.quantity),
            quote_quantity: to_f64(trade.quote_quantity),
            is_buyer_maker: trade.is_buyer_maker,
        })),
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;
    use crate::testutil::{kline, ticker};

    #[test]
    fn kline_envelope_splits_time_units() {
        let k = kline("BTCUSDT", "1m", 1_700_000_000_000, 37_000);
        let envelope = kline_envelope(&k);

        // Envelope keeps milliseconds, payload is truncated seconds.
        assert_eq!(envelope.timestamp, 1_700_000_000_000);
        assert_eq!(envelope.r#type, pb::DataType::Kline as i32);
        match envelope.payload.unwrap() {
            pb::live_data::Payload::Kline(payload) => {
                assert_eq!(payload.open_time, 1_700_000_000);
                assert_eq!(payload.close_time, 1_700_000_059);
                assert_eq!(payload.interval, "1m");
                assert_eq!(payload.open_price, 37_000.0);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn ticker_envelope_keeps_nulls() {
        let mut t = ticker("BTCUSDT", 1_700_000_000_500);
        t.volume_24h = None;
        t.trades_count_24h = None;

        let envelope = ticker_envelope(&t);
        match envelope.payload.unwrap() {
            pb::live_data::Payload::Ticker(payload) => {
                assert!(payload.volume_24h.is_none());
                assert!(payload.trades_count_24h.is_none());
                assert!(payload.bid_price.is_some());
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn depth_envelope_round_trips_levels() {
        let depth = DepthSnapshot {
            symbol: "BTCUSDT".into(),
            timestamp: 1_700_000_000_000,
            last_update_id: 42,
            bids: r#"[["37000.0","1.0"],["36999.0","2.0"]]"#.into(),
            asks: r#"[["37001.0","0.5"]]"#.into(),
        };

        let envelope = depth_envelope(&depth).unwrap();
        match envelope.payload.unwrap() {
            pb::live_data::Payload::Depth(payload) => {
                assert_eq!(payload.last_update_id, 42);
                assert_eq!(payload.bids.len(), 2);
                assert_eq!(payload.bids[0].price, "37000.0");
                assert_eq!(payload.asks[0].quantity, "0.5");
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let k = kline("BTCUSDT", "1h", 1_700_000_000_000, 37_000);
        let a = kline_envelope(&k).encode_to_vec();
        let b = kline_envelope(&k).encode_to_vec();
        assert_eq!(a, b);
        assert!(!a.is_empty());

        // And decodes back to the same message.
        let decoded = pb::LiveData::decode(a.as_slice()).unwrap();
        assert_eq!(decoded, kline_envelope(&k));
    }
}
