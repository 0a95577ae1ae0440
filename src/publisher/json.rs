//! JSON codec: textual fallback for consumers that do not speak protobuf.
//!
//! Same envelope shape and topic layout as the protobuf codec; decimal
//! values are emitted as strings to keep exchange precision intact. Field
//! order is fixed by the structs, so identical input yields identical bytes.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::bus::RedisBus;
use crate::error::{Error, Result};
use crate::types::{now_ms, DepthSnapshot, Kline, Symbol, Ticker, Trade};

use super::{
    depth_channel, depth_latest_key, kline_channel, kline_latest_key, parse_levels,
    ticker_channel, ticker_latest_key, trade_channel, Publish, ACTIVE_SYMBOLS_KEY,
};

pub struct JsonPublisher {
    bus: RedisBus,
}

impl JsonPublisher {
    pub fn new(bus: RedisBus) -> Self {
        Self { bus }
    }

    async fn cache_latest(&self, key: &str, payload: Vec<u8>) {
        if let Err(e) = self.bus.set_with_ttl(key, payload, Duration::ZERO).await {
            warn!(key, error = %e, "failed to refresh latest cache");
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    r#type: &'static str,
    symbol: &'a str,
    timestamp: i64,
    data: T,
}

#[derive(Serialize)]
struct KlinePayload<'a> {
    interval: &'a str,
    open_time: i64,
    close_time: i64,
    open_price: Decimal,
    high_price: Decimal,
    low_price: Decimal,
    close_price: Decimal,
    volume: Decimal,
    quote_volume: Decimal,
    trades_count: i32,
    taker_buy_volume: Decimal,
    taker_buy_quote_volume: Decimal,
}

#[derive(Serialize)]
struct TickerPayload {
    price: Decimal,
    bid_price: Option<Decimal>,
    bid_qty: Option<Decimal>,
    ask_price: Option<Decimal>,
    ask_qty: Option<Decimal>,
    volume_24h: Option<Decimal>,
    quote_volume_24h: Option<Decimal>,
    price_change_24h: Option<Decimal>,
    price_change_percent_24h: Option<Decimal>,
    high_24h: Option<Decimal>,
    low_24h: Option<Decimal>,
    trades_count_24h: Option<i32>,
}

#[derive(Serialize)]
struct DepthPayload {
    last_update_id: i64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(Serialize)]
struct TradePayload {
    trade_id: i64,
    price: Decimal,
    quantity: Decimal,
    quote_quantity: Decimal,
    is_buyer_maker: bool,
}

#[derive(Serialize)]
struct RosterPayload {
    symbols: Vec<String>,
    timestamp: i64,
}

fn encode<T: Serialize>(envelope: &Envelope<'_, T>) -> Result<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(|e| Error::decode(format!("json envelope: {e}")))
}

#[async_trait::async_trait]
impl Publish for JsonPublisher {
    async fn publish_kline(&self, kline: &Kline) -> Result<()> {
        let payload = encode(&Envelope {
            r#type: "kline",
            symbol: &kline.symbol,
            timestamp: kline.open_time,
            data: KlinePayload {
                interval: &kline.interval,
                // Milliseconds to seconds, truncating -- same split as the
                // protobuf codec.
                open_time: kline.open_time / 1000,
                close_time: kline.close_time / 1000,
                open_price: kline.open_price,
                high_price: kline.high_price,
                low_price: kline.low_price,
                close_price: kline.close_price,
                volume: kline.volume,
                quote_volume: kline.quote_volume,
                trades_count: kline.trades_count,
                taker_buy_volume: kline.taker_buy_volume,
                taker_buy_quote_volume: kline.taker_buy_quote_volume,
            },
        })?;

        self.bus
            .publish(&kline_channel(&kline.symbol, &kline.interval), payload.clone())
            .await?;
        self.cache_latest(&kline_latest_key(&kline.symbol, &kline.interval), payload)
            .await;
        Ok(())
    }

    async fn publish_ticker(&self, ticker: &Ticker) -> Result<()> {
        let payload = encode(&Envelope {
            r#type: "ticker",
            symbol: &ticker.symbol,
            timestamp: ticker.timestamp,
            data: TickerPayload {
                price: ticker.price,
                bid_price: ticker.bid_price,
                bid_qty: ticker.bid_qty,
                ask_price: ticker.ask_price,
                ask_qty: ticker.ask_qty,
                volume_24h: ticker.volume_24h,
                quote_volume_24h: ticker.quote_volume_24h,
                price_change_24h: ticker.price_change_24h,
                price_change_percent_24h: ticker.price_change_percent_24h,
                high_24h: ticker.high_24h,
                low_24h: ticker.low_24h,
                trades_count_24h: ticker.trades_count_24h,
            },
        })?;

        self.bus
            .publish(&ticker_channel(&ticker.symbol), payload.clone())
            .await?;
        self.cache_latest(&ticker_latest_key(&ticker.symbol), payload)
            .await;
        Ok(())
    }

    async fn publish_depth(&self, depth: &DepthSnapshot) -> Result<()> {
        let payload = encode(&Envelope {
            r#type: "depth",
            symbol: &depth.symbol,
            timestamp: depth.timestamp,
            data: DepthPayload {
                last_update_id: depth.last_update_id,
                bids: parse_levels(&depth.bids)?,
                asks: parse_levels(&depth.asks)?,
            },
        })?;

        self.bus
            .publish(&depth_channel(&depth.symbol), payload.clone())
            .await?;
        self.cache_latest(&depth_latest_key(&depth.symbol), payload)
            .await;
        Ok(())
    }

    async fn publish_trade(&self, trade: &Trade) -> Result<()> {
        let payload = encode(&Envelope {
            r#type: "trade",
            symbol: &trade.symbol,
            timestamp: trade.timestamp,
            data: TradePayload {
                trade_id: trade.trade_id,
                price: trade.price,
                quantity: trade.quantity,
                quote_quantity: trade.quote_quantity,
                is_buyer_maker: trade.is_buyer_maker,
            },
        })?;

        self.bus
            .publish(&trade_channel(&trade.symbol), payload)
            .await?;
        Ok(())
    }

    async fn publish_symbols(&self, symbols: &[Symbol]) -> Result<()> {
        let payload = serde_json::to_vec(&RosterPayload {
            symbols: symbols.iter().map(|s| s.symbol.clone()).collect(),
            timestamp: now_ms(),
        })
        .map_err(|e| Error::decode(format!("json roster: {e}")))?;

        self.bus
            .set_with_ttl(ACTIVE_SYMBOLS_KEY, payload, Duration::ZERO)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::kline;

    #[test]
    fn envelope_shape_and_time_split() {
        let k = kline("BTCUSDT", "1m", 1_700_000_000_000, 37_000);
        let payload = encode(&Envelope {
            r#type: "kline",
            symbol: &k.symbol,
            timestamp: k.open_time,
            data: KlinePayload {
                interval: &k.interval,
                open_time: k.open_time / 1000,
                close_time: k.close_time / 1000,
                open_price: k.open_price,
                high_price: k.high_price,
                low_price: k.low_price,
                close_price: k.close_price,
                volume: k.volume,
                quote_volume: k.quote_volume,
                trades_count: k.trades_count,
                taker_buy_volume: k.taker_buy_volume,
                taker_buy_quote_volume: k.taker_buy_quote_volume,
            },
        })
        .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["type"], "kline");
        assert_eq!(value["symbol"], "BTCUSDT");
        // Envelope in milliseconds, payload in seconds.
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
        assert_eq!(value["data"]["open_time"], 1_700_000_000i64);
        // Decimals are emitted as strings.
        assert_eq!(value["data"]["open_price"], "37000");
    }

    #[test]
    fn encoding_is_deterministic() {
        let k = kline("ETHUSDT", "1h", 1_700_000_000_000, 2_000);
        let envelope = |k: &crate::types::Kline| {
            encode(&Envelope {
                r#type: "kline",
                symbol: &k.symbol,
                timestamp: k.open_time,
                data: KlinePayload {
                    interval: &k.interval,
                    open_time: k.open_time / 1000,
                    close_time: k.close_time / 1000,
                    open_price: k.open_price,
                    high_price: k.high_price,
                    low_price: k.low_price,
                    close_price: k.close_price,
                    volume: k.volume,
                    quote_volume: k.quote_volume,
                    trades_count: k.trades_count,
                    taker_buy_volume: k.taker_buy_volume,
                    taker_buy_quote_volume: k.taker_buy_quote_volume,
                },
            })
            .unwrap()
        };
        assert_eq!(envelope(&k), envelope(&k));
    }
}
