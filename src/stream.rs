//! Stream service: wires websocket frames to decoders, persistence, the
//! publisher and checkpoint updates.
//!
//! One handler per stream name, registered before the connection starts.
//! Handlers run sequentially on the read task. Every failure inside a
//! handler is logged and scoped to that event -- one bad record never stops
//! the pipeline.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::binance::wire::{
    parse_decimal, parse_decimal_opt, WsAggTradeEvent, WsDepthEvent, WsKlineEvent, WsTickerEvent,
};
use crate::binance::ws::{build_stream_names, parse_stream_name, Handler, StreamKind, WsClient};
use crate::config::{BinanceConfig, StreamConfig};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::publisher::Publish;
use crate::repository::{CheckpointRepository, KlineRepository, TickerRepository};
use crate::types::{DataType, DepthSnapshot, Kline, Symbol, Ticker, Trade};

/// Everything a stream handler needs, cloned into each closure.
#[derive(Clone)]
struct HandlerContext {
    klines: KlineRepository,
    tickers: TickerRepository,
    checkpoints: CheckpointRepository,
    publisher: Arc<dyn Publish>,
    metrics: Arc<Metrics>,
}

pub struct StreamService {
    ws: WsClient,
    streams: Vec<String>,
}

impl StreamService {
    /// Build stream names for every active symbol, register a typed handler
    /// per stream and prepare the websocket client.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        binance: &BinanceConfig,
        stream: &StreamConfig,
        symbols: &[Symbol],
        klines: KlineRepository,
        tickers: TickerRepository,
        checkpoints: CheckpointRepository,
        publisher: Arc<dyn Publish>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let names: Vec<String> = symbols.iter().map(|s| s.symbol.clone()).collect();
        let streams = build_stream_names(&names, &binance.kline_intervals);

        info!(
            symbol_count = names.len(),
            stream_count = streams.len(),
            "preparing websocket streams"
        );

        let context = HandlerContext {
            klines,
            tickers,
            checkpoints,
            publisher,
            metrics: metrics.clone(),
        };

        let mut ws = WsClient::new(&binance.ws_url, stream, metrics);
        for name in &streams {
            match parse_stream_name(name) {
                Some(StreamKind::Kline { symbol, interval }) => {
                    ws.register_handler(name.clone(), kline_handler(context.clone(), symbol, interval));
                }
                Some(StreamKind::Ticker { .. }) => {
                    ws.register_handler(name.clone(), ticker_handler(context.clone()));
                }
                Some(StreamKind::Depth { .. }) => {
                    ws.register_handler(name.clone(), depth_handler(context.clone()));
                }
                Some(StreamKind::AggTrade { .. }) => {
                    ws.register_handler(name.clone(), trade_handler(context.clone()));
                }
                None => warn!(stream = %name, "unrecognized stream name, skipping"),
            }
        }

        Self { ws, streams }
    }

    /// Run the connection until cancelled or the reconnect budget runs out.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.ws.run(&self.streams, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Per-stream handlers
// ---------------------------------------------------------------------------

/// Closed candles are upserted, published and advance the checkpoint.
/// In-progress candles (`x == false`) are dropped before any side effect.
fn kline_handler(context: HandlerContext, symbol: String, interval: String) -> Handler {
    Box::new(move |data: Box<RawValue>| {
        let context = context.clone();
        let symbol = symbol.clone();
        let interval = interval.clone();
        Box::pin(async move {
            context.metrics.events.fetch_add(1, Relaxed);
            let event: WsKlineEvent = serde_json::from_str(data.get()).map_err(|e| {
                context.metrics.decode_errors.fetch_add(1, Relaxed);
                Error::decode(format!("kline event: {e}"))
            })?;

            if !event.kline.is_closed {
                return Ok(());
            }

            let kline = kline_from_event(&event, &symbol, &interval)?;

            if let Err(e) = context.klines.insert(&kline).await {
                context.metrics.persist_errors.fetch_add(1, Relaxed);
                error!(symbol = %symbol, interval = %interval, error = %e, "failed to insert kline");
            }

            match context.publisher.publish_kline(&kline).await {
                Ok(()) => {
                    context.metrics.published.fetch_add(1, Relaxed);
                }
                Err(e) => {
                    context.metrics.publish_errors.fetch_add(1, Relaxed);
                    error!(symbol = %symbol, interval = %interval, error = %e, "failed to publish kline");
                }
            }

            if let Err(e) = context
                .checkpoints
                .touch_last_data_time(&symbol, DataType::Kline, &interval, kline.open_time)
                .await
            {
                warn!(symbol = %symbol, interval = %interval, error = %e, "failed to update checkpoint");
            }

            Ok(())
        })
    })
}

fn ticker_handler(context: HandlerContext) -> Handler {
    Box::new(move |data: Box<RawValue>| {
        let context = context.clone();
        Box::pin(async move {
            context.metrics.events.fetch_add(1, Relaxed);
            let event: WsTickerEvent = serde_json::from_str(data.get()).map_err(|e| {
                context.metrics.decode_errors.fetch_add(1, Relaxed);
                Error::decode(format!("ticker event: {e}"))
            })?;

            let ticker = ticker_from_event(&event)?;

            if let Err(e) = context.tickers.insert(&ticker).await {
                context.metrics.persist_errors.fetch_add(1, Relaxed);
                error!(symbol = %ticker.symbol, error = %e, "failed to insert ticker");
            }

            match context.publisher.publish_ticker(&ticker).await {
                Ok(()) => {
                    context.metrics.published.fetch_add(1, Relaxed);
                }
                Err(e) => {
                    context.metrics.publish_errors.fetch_add(1, Relaxed);
                    error!(symbol = %ticker.symbol, error = %e, "failed to publish ticker");
                }
            }

            Ok(())
        })
    })
}

/// Depth diffs are published only -- persisting them at 1000ms cadence
/// across the symbol set would be prohibitive.
fn depth_handler(context: HandlerContext) -> Handler {
    Box::new(move |data: Box<RawValue>| {
        let context = context.clone();
        Box::pin(async move {
            context.metrics.events.fetch_add(1, Relaxed);
            let event: WsDepthEvent = serde_json::from_str(data.get()).map_err(|e| {
                context.metrics.decode_errors.fetch_add(1, Relaxed);
                Error::decode(format!("depth event: {e}"))
            })?;

            let depth = depth_from_event(&event)?;

            match context.publisher.publish_depth(&depth).await {
                Ok(()) => {
                    context.metrics.published.fetch_add(1, Relaxed);
                }
                Err(e) => {
                    context.metrics.publish_errors.fetch_add(1, Relaxed);
                    error!(symbol = %depth.symbol, error = %e, "failed to publish depth");
                }
            }

            Ok(())
        })
    })
}

fn trade_handler(context: HandlerContext) -> Handler {
    Box::new(move |data: Box<RawValue>| {
        let context = context.clone();
        Box::pin(async move {
            context.metrics.events.fetch_add(1, Relaxed);
            let event: WsAggTradeEvent = serde_json::from_str(data.get()).map_err(|e| {
                context.metrics.decode_errors.fetch_add(1, Relaxed);
                Error::decode(format!("trade event: {e}"))
            })?;

            let trade = trade_from_event(&event)?;

            match context.publisher.publish_trade(&trade).await {
                Ok(()) => {
                    context.metrics.published.fetch_add(1, Relaxed);
                }
                Err(e) => {
                    context.metrics.publish_errors.fetch_add(1, Relaxed);
                    error!(symbol = %trade.symbol, error = %e, "failed to publish trade");
                }
            }

            Ok(())
        })
    })
}

// ---------------------------------------------------------------------------
// Event -> record conversions
// ---------------------------------------------------------------------------

fn kline_from_event(event: &WsKlineEvent, symbol: &str, interval: &str) -> Result<Kline> {
    let k = &event.kline;
    Ok(Kline {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        open_time: k.start_time,
        close_time: k.end_time,
        open_price: parse_decimal(&k.open, "kline open")?,
        high_price: parse_decimal(&k.high, "kline high")?,
        low_price: parse_decimal(&k.low, "kline low")?,
        close_price: parse_decimal(&k.close, "kline close")?,
        volume: parse_decimal(&k.volume, "kline volume")?,
        quote_volume: parse_decimal(&k.quote_volume, "kline quote volume")?,
        trades_count: k.trades_count,
        taker_buy_volume: parse_decimal(&k.taker_buy_volume, "kline taker buy volume")?,
        taker_buy_quote_volume: parse_decimal(
            &k.taker_buy_quote_volume,
            "kline taker buy quote volume",
        )?,
    })
}

fn ticker_from_event(event: &WsTickerEvent) -> Result<Ticker> {
    Ok(Ticker {
        symbol: event.symbol.clone(),
        timestamp: event.event_time,
        price: parse_decimal(&event.last_price, "ticker last price")?,
        bid_price: parse_decimal_opt(&event.bid_price, "ticker bid price")?,
        bid_qty: parse_decimal_opt(&event.bid_qty, "ticker bid qty")?,
        ask_price: parse_decimal_opt(&event.ask_price, "ticker ask price")?,
        ask_qty: parse_decimal_opt(&event.ask_qty, "ticker ask qty")?,
        volume_24h: parse_decimal_opt(&event.volume, "ticker volume")?,
        quote_volume_24h: parse_decimal_opt(&event.quote_volume, "ticker quote volume")?,
        price_change_24h: parse_decimal_opt(&event.price_change, "ticker price change")?,
        price_change_percent_24h: parse_decimal_opt(
            &event.price_change_percent,
            "ticker price change percent",
        )?,
        high_24h: parse_decimal_opt(&event.high_price, "ticker high")?,
        low_24h: parse_decimal_opt(&event.low_price, "ticker low")?,
        trades_count_24h: event.count.map(|c| c as i32),
    })
}

/// Serialize the level arrays into the stable storage form; the publisher
/// re-parses them into typed price levels.
fn depth_from_event(event: &WsDepthEvent) -> Result<DepthSnapshot> {
    let encode = |levels: &Vec<[String; 2]>, side: &'static str| -> Result<String> {
        serde_json::to_string(levels).map_err(|e| Error::decode(format!("depth {side}: {e}")))
    };

    Ok(DepthSnapshot {
        symbol: event.symbol.clone(),
        timestamp: event.event_time,
        last_update_id: event.final_update_id,
        bids: encode(&event.bids, "bids")?,
        asks: encode(&event.asks, "asks")?,
    })
}

fn trade_from_event(event: &WsAggTradeEvent) -> Result<Trade> {
    let price = parse_decimal(&event.price, "trade price")?;
    let quantity = parse_decimal(&event.quantity, "trade quantity")?;

    Ok(Trade {
        symbol: event.symbol.clone(),
        trade_id: event.agg_trade_id,
        timestamp: event.trade_time,
        price,
        quantity,
        // The stream does not carry it; derived exactly as stored.
        quote_quantity: price * quantity,
        is_buyer_maker: event.is_buyer_maker,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use super::*;

    fn closed_kline_event() -> WsKlineEvent {
        serde_json::from_str(
            r#"{
                "e": "kline", "E": 1700000061000, "s": "BTCUSDT",
                "k": {
                    "t": 1700000000000, "T": 1700000059999, "s": "BTCUSDT",
                    "i": "1m", "o": "37000.1", "c": "37010.0", "h": "37020.0",
                    "l": "36990.0", "v": "1.5", "n": 42, "x": true,
                    "q": "55500.0", "V": "0.9", "Q": "33300.0"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn kline_conversion() {
        let kline = kline_from_event(&closed_kline_event(), "BTCUSDT", "1m").unwrap();
        assert_eq!(kline.open_time, 1_700_000_000_000);
        assert_eq!(kline.close_time, 1_700_000_059_999);
        assert_eq!(kline.open_price, Decimal::from_str("37000.1").unwrap());
        assert_eq!(kline.trades_count, 42);
        assert_eq!(kline.interval, "1m");
    }

    #[test]
    fn kline_conversion_rejects_bad_decimal() {
        let mut event = closed_kline_event();
        event.kline.open = "not-a-number".into();
        assert!(kline_from_event(&event, "BTCUSDT", "1m").is_err());
    }

    #[test]
    fn ticker_conversion_maps_missing_aggregates_to_null() {
        let event: WsTickerEvent = serde_json::from_str(
            r#"{
                "e": "24hrTicker", "E": 1700000000500, "s": "BTCUSDT",
                "c": "37005.5", "b": "37005.0", "B": "2.0", "a": "37006.0", "A": "1.0"
            }"#,
        )
        .unwrap();

        let ticker = ticker_from_event(&event).unwrap();
        assert_eq!(ticker.timestamp, 1_700_000_000_500);
        assert_eq!(ticker.price, Decimal::from_str("37005.5").unwrap());
        assert_eq!(ticker.bid_qty, Some(Decimal::from_str("2.0").unwrap()));
        // Aggregates the event did not carry are null, not zero.
        assert_eq!(ticker.volume_24h, None);
        assert_eq!(ticker.price_change_24h, None);
        assert_eq!(ticker.trades_count_24h, None);
    }

    #[test]
    fn depth_conversion_serializes_levels_stably() {
        let event: WsDepthEvent = serde_json::from_str(
            r#"{
                "e": "depthUpdate", "E": 1700000000500, "s": "BTCUSDT",
                "U": 157, "u": 160,
                "b": [["37000.0","1.0"],["36999.0","2.0"]],
                "a": [["37001.0","0.5"]]
            }"#,
        )
        .unwrap();

        let depth = depth_from_event(&event).unwrap();
        assert_eq!(depth.last_update_id, 160);
        assert_eq!(depth.bids, r#"[["37000.0","1.0"],["36999.0","2.0"]]"#);
        assert_eq!(depth.asks, r#"[["37001.0","0.5"]]"#);

        // Same event serializes to the same text.
        assert_eq!(depth_from_event(&event).unwrap(), depth);
    }

    #[test]
    fn trade_conversion_derives_quote_quantity() {
        let event: WsAggTradeEvent = serde_json::from_str(
            r#"{
                "e": "aggTrade", "E": 1700000000100, "s": "ETHUSDT",
                "a": 99, "p": "2000.5", "q": "0.25",
                "f": 5, "l": 7, "T": 1700000000099, "m": true
            }"#,
        )
        .unwrap();

        let trade = trade_from_event(&event).unwrap();
        assert_eq!(trade.trade_id, 99);
        assert_eq!(
            trade.quote_quantity,
            Decimal::from_str("2000.5").unwrap() * Decimal::from_str("0.25").unwrap()
        );
        assert!(trade.is_buyer_maker);
    }
}
