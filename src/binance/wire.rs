//! Exchange message shapes and decoders.
//!
//! REST kline rows arrive as heterogeneous JSON arrays and are parsed
//! positionally; every numeric field is a decimal string and is parsed to
//! [`Decimal`] -- floats would silently lose exchange precision. Stream
//! events use Binance's one-letter keys, mapped here to named fields.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Kline;

// ---------------------------------------------------------------------------
// REST responses
// ---------------------------------------------------------------------------

/// One row of a `/api/v3/klines` response, still untyped. Rows are decoded
/// individually so a malformed row can be skipped without losing the page.
pub type RawKlineRow = Vec<Value>;

/// Positionally parsed kline row:
/// index 0 open time (ms), 1 open, 2 high, 3 low, 4 close, 5 volume,
/// 6 close time (ms), 7 quote volume, 8 trade count, 9 taker buy base
/// volume, 10 taker buy quote volume. Index 11 is an ignored legacy field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRow {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
    pub quote_volume: Decimal,
    pub trades_count: i32,
    pub taker_buy_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

/// Decode one raw kline row. Pure: no I/O, deterministic.
pub fn decode_kline_row(row: &RawKlineRow) -> Result<KlineRow> {
    Ok(KlineRow {
        open_time: field_i64(row, 0)?,
        open: field_decimal(row, 1)?,
        high: field_decimal(row, 2)?,
        low: field_decimal(row, 3)?,
        close: field_decimal(row, 4)?,
        volume: field_decimal(row, 5)?,
        close_time: field_i64(row, 6)?,
        quote_volume: field_decimal(row, 7)?,
        trades_count: field_i64(row, 8)? as i32,
        taker_buy_volume: field_decimal(row, 9)?,
        taker_buy_quote_volume: field_decimal(row, 10)?,
    })
}

impl KlineRow {
    /// Attach the request context the row itself does not carry.
    pub fn into_kline(self, symbol: &str, interval: &str) -> Kline {
        Kline {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            open_time: self.open_time,
            close_time: self.close_time,
            open_price: self.open,
            high_price: self.high,
            low_price: self.low,
            close_price: self.close,
            volume: self.volume,
            quote_volume: self.quote_volume,
            trades_count: self.trades_count,
            taker_buy_volume: self.taker_buy_volume,
            taker_buy_quote_volume: self.taker_buy_quote_volume,
        }
    }
}

fn field_i64(row: &RawKlineRow, idx: usize) -> Result<i64> {
    row.get(idx)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::decode(format!("kline row: field {idx} is not an integer")))
}

fn field_decimal(row: &RawKlineRow, idx: usize) -> Result<Decimal> {
    let raw = row
        .get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::decode(format!("kline row: field {idx} is not a string")))?;
    parse_decimal(raw, "kline row field")
}

/// Parse a decimal string, carrying the field name into the error.
pub fn parse_decimal(raw: &str, field: &'static str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| Error::decode(format!("{field} {raw:?}: {e}")))
}

/// Parse an optional decimal string; `None` and empty map to `None`.
pub fn parse_decimal_opt(raw: &str, field: &'static str) -> Result<Option<Decimal>> {
    if raw.is_empty() {
        return Ok(None);
    }
    parse_decimal(raw, field).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ticker24hResponse {
    pub symbol: String,
    #[serde(rename = "priceChange")]
    pub price_change: String,
    #[serde(rename = "priceChangePercent")]
    pub price_change_percent: String,
    #[serde(rename = "lastPrice")]
    pub last_price: String,
    #[serde(rename = "bidPrice")]
    pub bid_price: String,
    #[serde(rename = "bidQty")]
    pub bid_qty: String,
    #[serde(rename = "askPrice")]
    pub ask_price: String,
    #[serde(rename = "askQty")]
    pub ask_qty: String,
    #[serde(rename = "highPrice")]
    pub high_price: String,
    #[serde(rename = "lowPrice")]
    pub low_price: String,
    pub volume: String,
    #[serde(rename = "quoteVolume")]
    pub quote_volume: String,
    #[serde(rename = "openTime")]
    pub open_time: i64,
    #[serde(rename = "closeTime")]
    pub close_time: i64,
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthResponse {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggTradeResponse {
    #[serde(rename = "a")]
    pub agg_trade_id: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "l")]
    pub last_trade_id: i64,
    #[serde(rename = "T")]
    pub timestamp: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub timezone: String,
    #[serde(rename = "serverTime")]
    pub server_time: i64,
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "baseAsset")]
    pub base_asset: String,
    #[serde(rename = "quoteAsset")]
    pub quote_asset: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerTimeResponse {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

/// Error body the exchange returns alongside non-200 statuses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Stream events (one-letter keys)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WsKlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: WsKline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsKline {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub end_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "n")]
    pub trades_count: i32,
    /// Closed-candle flag. Only `true` candles are durable; in-progress
    /// updates for the same open time keep arriving until then.
    #[serde(rename = "x")]
    pub is_closed: bool,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "V")]
    pub taker_buy_volume: String,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: String,
}

/// Rolling 24h ticker event. Only the last price is guaranteed; the 24h
/// aggregates may be absent and default to empty, which the conversion maps
/// to `None`.
#[derive(Debug, Clone, Deserialize)]
pub struct WsTickerEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p", default)]
    pub price_change: String,
    #[serde(rename = "P", default)]
    pub price_change_percent: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "b", default)]
    pub bid_price: String,
    #[serde(rename = "B", default)]
    pub bid_qty: String,
    #[serde(rename = "a", default)]
    pub ask_price: String,
    #[serde(rename = "A", default)]
    pub ask_qty: String,
    #[serde(rename = "h", default)]
    pub high_price: String,
    #[serde(rename = "l", default)]
    pub low_price: String,
    #[serde(rename = "v", default)]
    pub volume: String,
    #[serde(rename = "q", default)]
    pub quote_volume: String,
    #[serde(rename = "n", default)]
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsDepthEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: i64,
    #[serde(rename = "u")]
    pub final_update_id: i64,
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsAggTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "a")]
    pub agg_trade_id: i64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    #[serde(rename = "m")]
    pub is_buyer_maker: bool,
}

#[cfg(test)]
mod tests {
    use rust_decimal::prelude::FromPrimitive;
    use serde_json::json;

    use super::*;

    fn sample_row() -> RawKlineRow {
        json!([
            1700000000000i64,
            "37000.10000000",
            "37100.00000000",
            "36900.50000000",
            "37050.00000000",
            "12.34500000",
            1700003599999i64,
            "457000.12300000",
            842,
            "6.10000000",
            "225900.00000000",
            "0"
        ])
        .as_array()
        .unwrap()
        .clone()
    }

    #[test]
    fn decode_kline_row_positional() {
        let row = decode_kline_row(&sample_row()).unwrap();
        assert_eq!(row.open_time, 1_700_000_000_000);
        assert_eq!(row.close_time, 1_700_003_599_999);
        assert_eq!(row.open, Decimal::from_str("37000.1").unwrap());
        assert_eq!(row.trades_count, 842);
        assert_eq!(
            row.taker_buy_quote_volume,
            Decimal::from_u32(225_900).unwrap()
        );
    }

    #[test]
    fn decode_kline_row_into_kline() {
        let kline = decode_kline_row(&sample_row())
            .unwrap()
            .into_kline("BTCUSDT", "1h");
        assert_eq!(kline.symbol, "BTCUSDT");
        assert_eq!(kline.interval, "1h");
        assert_eq!(kline.open_time, 1_700_000_000_000);
        assert!(kline.low_price <= kline.open_price);
        assert!(kline.high_price >= kline.close_price);
    }

    #[test]
    fn decode_kline_row_rejects_short_row() {
        let row = json!([1700000000000i64, "1.0"]).as_array().unwrap().clone();
        assert!(matches!(
            decode_kline_row(&row),
            Err(crate::error::Error::Decode(_))
        ));
    }

    #[test]
    fn decode_kline_row_rejects_numeric_price() {
        // Prices must be strings; a bare number is a malformed row.
        let mut row = sample_row();
        row[1] = json!(37000.1);
        assert!(decode_kline_row(&row).is_err());
    }

    #[test]
    fn ws_kline_event_short_keys() {
        let raw = r#"{
            "e": "kline", "E": 1700000061000, "s": "BTCUSDT",
            "k": {
                "t": 1700000000000, "T": 1700000059999, "s": "BTCUSDT",
                "i": "1m", "f": 100, "L": 200,
                "o": "37000.1", "c": "37010.0", "h": "37020.0", "l": "36990.0",
                "v": "1.5", "n": 42, "x": false, "q": "55500.0",
                "V": "0.9", "Q": "33300.0", "B": "0"
            }
        }"#;
        let event: WsKlineEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "kline");
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.kline.interval, "1m");
        assert_eq!(event.kline.start_time, 1_700_000_000_000);
        assert!(!event.kline.is_closed);
    }

    #[test]
    fn ws_depth_event_levels_keep_order() {
        let raw = r#"{
            "e": "depthUpdate", "E": 1700000000500, "s": "BTCUSDT",
            "U": 157, "u": 160,
            "b": [["37000.0", "1.0"], ["36999.0", "2.0"]],
            "a": [["37001.0", "0.5"], ["37002.0", "0.7"]]
        }"#;
        let event: WsDepthEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.final_update_id, 160);
        assert_eq!(event.bids[0][0], "37000.0");
        assert_eq!(event.asks[1][1], "0.7");
    }

    #[test]
    fn ws_agg_trade_event() {
        let raw = r#"{
            "e": "aggTrade", "E": 1700000000100, "s": "ETHUSDT",
            "a": 99, "p": "2000.5", "q": "0.25",
            "f": 5, "l": 7, "T": 1700000000099, "m": true, "M": true
        }"#;
        let event: WsAggTradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.agg_trade_id, 99);
        assert!(event.is_buyer_maker);
    }

    #[test]
    fn api_error_body() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"code": -1121, "msg": "Invalid symbol."}"#).unwrap();
        assert_eq!(body.code, -1121);
        assert_eq!(body.msg, "Invalid symbol.");
    }

    #[test]
    fn parse_decimal_opt_empty_is_none() {
        assert_eq!(parse_decimal_opt("", "x").unwrap(), None);
        assert_eq!(
            parse_decimal_opt("1.25", "x").unwrap(),
            Some(Decimal::from_str("1.25").unwrap())
        );
    }
}
