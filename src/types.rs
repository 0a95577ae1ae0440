//! Domain records for the collected time series.
//!
//! All timestamps are Unix milliseconds (`i64`); all prices and quantities
//! are [`Decimal`] and map to NUMERIC(20,8) columns. Optional 24h ticker
//! aggregates stay `Option` end to end -- null is a first-class value, not a
//! sentinel.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trading pair enrolled in collection. `is_active` gates both backfill
/// and streaming at the next restart.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Symbol {
    pub id: i32,
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One candlestick, keyed by `(symbol, interval, open_time)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Kline {
    pub symbol: String,
    pub interval: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades_count: i32,
    pub taker_buy_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

/// Rolling 24h ticker snapshot, keyed by `(symbol, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Ticker {
    pub symbol: String,
    pub timestamp: i64,
    pub price: Decimal,
    pub bid_price: Option<Decimal>,
    pub bid_qty: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub ask_qty: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub quote_volume_24h: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub price_change_percent_24h: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub trades_count_24h: Option<i32>,
}

/// Order-book depth diff. Published on every event, not persisted by
/// default -- the volume is prohibitive. `bids`/`asks` carry the storage
/// serialization: a JSON array of `["price", "quantity"]` string pairs,
/// bids descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub timestamp: i64,
    pub last_update_id: i64,
    pub bids: String,
    pub asks: String,
}

/// Aggregated trade, unique by `(symbol, trade_id, timestamp)`. Published;
/// not persisted by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub symbol: String,
    pub trade_id: i64,
    pub timestamp: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub is_buyer_maker: bool,
}

/// Series class a checkpoint tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Kline,
    Ticker,
    Depth,
    Trade,
}

impl DataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kline => "kline",
            Self::Ticker => "ticker",
            Self::Depth => "depth",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kline" => Ok(Self::Kline),
            "ticker" => Ok(Self::Ticker),
            "depth" => Ok(Self::Depth),
            "trade" => Ok(Self::Trade),
            other => Err(format!("unknown data type: {other}")),
        }
    }
}

/// Per-series sync state of a checkpoint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Pending,
    Active,
    Error,
}

impl CheckpointStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

impl FromStr for CheckpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown checkpoint status: {other}")),
        }
    }
}

/// Resume record for one series, keyed by `(symbol, data_type, interval)`.
/// `interval` is the empty string for everything but candles.
/// `last_data_time` is the open time / timestamp of the newest durably
/// persisted event and only ever advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub symbol: String,
    pub data_type: DataType,
    pub interval: String,
    pub last_sync_time: i64,
    pub last_data_time: i64,
    pub status: CheckpointStatus,
    pub error_message: Option<String>,
    pub updated_at: i64,
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
