//! Shared test fixtures.
//!
//! Reusable constructors for domain records used across multiple test
//! modules. Avoids duplicating field-by-field literals in every
//! `#[cfg(test)]` block.

use rust_decimal::Decimal;

use crate::types::{Checkpoint, CheckpointStatus, DataType, Kline, Ticker};

/// A closed one-minute-shaped candle at `open_time` with integral prices
/// derived from `price`.
pub(crate) fn kline(symbol: &str, interval: &str, open_time: i64, price: i64) -> Kline {
    Kline {
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        open_time,
        close_time: open_time + 59_999,
        open_price: Decimal::from(price),
        high_price: Decimal::from(price + 20),
        low_price: Decimal::from(price - 10),
        close_price: Decimal::from(price + 10),
        volume: Decimal::new(15, 1),       // 1.5
        quote_volume: Decimal::from(55_500),
        trades_count: 42,
        taker_buy_volume: Decimal::new(9, 1), // 0.9
        taker_buy_quote_volume: Decimal::from(33_300),
    }
}

/// A ticker snapshot with best bid/ask populated and all 24h aggregates set.
pub(crate) fn ticker(symbol: &str, timestamp: i64) -> Ticker {
    Ticker {
        symbol: symbol.to_string(),
        timestamp,
        price: Decimal::from(37_005),
        bid_price: Some(Decimal::from(37_004)),
        bid_qty: Some(Decimal::from(2)),
        ask_price: Some(Decimal::from(37_006)),
        ask_qty: Some(Decimal::from(1)),
        volume_24h: Some(Decimal::from(1_234)),
        quote_volume_24h: Some(Decimal::from(45_000_000)),
        price_change_24h: Some(Decimal::from(120)),
        price_change_percent_24h: Some(Decimal::new(33, 2)), // 0.33
        high_24h: Some(Decimal::from(37_500)),
        low_24h: Some(Decimal::from(36_500)),
        trades_count_24h: Some(98_765),
    }
}

/// An active checkpoint anchored at `last_data_time`.
pub(crate) fn checkpoint(
    symbol: &str,
    data_type: DataType,
    interval: &str,
    last_data_time: i64,
) -> Checkpoint {
    Checkpoint {
        symbol: symbol.to_string(),
        data_type,
        interval: interval.to_string(),
        last_sync_time: last_data_time,
        last_data_time,
        status: CheckpointStatus::Active,
        error_message: None,
        updated_at: last_data_time,
    }
}
