//! Binance live market-data collector library.
//!
//! Backfills historical candles over the REST API, streams candles, 24h
//! tickers, depth diffs and aggregated trades over a single multiplexed
//! WebSocket connection, persists time-series rows to TimescaleDB and
//! republishes every event to Redis pub/sub with a short-TTL latest-value
//! cache.

pub mod binance;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod repository;
pub mod stream;
pub mod sync;
#[cfg(test)]
pub(crate) mod testutil;
pub mod types;
