//! Binance exchange adapters.
//!
//! [`rest`] is the rate-limited request/response client used for probes,
//! the symbol catalog and historical backfill; [`ws`] maintains the single
//! multiplexed streaming connection; [`wire`] holds the message shapes and
//! decoders shared by both.

pub mod rest;
pub mod wire;
pub mod ws;
