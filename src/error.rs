//! Crate-wide error type.
//!
//! Only startup-phase errors are fatal; everything raised on a per-event or
//! per-pair path is logged and scoped to that item by the caller. The
//! reconnect loop converts a run of dial failures into
//! [`Error::ReconnectExhausted`], the one streaming error that escalates.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Structured `{code, msg}` error body from the exchange.
    #[error("binance api error (code {code}): {message}")]
    Api { code: i64, message: String },

    /// Non-200 response whose body is not a structured API error.
    #[error("http error: status {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level HTTP failure (DNS, TLS, timeout, ...).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// WebSocket dial/read/write failure.
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed exchange message. Dropped with a warning, never fatal.
    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A batch chunk's transaction exceeded its wall-time bound and was
    /// rolled back.
    #[error("transaction timed out after {0:?}")]
    TxTimeout(Duration),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    /// Consecutive dial failures exceeded the configured budget.
    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// Root cancellation observed mid-operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Decode error with context -- keeps call sites terse.
    pub fn decode(context: impl Into<String>) -> Self {
        Self::Decode(context.into())
    }
}
