//! Rate-limited Binance REST client.
//!
//! Every request first takes a token from a bucket sized to the configured
//! requests-per-minute ceiling (burst = ceiling, refill = ceiling/60 per
//! second), so no 60-second window ever exceeds the limit beyond the burst
//! allowance. The client never retries -- backfill decides what to do with a
//! failed page.

use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::BinanceConfig;
use crate::error::{Error, Result};

use super::wire::{
    AggTradeResponse, ApiErrorBody, DepthResponse, ExchangeInfoResponse, RawKlineRow,
    ServerTimeResponse, Ticker24hResponse,
};

/// Per-request timeout, matching the exchange's slowest documented endpoints.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How much of an error body to carry into the error message.
const BODY_PREFIX_LEN: usize = 256;

pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
    bucket: RateBucket,
    cancel: CancellationToken,
}

impl RestClient {
    /// Build the client. `cancel` aborts in-flight requests and pending
    /// rate-bucket waits when the root context shuts down.
    pub fn new(config: &BinanceConfig, cancel: CancellationToken) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            bucket: RateBucket::new(config.rest_rate_limit),
            cancel,
        })
    }

    /// Connectivity probe.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self.get_json("/api/v3/ping", &[]).await?;
        Ok(())
    }

    /// Exchange server time in Unix milliseconds.
    pub async fn server_time(&self) -> Result<i64> {
        let resp: ServerTimeResponse = self.get_json("/api/v3/time", &[]).await?;
        Ok(resp.server_time)
    }

    /// Full symbol catalog.
    pub async fn exchange_info(&self) -> Result<ExchangeInfoResponse> {
        self.get_json("/api/v3/exchangeInfo", &[]).await
    }

    /// Historical candles. Rows come back untyped so the caller can skip
    /// malformed rows individually (see [`super::wire::decode_kline_row`]).
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<RawKlineRow>> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }

        self.get_json("/api/v3/klines", &params).await
    }

    /// 24h rolling ticker for one symbol.
    pub async fn ticker_24h(&self, symbol: &str) -> Result<Ticker24hResponse> {
        self.get_json("/api/v3/ticker/24hr", &[("symbol", symbol.to_string())])
            .await
    }

    /// 24h rolling tickers for every symbol.
    pub async fn all_tickers_24h(&self) -> Result<Vec<Ticker24hResponse>> {
        self.get_json("/api/v3/ticker/24hr", &[]).await
    }

    /// Order-book snapshot.
    pub async fn depth(&self, symbol: &str, limit: Option<u32>) -> Result<DepthResponse> {
        let mut params = vec![("symbol", symbol.to_string())];
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        self.get_json("/api/v3/depth", &params).await
    }

    /// Aggregated trades.
    pub async fn agg_trades(
        &self,
        symbol: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<AggTradeResponse>> {
        let mut params = vec![("symbol", symbol.to_string())];
        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        self.get_json("/api/v3/aggTrades", &params).await
    }

    /// Rate-limited GET returning decoded JSON. A non-200 response whose
    /// body parses as `{code, msg}` becomes [`Error::Api`]; any other
    /// non-200 becomes [`Error::Http`] with a body prefix.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.bucket.acquire(&self.cancel).await?;

        let url = format!("{}{}", self.base_url, path);
        let request = self.http.get(&url).query(params);

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let body = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            body = response.bytes() => body?,
        };

        if !status.is_success() {
            if let Ok(api) = serde_json::from_slice::<ApiErrorBody>(&body) {
                return Err(Error::Api {
                    code: api.code,
                    message: api.msg,
                });
            }
            let prefix_len = body.len().min(BODY_PREFIX_LEN);
            return Err(Error::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body[..prefix_len]).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| Error::decode(format!("{path}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

/// Token bucket over [`tokio::time::Instant`] so tests can pause the clock.
/// Starts full: a fresh process may burst up to the per-minute ceiling.
pub struct RateBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateBucket {
    pub fn new(per_minute: u32) -> Self {
        let capacity = f64::from(per_minute.max(1));
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until one is available. A cancelled context
    /// aborts the wait (or the take itself) with [`Error::Cancelled`].
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let wait = self.try_take();
            match wait {
                None => return Ok(()),
                Some(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Refill from elapsed time and take a token if available; otherwise
    /// return how long until one token has accrued.
    fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64(
                (1.0 - state.tokens) / self.refill_per_sec,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bucket_allows_burst_up_to_capacity() {
        let bucket = RateBucket::new(3);
        let cancel = CancellationToken::new();

        for _ in 0..3 {
            bucket.acquire(&cancel).await.unwrap();
        }
        // Bucket drained: the next take must report a wait.
        assert!(bucket.try_take().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_refills_at_rate_over_sixty() {
        // 60/min -> one token per second.
        let bucket = RateBucket::new(60);
        let cancel = CancellationToken::new();

        for _ in 0..60 {
            bucket.acquire(&cancel).await.unwrap();
        }
        assert!(bucket.try_take().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        bucket.acquire(&cancel).await.unwrap();
        bucket.acquire(&cancel).await.unwrap();
        assert!(bucket.try_take().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill() {
        let bucket = RateBucket::new(60);
        let cancel = CancellationToken::new();
        for _ in 0..60 {
            bucket.acquire(&cancel).await.unwrap();
        }

        let start = Instant::now();
        // Paused clock: the sleep inside acquire auto-advances time.
        bucket.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_wait_aborts() {
        let bucket = RateBucket::new(60);
        let cancel = CancellationToken::new();
        for _ in 0..60 {
            bucket.acquire(&cancel).await.unwrap();
        }

        cancel.cancel();
        let err = bucket.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
