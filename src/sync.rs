//! Historical candle backfill.
//!
//! Brings every active `(symbol, interval)` pair up to "now", resuming from
//! the pair's checkpoint or from `now - max_sync_hours` when none exists.
//! Pairs run under a semaphore of `sync.workers` permits; a failed pair marks
//! its checkpoint `error` and is counted, but never fails the run -- the
//! stream service can still go live on whatever did sync.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::binance::rest::RestClient;
use crate::binance::wire::decode_kline_row;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::repository::{CheckpointRepository, KlineRepository};
use crate::types::{now_ms, Checkpoint, CheckpointStatus, DataType, Symbol};

/// Stagger between worker starts and between pages of one pair. Keeps the
/// pool and the rate bucket from being hit by a thundering herd.
const PACING_DELAY: Duration = Duration::from_millis(50);

/// Outcome of one backfill run across all pairs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BackfillReport {
    pub pairs: usize,
    pub rows: u64,
    pub errors: usize,
}

#[derive(Clone)]
pub struct BackfillService {
    rest: Arc<RestClient>,
    klines: KlineRepository,
    checkpoints: CheckpointRepository,
    config: SyncConfig,
    intervals: Vec<String>,
    metrics: Arc<Metrics>,
}

impl BackfillService {
    pub fn new(
        rest: Arc<RestClient>,
        klines: KlineRepository,
        checkpoints: CheckpointRepository,
        config: SyncConfig,
        intervals: Vec<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            rest,
            klines,
            checkpoints,
            config,
            intervals,
            metrics,
        }
    }

    /// Backfill every `(symbol, interval)` pair, bounded-parallel. Reports
    /// the aggregate outcome; individual failures never abort the run.
    pub async fn run(&self, symbols: &[Symbol], cancel: &CancellationToken) -> BackfillReport {
        if !self.config.enabled {
            info!("data synchronization is disabled");
            return BackfillReport::default();
        }

        let pairs = symbols.len() * self.intervals.len();
        info!(
            symbol_count = symbols.len(),
            interval_count = self.intervals.len(),
            workers = self.config.workers,
            "starting data synchronization"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<std::result::Result<u64, ()>> = JoinSet::new();

        for symbol in symbols {
            for interval in &self.intervals {
                let service = self.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let symbol = symbol.symbol.clone();
                let interval = interval.clone();

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Err(());
                    };

                    // Stagger worker starts.
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(()),
                        _ = tokio::time::sleep(PACING_DELAY) => {}
                    }

                    match service.backfill_pair(&symbol, &interval, &cancel).await {
                        Ok(rows) => Ok(rows),
                        Err(e) => {
                            error!(symbol = %symbol, interval = %interval, error = %e, "failed to sync klines");
                            if let Err(mark_err) = service
                                .checkpoints
                                .mark_error(&symbol, DataType::Kline, &interval, &e.to_string())
                                .await
                            {
                                warn!(symbol = %symbol, error = %mark_err, "failed to record sync error");
                            }
                            Err(())
                        }
                    }
                });
            }
        }

        let mut report = BackfillReport {
            pairs,
            ..BackfillReport::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(rows)) => report.rows += rows,
                Ok(Err(())) => report.errors += 1,
                Err(e) => {
                    error!(error = %e, "backfill worker panicked");
                    report.errors += 1;
                }
            }
        }

        self.metrics.backfill_rows.fetch_add(report.rows, Relaxed);
        self.metrics
            .backfill_errors
            .fetch_add(report.errors as u64, Relaxed);

        if report.errors > 0 {
            warn!(
                error_count = report.errors,
                rows = report.rows,
                "data synchronization completed with errors"
            );
        } else {
            info!(rows = report.rows, "data synchronization completed");
        }

        report
    }

    /// Catch one pair up to "now", page by page, advancing the checkpoint
    /// after every persisted page so an interrupted run resumes where it
    /// stopped.
    async fn backfill_pair(
        &self,
        symbol: &str,
        interval: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        info!(symbol = %symbol, interval = %interval, "syncing klines");

        let checkpoint = self
            .checkpoints
            .get(symbol, DataType::Kline, interval)
            .await?;

        let end = now_ms();
        let mut current = resume_start(checkpoint.as_ref(), end, self.config.max_sync_hours);
        let interval_ms = interval_duration_ms(interval);
        let mut total = 0u64;

        while current < end {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let page_end = batch_end(current, end, self.config.batch_size, interval_ms);
            let rows = self
                .rest
                .klines(
                    symbol,
                    interval,
                    Some(current),
                    Some(page_end),
                    Some(self.config.batch_size),
                )
                .await?;

            if rows.is_empty() {
                break;
            }

            let mut batch = Vec::with_capacity(rows.len());
            for row in &rows {
                match decode_kline_row(row) {
                    Ok(decoded) => batch.push(decoded.into_kline(symbol, interval)),
                    Err(e) => {
                        warn!(symbol = %symbol, interval = %interval, error = %e, "skipping malformed kline row");
                    }
                }
            }

            if let Some(last) = batch.last() {
                let last_open_time = last.open_time;
                self.klines.batch_insert(&batch, cancel).await?;
                total += batch.len() as u64;

                let now = now_ms();
                if let Err(e) = self
                    .checkpoints
                    .upsert(&Checkpoint {
                        symbol: symbol.to_string(),
                        data_type: DataType::Kline,
                        interval: interval.to_string(),
                        last_sync_time: now,
                        last_data_time: last_open_time,
                        status: CheckpointStatus::Active,
                        error_message: None,
                        updated_at: now,
                    })
                    .await
                {
                    warn!(symbol = %symbol, interval = %interval, error = %e, "failed to update checkpoint");
                }

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(PACING_DELAY) => {}
                }
            }

            current = page_end;
        }

        info!(symbol = %symbol, interval = %interval, total_klines = total, "klines synced");
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// Window arithmetic (pure, unit-tested)
// ---------------------------------------------------------------------------

/// Where a pair resumes: its checkpoint's `last_data_time` when one exists,
/// otherwise `now - max_sync_hours`.
pub fn resume_start(checkpoint: Option<&Checkpoint>, now: i64, max_sync_hours: i64) -> i64 {
    match checkpoint {
        Some(cp) if cp.last_data_time != 0 => cp.last_data_time,
        _ => now - max_sync_hours * 3_600_000,
    }
}

/// End of the next request window: `batch_size` candle widths past `start`,
/// clamped to `end`.
pub fn batch_end(start: i64, end: i64, batch_size: u32, interval_ms: i64) -> i64 {
    (start + i64::from(batch_size) * interval_ms).min(end)
}

/// Candle width in milliseconds. `1M` is treated as 30 days for pagination
/// windowing; unknown intervals default to one hour.
pub fn interval_duration_ms(interval: &str) -> i64 {
    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;

    match interval {
        "1m" => MINUTE,
        "3m" => 3 * MINUTE,
        "5m" => 5 * MINUTE,
        "15m" => 15 * MINUTE,
        "30m" => 30 * MINUTE,
        "1h" => HOUR,
        "2h" => 2 * HOUR,
        "4h" => 4 * HOUR,
        "6h" => 6 * HOUR,
        "8h" => 8 * HOUR,
        "12h" => 12 * HOUR,
        "1d" => DAY,
        "3d" => 3 * DAY,
        "1w" => 7 * DAY,
        "1M" => 30 * DAY,
        _ => HOUR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::checkpoint;

    #[test]
    fn interval_table_is_authoritative() {
        assert_eq!(interval_duration_ms("1m"), 60_000);
        assert_eq!(interval_duration_ms("30m"), 1_800_000);
        assert_eq!(interval_duration_ms("1h"), 3_600_000);
        assert_eq!(interval_duration_ms("12h"), 43_200_000);
        assert_eq!(interval_duration_ms("1d"), 86_400_000);
        assert_eq!(interval_duration_ms("1w"), 604_800_000);
        // 1M paginates as 30 days.
        assert_eq!(interval_duration_ms("1M"), 2_592_000_000);
        // Unknown intervals default to one hour.
        assert_eq!(interval_duration_ms("7m"), 3_600_000);
    }

    #[test]
    fn resume_prefers_checkpoint() {
        let cp = checkpoint("BTCUSDT", DataType::Kline, "1h", 1_700_000_000_000);
        assert_eq!(
            resume_start(Some(&cp), 1_700_028_800_000, 24),
            1_700_000_000_000
        );
    }

    #[test]
    fn resume_falls_back_to_horizon() {
        // No checkpoint: now - 24h.
        assert_eq!(
            resume_start(None, 1_700_028_800_000, 24),
            1_700_028_800_000 - 24 * 3_600_000
        );

        // Zeroed checkpoint counts as absent.
        let cp = checkpoint("BTCUSDT", DataType::Kline, "1h", 0);
        assert_eq!(
            resume_start(Some(&cp), 1_700_028_800_000, 24),
            1_700_028_800_000 - 24 * 3_600_000
        );
    }

    #[test]
    fn one_window_covers_a_short_gap() {
        // 8 hours of 1h candles against a 500-candle window: a single page
        // clamped to `end`.
        let start = 1_700_000_000_000;
        let end = 1_700_028_800_000;
        let window = batch_end(start, end, 500, interval_duration_ms("1h"));
        assert_eq!(window, end);
    }

    #[test]
    fn long_gaps_paginate() {
        let start = 0;
        let end = 10 * 24 * 3_600_000; // ten days
        let interval_ms = interval_duration_ms("1h");

        let first = batch_end(start, end, 100, interval_ms);
        assert_eq!(first, 100 * interval_ms); // 100 hours
        let second = batch_end(first, end, 100, interval_ms);
        assert_eq!(second, 200 * interval_ms);
        assert!(second < end);
    }
}
