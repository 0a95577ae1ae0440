//! Per-series sync checkpoints.
//!
//! Key is `(symbol, data_type, interval)` with `interval` the empty string
//! for everything but candles -- applied uniformly in upsert targets and
//! lookups. `last_data_time` only ever advances: both writers (backfill and
//! streaming) go through `GREATEST(existing, new)`, so replays and the
//! backfill/stream race cannot move the resume anchor backwards.

use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::types::{now_ms, Checkpoint, CheckpointStatus, DataType};

const UPSERT: &str = r#"
INSERT INTO sync_checkpoints (
    symbol, data_type, "interval",
    last_sync_time, last_data_time, status, error_message, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (symbol, data_type, "interval") DO UPDATE SET
    last_sync_time = EXCLUDED.last_sync_time,
    last_data_time = GREATEST(sync_checkpoints.last_data_time, EXCLUDED.last_data_time),
    status = EXCLUDED.status,
    error_message = EXCLUDED.error_message,
    updated_at = EXCLUDED.updated_at
"#;

#[derive(Clone)]
pub struct CheckpointRepository {
    pool: PgPool,
}

impl CheckpointRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one checkpoint. A missing row is `None`, not an error.
    pub async fn get(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: &str,
    ) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, data_type, "interval",
                   last_sync_time, last_data_time, status, error_message, updated_at
            FROM sync_checkpoints
            WHERE symbol = $1 AND data_type = $2 AND "interval" = $3
            "#,
        )
        .bind(symbol)
        .bind(data_type.as_str())
        .bind(interval)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Checkpoint {
                symbol: row.try_get("symbol")?,
                data_type: row
                    .try_get::<String, _>("data_type")?
                    .parse()
                    .map_err(Error::Decode)?,
                interval: row.try_get("interval")?,
                last_sync_time: row.try_get("last_sync_time")?,
                last_data_time: row.try_get("last_data_time")?,
                status: row
                    .try_get::<String, _>("status")?
                    .parse()
                    .map_err(Error::Decode)?,
                error_message: row.try_get("error_message")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Insert or update a full checkpoint record.
    pub async fn upsert(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(UPSERT)
            .bind(&checkpoint.symbol)
            .bind(checkpoint.data_type.as_str())
            .bind(&checkpoint.interval)
            .bind(checkpoint.last_sync_time)
            .bind(checkpoint.last_data_time)
            .bind(checkpoint.status.as_str())
            .bind(&checkpoint.error_message)
            .bind(checkpoint.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance `last_data_time` to at least `t`, stamp `last_sync_time = now`,
    /// mark the series active and clear any recorded error.
    pub async fn touch_last_data_time(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: &str,
        t: i64,
    ) -> Result<()> {
        let now = now_ms();
        sqlx::query(UPSERT)
            .bind(symbol)
            .bind(data_type.as_str())
            .bind(interval)
            .bind(now)
            .bind(t)
            .bind(CheckpointStatus::Active.as_str())
            .bind(Option::<String>::None)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed sync for the series.
    pub async fn mark_error(
        &self,
        symbol: &str,
        data_type: DataType,
        interval: &str,
        message: &str,
    ) -> Result<()> {
        let now = now_ms();
        sqlx::query(UPSERT)
            .bind(symbol)
            .bind(data_type.as_str())
            .bind(interval)
            .bind(now)
            .bind(0i64)
            .bind(CheckpointStatus::Error.as_str())
            .bind(Some(message))
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
