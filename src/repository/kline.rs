//! Candlestick repository.

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{now_ms, Kline};

use super::{CHUNK_PAUSE, MAX_BATCH_SIZE, TX_DEADLINE};

// `interval` is a reserved word in PostgreSQL, hence the quoting.
const INSERT: &str = r#"
INSERT INTO klines (
    symbol, "interval", open_time, close_time,
    open_price, high_price, low_price, close_price,
    volume, quote_volume, trades_count,
    taker_buy_volume, taker_buy_quote_volume, created_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
ON CONFLICT (symbol, "interval", open_time) DO UPDATE SET
    close_time = EXCLUDED.close_time,
    open_price = EXCLUDED.open_price,
    high_price = EXCLUDED.high_price,
    low_price = EXCLUDED.low_price,
    close_price = EXCLUDED.close_price,
    volume = EXCLUDED.volume,
    quote_volume = EXCLUDED.quote_volume,
    trades_count = EXCLUDED.trades_count,
    taker_buy_volume = EXCLUDED.taker_buy_volume,
    taker_buy_quote_volume = EXCLUDED.taker_buy_quote_volume
"#;

const SELECT_COLUMNS: &str = r#"
SELECT symbol, "interval", open_time, close_time,
       open_price, high_price, low_price, close_price,
       volume, quote_volume, trades_count,
       taker_buy_volume, taker_buy_quote_volume
FROM klines
"#;

#[derive(Clone)]
pub struct KlineRepository {
    pool: PgPool,
}

impl KlineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a single candle.
    pub async fn insert(&self, kline: &Kline) -> Result<()> {
        bind_kline(sqlx::query(INSERT), kline, now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert a batch, chunked and transaction-bounded per the module
    /// contract. Cancellation aborts between chunks; committed chunks stay.
    pub async fn batch_insert(&self, klines: &[Kline], cancel: &CancellationToken) -> Result<()> {
        for (i, chunk) in klines.chunks(MAX_BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(CHUNK_PAUSE) => {}
                }
            }
            self.insert_chunk(chunk).await?;
        }
        Ok(())
    }

    /// One chunk in one transaction with a wall-time bound. Dropping the
    /// transaction on timeout or error rolls it back; nothing partial
    /// commits.
    async fn insert_chunk(&self, chunk: &[Kline]) -> Result<()> {
        let created_at = now_ms();
        let tx_body = async {
            let mut tx = self.pool.begin().await?;
            for kline in chunk {
                bind_kline(sqlx::query(INSERT), kline, created_at)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        };

        match tokio::time::timeout(TX_DEADLINE, tx_body).await {
            Ok(result) => result,
            Err(_) => Err(Error::TxTimeout(TX_DEADLINE)),
        }
    }

    /// Most recent candle for a series, if any.
    pub async fn last(&self, symbol: &str, interval: &str) -> Result<Option<Kline>> {
        let sql = format!(
            r#"{SELECT_COLUMNS} WHERE symbol = $1 AND "interval" = $2 ORDER BY open_time DESC LIMIT 1"#
        );
        let kline = sqlx::query_as::<_, Kline>(&sql)
            .bind(symbol)
            .bind(interval)
            .fetch_optional(&self.pool)
            .await?;
        Ok(kline)
    }

    /// Candles with `start <= open_time < end`, ascending.
    pub async fn by_time_range(
        &self,
        symbol: &str,
        interval: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<Kline>> {
        let sql = format!(
            r#"{SELECT_COLUMNS}
               WHERE symbol = $1 AND "interval" = $2 AND open_time >= $3 AND open_time < $4
               ORDER BY open_time ASC"#
        );
        let klines = sqlx::query_as::<_, Kline>(&sql)
            .bind(symbol)
            .bind(interval)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(klines)
    }
}

fn bind_kline<'q>(
    query: Query<'q, Postgres, PgArguments>,
    kline: &'q Kline,
    created_at: i64,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(&kline.symbol)
        .bind(&kline.interval)
        .bind(kline.open_time)
        .bind(kline.close_time)
        .bind(kline.open_price)
        .bind(kline.high_price)
        .bind(kline.low_price)
        .bind(kline.close_price)
        .bind(kline.volume)
        .bind(kline.quote_volume)
        .bind(kline.trades_count)
        .bind(kline.taker_buy_volume)
        .bind(kline.taker_buy_quote_volume)
        .bind(created_at)
}
