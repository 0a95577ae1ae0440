//! 24h ticker snapshot repository.

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{now_ms, Ticker};

use super::{CHUNK_PAUSE, MAX_BATCH_SIZE, TX_DEADLINE};

const INSERT: &str = r#"
INSERT INTO tickers (
    symbol, timestamp, price,
    bid_price, bid_qty, ask_price, ask_qty,
    volume_24h, quote_volume_24h, price_change_24h, price_change_percent_24h,
    high_24h, low_24h, trades_count_24h, created_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
ON CONFLICT (symbol, timestamp) DO UPDATE SET
    price = EXCLUDED.price,
    bid_price = EXCLUDED.bid_price,
    bid_qty = EXCLUDED.bid_qty,
    ask_price = EXCLUDED.ask_price,
    ask_qty = EXCLUDED.ask_qty,
    volume_24h = EXCLUDED.volume_24h,
    quote_volume_24h = EXCLUDED.quote_volume_24h,
    price_change_24h = EXCLUDED.price_change_24h,
    price_change_percent_24h = EXCLUDED.price_change_percent_24h,
    high_24h = EXCLUDED.high_24h,
    low_24h = EXCLUDED.low_24h,
    trades_count_24h = EXCLUDED.trades_count_24h
"#;

const SELECT_COLUMNS: &str = r#"
SELECT symbol, timestamp, price,
       bid_price, bid_qty, ask_price, ask_qty,
       volume_24h, quote_volume_24h, price_change_24h, price_change_percent_24h,
       high_24h, low_24h, trades_count_24h
FROM tickers
"#;

#[derive(Clone)]
pub struct TickerRepository {
    pool: PgPool,
}

impl TickerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a single snapshot.
    pub async fn insert(&self, ticker: &Ticker) -> Result<()> {
        bind_ticker(sqlx::query(INSERT), ticker, now_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert a batch, chunked and transaction-bounded per the module
    /// contract. Cancellation aborts between chunks; committed chunks stay.
    pub async fn batch_insert(&self, tickers: &[Ticker], cancel: &CancellationToken) -> Result<()> {
        for (i, chunk) in tickers.chunks(MAX_BATCH_SIZE).enumerate() {
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

    async fn insert_chunk(&self, chunk: &[Ticker]) -> Result<()> {
        let created_at = now_ms();
        let tx_body = async {
            let mut tx = self.pool.begin().await?;
            for ticker in chunk {
                bind_ticker(sqlx::query(INSERT), ticker, created_at)
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

    /// Most recent snapshot for a symbol, if any.
    pub async fn last(&self, symbol: &str) -> Result<Option<Ticker>> {
        let sql = format!("{SELECT_COLUMNS} WHERE symbol = $1 ORDER BY timestamp DESC LIMIT 1");
        let ticker = sqlx::query_as::<_, Ticker>(&sql)
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticker)
    }

    /// Snapshots with `start <= timestamp < end`, ascending.
    pub async fn by_time_range(&self, symbol: &str, start: i64, end: i64) -> Result<Vec<Ticker>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE symbol = $1 AND timestamp >= $2 AND timestamp < $3 ORDER BY timestamp ASC"
        );
        let tickers = sqlx::query_as::<_, Ticker>(&sql)
            .bind(symbol)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickers)
    }
}

fn bind_ticker<'q>(
    query: Query<'q, Postgres, PgArguments>,
    ticker: &'q Ticker,
    created_at: i64,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(&ticker.symbol)
        .bind(ticker.timestamp)
        .bind(ticker.price)
        .bind(ticker.bid_price)
        .bind(ticker.bid_qty)
        .bind(ticker.ask_price)
        .bind(ticker.ask_qty)
        .bind(ticker.volume_24h)
        .bind(ticker.quote_volume_24h)
        .bind(ticker.price_change_24h)
        .bind(ticker.price_change_percent_24h)
        .bind(ticker.high_24h)
        .bind(ticker.low_24h)
        .bind(ticker.trades_count_24h)
        .bind(created_at)
}
