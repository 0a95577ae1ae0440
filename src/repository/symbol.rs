//! Trading-pair roster repository. Symbols are created and toggled by the
//! operator tooling; the collector only reads the active set at startup.

use sqlx::PgPool;

use crate::error::Result;
use crate::types::Symbol;

#[derive(Clone)]
pub struct SymbolRepository {
    pool: PgPool,
}

impl SymbolRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All symbols enrolled in collection, ordered for stable stream lists.
    pub async fn active(&self) -> Result<Vec<Symbol>> {
        let symbols = sqlx::query_as::<_, Symbol>(
            r#"
            SELECT id, symbol, base_asset, quote_asset, status, is_active,
                   created_at, updated_at
            FROM symbols
            WHERE is_active = TRUE
            ORDER BY symbol
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }
}
