//! PostgreSQL connection pool and migration runner.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Connect the pool and verify the database answers.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.max_idle_connections)
        .max_lifetime(Duration::from_secs(config.connection_max_lifetime))
        .idle_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.url())
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        "database connection established"
    );

    Ok(pool)
}

/// Execute a migration script. The script is plain multi-statement SQL and
/// idempotent (`CREATE TABLE IF NOT EXISTS` throughout), so re-running it on
/// every startup is safe.
pub async fn run_migrations(pool: &PgPool, migration_sql: &str) -> Result<()> {
    info!("running database migrations");
    sqlx::raw_sql(migration_sql).execute(pool).await?;
    info!("database migrations completed");
    Ok(())
}
