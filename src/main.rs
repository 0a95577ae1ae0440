//! Binance live market-data collector.
//!
//! Catches up missing candle history over REST, then streams candles, 24h
//! tickers, depth diffs and aggregated trades over one multiplexed WebSocket
//! connection, persisting to TimescaleDB and republishing to Redis.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use binance_live::binance::rest::RestClient;
use binance_live::bus::RedisBus;
use binance_live::config::Config;
use binance_live::error::{Error, Result};
use binance_live::metrics::{self, Metrics};
use binance_live::publisher::{self, Codec};
use binance_live::repository::{
    CheckpointRepository, KlineRepository, SymbolRepository, TickerRepository,
};
use binance_live::db;
use binance_live::stream::StreamService;
use binance_live::sync::BackfillService;

const MIGRATION_PATH: &str = "migrations/001_init.sql";

#[derive(Parser, Debug)]
#[command(name = "binance-live")]
#[command(about = "Collects Binance market data into TimescaleDB and republishes it on Redis")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.app.log_level.clone())),
        )
        .init();

    info!(
        app = %config.app.name,
        environment = %config.app.environment,
        "starting binance live data collector"
    );

    match run(config).await {
        Ok(()) => {
            info!("shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();
    let metrics = Arc::new(Metrics::new());

    // Acquire dependencies in startup order; each is released in reverse as
    // this function unwinds.
    info!("connecting to database");
    let pool = db::connect(&config.database).await?;

    match std::fs::read_to_string(MIGRATION_PATH) {
        Ok(migration_sql) => db::run_migrations(&pool, &migration_sql).await?,
        Err(e) => warn!(path = MIGRATION_PATH, error = %e, "failed to read migration file"),
    }

    info!("connecting to redis");
    let bus = RedisBus::connect(&config.redis).await?;

    let symbols_repo = SymbolRepository::new(pool.clone());
    let klines_repo = KlineRepository::new(pool.clone());
    let tickers_repo = TickerRepository::new(pool.clone());
    let checkpoints_repo = CheckpointRepository::new(pool.clone());

    let publisher = publisher::new(bus, Codec::default());

    let rest = Arc::new(RestClient::new(&config.binance, cancel.clone())?);

    info!("testing binance api connectivity");
    rest.ping().await?;
    info!("binance api connection established");

    let symbols = symbols_repo.active().await?;
    if symbols.is_empty() {
        warn!("no active symbols found in database");
        return Err(Error::Config("no active symbols configured".into()));
    }
    info!(count = symbols.len(), "active symbols loaded");

    if let Err(e) = publisher.publish_symbols(&symbols).await {
        warn!(error = %e, "failed to publish symbol roster");
    }

    // Serve /health and /metrics for the lifetime of the process.
    let metrics_server = tokio::spawn(metrics::serve_http(
        config.app.metrics_port,
        metrics.clone(),
        cancel.clone(),
    ));

    // Termination signal handler -- installed before backfill so a long
    // catch-up is cancellable too.
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, stopping services");
        shutdown_cancel.cancel();
    });

    // Catch up history before going live.
    let backfill = BackfillService::new(
        rest.clone(),
        klines_repo.clone(),
        checkpoints_repo.clone(),
        config.sync.clone(),
        config.binance.kline_intervals.clone(),
        metrics.clone(),
    );
    backfill.run(&symbols, &cancel).await;

    let stream_service = StreamService::new(
        &config.binance,
        &config.stream,
        &symbols,
        klines_repo,
        tickers_repo,
        checkpoints_repo,
        publisher,
        metrics.clone(),
    );

    info!("starting live data streaming");
    let stream_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { stream_service.run(cancel).await })
    };

    // The stream task ends on cancellation (Ok) or when the reconnect budget
    // is exhausted (Err) -- the latter is an unrecoverable runtime error.
    let stream_result = stream_task
        .await
        .map_err(|e| Error::Config(format!("stream task panicked: {e}")))?;
    cancel.cancel();

    let _ = metrics_server.await;
    pool.close().await;

    stream_result
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
