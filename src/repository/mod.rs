//! Idempotent repositories over the time-partitioned schema.
//!
//! Every write is an upsert on the series primary key, so replaying an event
//! or re-running a backfill window converges on the same stored row. Batched
//! writes are chunked ([`MAX_BATCH_SIZE`] rows per transaction), each chunk's
//! transaction is bounded to [`TX_DEADLINE`] wall time, and chunks are
//! separated by [`CHUNK_PAUSE`] to relieve pool pressure. A chunk that fails
//! rolls back alone; earlier chunks stay committed (at-least-once per record,
//! made harmless by the upserts).

use std::time::Duration;

mod checkpoint;
mod kline;
mod symbol;
mod ticker;

pub use checkpoint::CheckpointRepository;
pub use kline::KlineRepository;
pub use symbol::SymbolRepository;
pub use ticker::TickerRepository;

/// Most rows a single transaction may carry.
pub const MAX_BATCH_SIZE: usize = 100;

/// Pause between consecutive chunks of one batch.
pub const CHUNK_PAUSE: Duration = Duration::from_millis(200);

/// Wall-time bound on one chunk's transaction. On expiry the transaction
/// future is dropped, which rolls the transaction back.
pub const TX_DEADLINE: Duration = Duration::from_secs(30);
