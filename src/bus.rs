//! Redis pub/sub bus and latest-value cache.
//!
//! One [`ConnectionManager`] shared by every publisher clone -- it
//! multiplexes commands and re-establishes the connection on its own after a
//! drop, so callers never see connection lifecycle.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use crate::config::RedisConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct RedisBus {
    conn: ConnectionManager,
    default_ttl: Duration,
}

impl RedisBus {
    /// Connect and verify the server answers a PING.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())?;
        let conn = ConnectionManager::new(client).await?;

        let bus = Self {
            conn,
            default_ttl: Duration::from_secs(config.live_data_ttl),
        };
        bus.ping().await?;

        info!(host = %config.host, port = config.port, db = config.db, "redis connection established");
        Ok(bus)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// PUBLISH `payload` on `channel`.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// SET `key` with a TTL. A zero TTL means the configured
    /// `redis.live_data_ttl` default.
    pub async fn set_with_ttl(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, payload, ttl.as_secs()).await?;
        Ok(())
    }
}
