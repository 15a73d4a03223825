//! services/api/src/adapters/redis_counter.rs
//!
//! Redis implementation of the `CounterStore` port used by the rate limiter.
//! Every port method is sent as one MULTI/EXEC pipeline so the commands it
//! groups are observed together.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use reflects_core::ports::{CounterStore, PortError, PortResult};
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A counter store backed by a shared, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
}

impl RedisCounterStore {
    /// Opens the connection manager and checks the server answers PING.
    pub async fn connect(url: &str) -> PortResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            PortError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create Redis connection manager: {}", e);
            PortError::Unavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        let store = Self { connection };
        store.ping().await?;
        debug!("Successfully connected to Redis for rate limiting");
        Ok(store)
    }

    async fn ping(&self) -> PortResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: redis::RedisError) -> PortError {
    PortError::Unavailable(format!("Redis error: {}", e))
}

//=========================================================================================
// `CounterStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_count(&self, key: &str) -> PortResult<Option<u64>> {
        let mut conn = self.connection.clone();
        let value: Option<u64> = conn.get(key).await.map_err(unavailable)?;
        Ok(value)
    }

    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> PortResult<u64> {
        let mut conn = self.connection.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(count)
    }

    async fn trim_and_count(&self, key: &str, cutoff_millis: i64) -> PortResult<u64> {
        let mut conn = self.connection.clone();
        // "(" makes the upper bound exclusive: events exactly at the cutoff stay.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", format!("({}", cutoff_millis))
            .ignore()
            .zcard(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(count)
    }

    async fn add_event(
        &self,
        key: &str,
        member: &str,
        score_millis: i64,
        ttl_secs: u64,
    ) -> PortResult<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .zadd(key, member, score_millis)
            .ignore()
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
