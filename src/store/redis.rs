//! Redis-backed record store for multi-instance deployments.
//!
//! Records are stored with plain `GET` / `SET`. No expiry is set; retention
//! is left to the Redis eviction policy.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info};

use super::{decode_stored, RecordStore, StoreError};
use crate::config::RedisOptions;
use crate::limiter::{ClientKey, LimitRecord};

/// Record store backed by a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Wrap an established connection.
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Open a connection using the configured options.
    pub async fn connect(options: &RedisOptions) -> Result<Self, StoreError> {
        info!(url = %options.redacted_url(), "Connecting to Redis");

        let client = redis::Client::open(options.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = tokio::time::timeout(
            options.connect_timeout(),
            client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| {
            StoreError::Connection(format!(
                "timed out after {}s",
                options.connect_timeout_secs
            ))
        })?
        .map_err(map_redis_error)?;

        Ok(Self::new(conn))
    }
}

/// Classify a Redis error as a transport or command failure.
fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, key: &ClientKey) -> Result<Option<LimitRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key.as_str()).await.map_err(map_redis_error)?;

        debug!(key = %key, found = raw.is_some(), "Fetched limit record");
        Ok(raw.and_then(|raw| decode_stored(key, &raw)))
    }

    async fn set(&self, key: &ClientKey, record: &LimitRecord) -> Result<(), StoreError> {
        let encoded = record.encode()?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key.as_str(), encoded)
            .await
            .map_err(map_redis_error)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}
