use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, warn};

use super::{KvStore, StoreError};

/// Redis-backed store. Values are stored as JSON strings with `SET ... EX`.
///
/// One `ConnectionManager` is shared by every call; it multiplexes commands
/// over a single connection and reconnects on its own after failures.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self { connection_manager }
    }

    /// Connects to `url` and pings the server once.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client: {e}");
            StoreError::Unavailable(format!("Invalid Redis URL: {e}"))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create Redis connection manager: {e}");
            StoreError::Unavailable(format!("Redis connection error: {e}"))
        })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis PING error: {e}")))?;

        debug!("Connected to Redis");
        Ok(Self::new(connection_manager))
    }

    fn connection(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let mut conn = self.connection();

        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis GET error: {e}")))?;

        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Malformed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection();
        let json = value.to_string();

        redis::cmd("SET")
            .arg(key)
            .arg(json)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Redis SET error: {e}")))?;

        debug!(key, ttl_secs, "Stored value in Redis");
        Ok(())
    }
}
