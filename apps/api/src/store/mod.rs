//! Key-value store used for cross-instance state (rate-limit windows).
//!
//! Values are JSON documents with a per-key TTL. The store gives no
//! cross-key or read-modify-write guarantees; callers that need them
//! must tolerate lost updates.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed value at key '{key}': {message}")]
    Malformed { key: String, message: String },
}

/// Get/put-with-TTL contract over a shared JSON key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Overwrites the value at `key`, expiring it after `ttl_secs`.
    async fn put(&self, key: &str, value: &serde_json::Value, ttl_secs: u64)
        -> Result<(), StoreError>;
}
