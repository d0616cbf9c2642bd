//! # Shared key-value store
//!
//! A thin abstraction over the key-value store used for distributed locks and the read-through cache.
//! Values are opaque strings with a TTL; the only non-trivial operation is the atomic compare-and-delete
//! used for safe lock release.
//!
//! Two backends are provided: [`RedisKvStore`] for deployments sharing state across replicas, and
//! [`MemoryKvStore`] for embedded single-process runs and tests.
use std::time::Duration;

use thiserror::Error;

mod memory_store;
mod redis_store;

pub use memory_store::MemoryKvStore;
pub use redis_store::RedisKvStore;

#[allow(async_fn_in_trait)]
pub trait KvStore: Clone + Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvStoreError>;

    /// Unconditional write with a TTL.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvStoreError>;

    /// Set-if-absent with a TTL. Returns `true` if the key was written, `false` if it already held a live
    /// value.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvStoreError>;

    /// Returns `true` if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, KvStoreError>;

    /// Deletes the key only if its current value equals `expected`, atomically. Returns `true` if the entry
    /// was removed.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum KvStoreError {
    #[error("Key-value store error: {0}")]
    Backend(String),
}
