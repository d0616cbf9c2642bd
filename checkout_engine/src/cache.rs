//! Typed read-through cache entries on top of the shared key-value store.
//!
//! Entries are JSON payloads with a jittered TTL so that entries written together do not expire together
//! across replicas. A store outage degrades to a cache miss; the stampede protection around the database
//! lives in the caller's lock protocol, not here.
use std::time::Duration;

use log::warn;
use rand::{thread_rng, Rng};
use serde::{de::DeserializeOwned, Serialize};

use crate::kv_store::KvStore;

const MAX_TTL_JITTER: Duration = Duration::from_secs(600);
const MIN_TTL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct CacheClient<S> {
    store: S,
}

impl<S: KvStore> CacheClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reads and deserialises a cached value. Corrupted entries are deleted and reported as a miss so that
    /// the next reader repopulates them.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let serialized = match self.store.get(key).await {
            Ok(value) => value?,
            Err(e) => {
                warn!("Cache read for {key} failed: {e}");
                return None;
            },
        };
        match serde_json::from_str(&serialized) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache entry for {key} could not be deserialized: {e}. Deleting it");
                if let Err(e) = self.store.delete(key).await {
                    warn!("Could not delete corrupted cache entry {key}: {e}");
                }
                None
            },
        }
    }

    /// Serialises and writes a value with `base_ttl` plus jitter. Best-effort: failures are logged and the
    /// entry is simply absent for the next reader.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, base_ttl: Duration) {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("Could not serialize cache entry for {key}: {e}");
                return;
            },
        };
        if let Err(e) = self.store.put(key, &serialized, jitter_ttl(base_ttl)).await {
            warn!("Cache write for {key} failed: {e}");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!("Cache delete for {key} failed: {e}");
        }
    }
}

/// `base` plus a uniform random extra of up to 10% of `base`, capped at 10 minutes, with a 1 second floor.
pub fn jitter_ttl(base: Duration) -> Duration {
    let range = (base / 10).min(MAX_TTL_JITTER);
    let extra_ms = if range.is_zero() { 0 } else { thread_rng().gen_range(0..=range.as_millis() as u64) };
    (base + Duration::from_millis(extra_ms)).max(MIN_TTL)
}
