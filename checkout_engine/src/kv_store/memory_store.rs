use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use super::{KvStore, KvStoreError};

/// In-process [`KvStore`] backend. Single mutex-guarded map with lazy expiry. Used for embedded runs and
/// tests; it honours the same TTL and compare-and-delete semantics as the Redis backend.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredValue>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvStoreError> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(stored) if stored.is_live() => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvStoreError> {
        let stored = StoredValue { value: value.to_string(), expires_at: Instant::now() + ttl };
        self.lock().insert(key.to_string(), stored);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvStoreError> {
        let mut entries = self.lock();
        if entries.get(key).map(StoredValue::is_live).unwrap_or(false) {
            return Ok(false);
        }
        let stored = StoredValue { value: value.to_string(), expires_at: Instant::now() + ttl };
        entries.insert(key.to_string(), stored);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvStoreError> {
        match self.lock().remove(key) {
            Some(stored) => Ok(stored.is_live()),
            None => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, KvStoreError> {
        let mut entries = self.lock();
        let matches = match entries.get(key) {
            Some(stored) => stored.is_live() && stored.value == expected,
            None => false,
        };
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }
}
