//! Token-based distributed mutual exclusion on top of the shared key-value store.
//!
//! Acquisition is a set-if-absent with a TTL; release is an atomic compare-and-delete against the ownership
//! token. The token check is what makes release safe: after a TTL-driven expiry the key may already belong
//! to another holder, and releasing by key alone would unlock *their* critical section.
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use crate::kv_store::KvStore;

/// Proof of lock ownership. Handed out by [`LockProvider::try_lock`] and consumed by
/// [`LockProvider::unlock`]. Holders must release on every path out of their critical section; the TTL is
/// only the backstop against crashed holders.
#[must_use = "a held lock must be released on every path"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone)]
pub struct LockProvider<S> {
    store: S,
}

impl<S: KvStore> LockProvider<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Attempts to acquire the lock. Returns `None` when the lock is already held, or when the store is
    /// unreachable, which callers must treat the same way (do not proceed unprotected).
    pub async fn try_lock(&self, key: &str, ttl: Duration) -> Option<LockToken> {
        let token = Uuid::new_v4().to_string();
        match self.store.set_if_absent(key, &token, ttl).await {
            Ok(true) => Some(LockToken(token)),
            Ok(false) => None,
            Err(e) => {
                warn!("🔒️ Could not reach the lock store for {key}: {e}");
                None
            },
        }
    }

    /// Releases the lock if, and only if, `token` still owns it. Returns `false` when the key expired and
    /// was re-acquired by someone else (their lock is left untouched) or the store is unreachable.
    pub async fn unlock(&self, key: &str, token: &LockToken) -> bool {
        match self.store.compare_and_delete(key, token.as_str()).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("🔒️ Lock {key} was not released: the token no longer owns it");
                false
            },
            Err(e) => {
                warn!("🔒️ Could not release lock {key}: {e}");
                false
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kv_store::MemoryKvStore;

    #[tokio::test]
    async fn only_one_holder_at_a_time() {
        let locks = LockProvider::new(MemoryKvStore::new());
        let ttl = Duration::from_secs(60);
        let token = locks.try_lock("res", ttl).await.expect("first acquisition should succeed");
        assert!(locks.try_lock("res", ttl).await.is_none());
        assert!(locks.unlock("res", &token).await);
        assert!(locks.try_lock("res", ttl).await.is_some());
    }

    #[tokio::test]
    async fn foreign_token_never_releases() {
        let store = MemoryKvStore::new();
        let locks = LockProvider::new(store.clone());
        let ttl = Duration::from_secs(60);
        let holder = locks.try_lock("res", ttl).await.unwrap();
        let stale = LockToken("not-the-owner".to_string());
        assert!(!locks.unlock("res", &stale).await);
        // the real holder is unaffected
        assert!(locks.try_lock("res", ttl).await.is_none());
        assert!(locks.unlock("res", &holder).await);
    }

    #[tokio::test]
    async fn release_after_expiry_does_not_steal_the_new_lock() {
        let locks = LockProvider::new(MemoryKvStore::new());
        let old = locks.try_lock("res", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        // the TTL lapsed and someone else took the lock
        let new = locks.try_lock("res", Duration::from_secs(60)).await.expect("lock should be free again");
        assert!(!locks.unlock("res", &old).await);
        assert!(locks.unlock("res", &new).await);
    }
}
