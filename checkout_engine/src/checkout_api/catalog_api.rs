use std::{fmt::Debug, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use log::*;
use rand::{thread_rng, Rng};

use crate::{
    cache::CacheClient,
    checkout_api::catalog_objects::{
        popular_cache_key,
        popular_lock_key,
        CatalogEntry,
        FeaturedItem,
        CACHE_LOCK_TTL,
        EMPTY_RESULT_TTL,
        FEATURED_CACHE_KEY,
        FEATURED_LOCK_KEY,
        FEATURED_TTL,
        LOCK_RETRY_DELAY_MS,
        LOCK_RETRY_JITTER_MS,
        MAX_LOCK_RETRIES,
        POPULAR_TTL,
    },
    kv_store::KvStore,
    locks::LockProvider,
    traits::{CatalogDatabase, CatalogError},
};

/// `CatalogApi` computes the expensive aggregate product lists behind a stampede-safe read-through cache.
///
/// A cache miss does not let every caller loose on the database: callers race for a short-lived
/// distributed lock scoped to the query shape, the winner re-checks the cache and repopulates it, and the
/// losers retry the lock with jittered sleeps. A caller that exhausts its retries returns an empty list:
/// protecting the database is worth more than serving that one caller, which will simply try again on its
/// next request.
pub struct CatalogApi<B, S> {
    db: B,
    cache: CacheClient<S>,
    locks: LockProvider<S>,
    image_base_url: Option<String>,
}

impl<B, S> Debug for CatalogApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CatalogApi")
    }
}

enum AggregateQuery {
    Featured,
    Popular { window_days: i64, limit: i64 },
}

impl<B, S> CatalogApi<B, S>
where
    B: CatalogDatabase,
    S: KvStore,
{
    pub fn new(db: B, store: S) -> Self {
        Self { db, cache: CacheClient::new(store.clone()), locks: LockProvider::new(store), image_base_url: None }
    }

    /// Base URL prepended to stored image file names when lists are served. The cached payload itself keeps
    /// the raw file names.
    pub fn with_image_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.image_base_url = Some(base_url.into());
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// The curated featured-products list.
    pub async fn get_featured(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        if let Some(entries) = self.cache.get::<Vec<CatalogEntry>>(FEATURED_CACHE_KEY).await {
            trace!("🛍️ Featured list served from cache");
            return Ok(self.present(entries));
        }
        let entries = self
            .populate(FEATURED_CACHE_KEY, FEATURED_LOCK_KEY, FEATURED_TTL, AggregateQuery::Featured)
            .await?
            .unwrap_or_default();
        Ok(self.present(entries))
    }

    /// The best sellers over the last `window_days`, capped at `limit` products.
    pub async fn get_popular(&self, window_days: i64, limit: i64) -> Result<Vec<CatalogEntry>, CatalogError> {
        let cache_key = popular_cache_key(window_days, limit);
        let lock_key = popular_lock_key(window_days, limit);
        if let Some(entries) = self.cache.get::<Vec<CatalogEntry>>(&cache_key).await {
            trace!("🛍️ Popular list {cache_key} served from cache");
            return Ok(self.present(entries));
        }
        let entries = self
            .populate(&cache_key, &lock_key, POPULAR_TTL, AggregateQuery::Popular { window_days, limit })
            .await?
            .unwrap_or_default();
        Ok(self.present(entries))
    }

    /// Replaces the featured set. The cache key is deleted only after the write transaction has committed;
    /// the next reader repopulates it under the lock protocol.
    pub async fn set_featured(&self, items: &[FeaturedItem]) -> Result<(), CatalogError> {
        self.db.update_featured(items).await?;
        self.cache.delete(FEATURED_CACHE_KEY).await;
        debug!("🛍️ Featured set updated ({} products). Cache invalidated", items.len());
        Ok(())
    }

    /// The lock-retry loop around cache population. Returns `None` when the lock could never be acquired;
    /// callers fail open with an empty result instead of querying the database unprotected.
    async fn populate(
        &self,
        cache_key: &str,
        lock_key: &str,
        ttl: Duration,
        query: AggregateQuery,
    ) -> Result<Option<Vec<CatalogEntry>>, CatalogError> {
        for _ in 0..MAX_LOCK_RETRIES {
            let Some(token) = self.locks.try_lock(lock_key, CACHE_LOCK_TTL).await else {
                let jitter = thread_rng().gen_range(0..=LOCK_RETRY_JITTER_MS);
                tokio::time::sleep(Duration::from_millis(LOCK_RETRY_DELAY_MS + jitter)).await;
                continue;
            };
            // release on every path out of the critical section; the TTL only covers crashes
            let result = self.fill_cache(cache_key, ttl, &query).await;
            self.locks.unlock(lock_key, &token).await;
            return result.map(Some);
        }
        warn!("🛍️ Gave up on lock {lock_key} after {MAX_LOCK_RETRIES} attempts. Returning an empty list");
        Ok(None)
    }

    /// Runs under the lock: re-check the cache (another holder may have just filled it), then query and
    /// write back.
    async fn fill_cache(
        &self,
        cache_key: &str,
        ttl: Duration,
        query: &AggregateQuery,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        if let Some(entries) = self.cache.get::<Vec<CatalogEntry>>(cache_key).await {
            trace!("🛍️ Cache for {cache_key} was filled while we waited for the lock");
            return Ok(entries);
        }
        let entries = match query {
            AggregateQuery::Featured => self.db.featured_entries().await?,
            AggregateQuery::Popular { window_days, limit } => {
                let since = Utc::now() - ChronoDuration::days(*window_days);
                self.db.popular_entries(since, *limit).await?
            },
        };
        let ttl = if entries.is_empty() { EMPTY_RESULT_TTL } else { ttl };
        self.cache.set(cache_key, &entries, ttl).await;
        debug!("🛍️ Cache for {cache_key} repopulated with {} entries", entries.len());
        Ok(entries)
    }

    /// Rewrites presentation fields on the way out. The cached payload keeps raw stored file names.
    fn present(&self, mut entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
        if let Some(base) = &self.image_base_url {
            for entry in &mut entries {
                if let Some(file) = &entry.main_image {
                    entry.main_image = Some(format!("{base}/{file}"));
                }
            }
        }
        entries
    }
}
