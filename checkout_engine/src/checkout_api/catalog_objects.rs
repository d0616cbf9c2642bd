use std::time::Duration;

use checkout_common::Krw;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of an aggregate catalog list. This is the shape that gets cached; `main_image` holds the stored
/// file name, and the presentation URL is rewritten after the payload is materialised, so image hosting can
/// change without invalidating caches.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub price: Krw,
    pub main_image: Option<String>,
}

/// A featured-set change for one product, as submitted by the curation screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturedItem {
    pub product_id: i64,
    pub featured: bool,
    pub featured_rank: Option<i64>,
}

pub const FEATURED_CACHE_KEY: &str = "commerce:catalog:featured";
pub const FEATURED_LOCK_KEY: &str = "commerce:catalog:featured:lock";
pub const POPULAR_CACHE_PREFIX: &str = "commerce:catalog:popular";

pub const FEATURED_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
pub const POPULAR_TTL: Duration = Duration::from_secs(3600);
/// Empty results are cached briefly so an empty catalog cannot be used to bypass the stampede protection.
pub const EMPTY_RESULT_TTL: Duration = Duration::from_secs(120);

pub const CACHE_LOCK_TTL: Duration = Duration::from_millis(400);
pub const MAX_LOCK_RETRIES: u32 = 40;
pub const LOCK_RETRY_DELAY_MS: u64 = 15;
pub const LOCK_RETRY_JITTER_MS: u64 = 15;

pub fn popular_cache_key(window_days: i64, limit: i64) -> String {
    format!("{POPULAR_CACHE_PREFIX}:days{window_days}:top{limit}")
}

pub fn popular_lock_key(window_days: i64, limit: i64) -> String {
    format!("{POPULAR_CACHE_PREFIX}:days{window_days}:top{limit}:lock")
}
