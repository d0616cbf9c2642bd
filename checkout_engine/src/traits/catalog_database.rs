use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    checkout_api::catalog_objects::{CatalogEntry, FeaturedItem},
    db_types::{NewProduct, Product},
};

/// The aggregate catalog queries that sit behind the read-through cache, plus the writes that invalidate it.
#[allow(async_fn_in_trait)]
pub trait CatalogDatabase: Clone {
    async fn insert_product(&self, product: NewProduct) -> Result<Product, CatalogError>;

    /// The curated home-page list: featured products in rank order.
    async fn featured_entries(&self) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// The best sellers since `since`, by units sold across settled orders, capped at `limit`.
    async fn popular_entries(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CatalogEntry>, CatalogError>;

    /// Replaces the featured flags/ranks for the given products in a single transaction. Cache invalidation
    /// is the caller's job and must happen only after this has committed.
    async fn update_featured(&self, items: &[FeaturedItem]) -> Result<(), CatalogError>;
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        CatalogError::DatabaseError(e.to_string())
    }
}
