//! # SQLite database methods
//!
//! This module contains the "low-level" SQLite interactions.
//!
//! All of these are plain functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or open an atomic transaction as the need arises
//! and pass `&mut *tx` through without any other changes. Transaction boundaries therefore always live in
//! the calling layer, which is what keeps the settlement critical section in one place.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod carts;
pub mod order_lines;
pub mod orders;
pub mod products;

const SQLITE_DB_URL: &str = "sqlite://data/checkout_store.db";

pub fn db_url() -> String {
    let result = env::var("COMMERCE_DATABASE_URL").unwrap_or_else(|_| {
        info!("COMMERCE_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // WAL + a busy timeout so that concurrent settlement transactions queue instead of failing fast
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
