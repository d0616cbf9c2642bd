//! Checkout Settlement Engine
//!
//! This library is the settlement core behind the commerce checkout server. It turns a tentative order into a
//! financially confirmed, stock-reserved order exactly once, even under concurrent retries and an unreliable
//! external payment provider, and it protects the catalog's expensive aggregate queries behind a
//! stampede-safe read-through cache.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the reference backend. You should never need
//!    to access the database directly; use the public APIs instead. The exception is the data types used in the
//!    database, defined in the public `db_types` module.
//! 2. The public APIs ([`mod@checkout_api`]). [`SettlementApi`] owns the order lifecycle (creation, payment
//!    confirmation, cancellation and compensation), and [`CatalogApi`] serves the hot aggregate product lists
//!    through the distributed-lock + jittered-TTL cache protocol.
//! 3. The shared key-value layer ([`mod@kv_store`], [`mod@locks`], [`mod@cache`]) used for distributed mutual
//!    exclusion and the read-through cache. Redis is the production backend; an in-memory backend is provided
//!    for embedded use and tests.
//!
//! The engine also emits events when orders are settled or annulled. A simple hook system lets you subscribe
//! to these events and perform custom actions, such as notifying a fulfilment service.
mod checkout_api;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub mod cache;
pub mod db_types;
pub mod events;
pub mod kv_store;
pub mod locks;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use checkout_api::{
    catalog_api::CatalogApi,
    catalog_objects,
    order_objects,
    settlement_api::{SettlementApi, DELIVERY_FEE},
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CatalogDatabase,
    CatalogError,
    ClientOutcome,
    ConfirmRequest,
    GatewayError,
    GatewayPayment,
    GatewayRefund,
    InventoryManagement,
    OrderManagement,
    PaymentGateway,
    SettlementDatabase,
    SettlementError,
    SettlementOutcome,
    StockDirection,
};
