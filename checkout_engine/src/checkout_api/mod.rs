//! # Checkout engine public API
//!
//! The `checkout_api` module exposes the programmatic API of the settlement engine. The API is modular:
//! clients pick the parts they need, and different parts can run against different backends.
//!
//! * [`settlement_api`] is the Order Lifecycle Coordinator: order creation, payment confirmation,
//!   cancellation, and the compensating transaction that reverses a charge when stock runs out after the
//!   provider has already confirmed it.
//! * [`catalog_api`] serves the expensive aggregate product lists (featured, popular) through the
//!   distributed-lock + jittered-TTL read-through cache.
//!
//! The other submodules hold the request/response objects used by these APIs.
//!
//! # API usage
//!
//! An API instance is created by supplying a backend that implements the traits the API requires, plus the
//! external collaborators it talks to:
//!
//! ```rust,ignore
//! use checkout_engine::{SettlementApi, SqliteDatabase};
//! use toss_tools::TossApi;
//! let db = SqliteDatabase::new(25).await?;
//! let gateway = TossApi::new_from_env()?;
//! let api = SettlementApi::new(db, gateway);
//! let order = api.create_direct_order(user_id, product_id, 2).await?;
//! ```
pub mod catalog_api;
pub mod catalog_objects;
pub mod order_objects;
pub mod settlement_api;
