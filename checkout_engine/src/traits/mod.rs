//! # Backend and collaborator contracts
//!
//! This module defines the interface contracts of the settlement engine's *backends* and external
//! collaborators.
//!
//! ## Traits
//! * [`SettlementDatabase`] defines the order/stock persistence behaviour the Order Lifecycle Coordinator
//!   needs: atomic settlement, the compensation breadcrumbs, and the cancel transitions.
//! * [`InventoryManagement`] exposes the batched conditional stock adjustment on its own.
//! * [`OrderManagement`] provides order queries (used, among other things, by operator tooling looking for
//!   terminal `RefundFailed` orders).
//! * [`CatalogDatabase`] provides the expensive aggregate catalog queries that sit behind the read-through
//!   cache.
//! * [`PaymentGateway`] is the seam to the external payment provider. The production implementation lives in
//!   the `toss_tools` crate; tests inject a scripted mock.
mod catalog_database;
mod inventory;
mod order_management;
mod payment_gateway;
mod settlement_database;

pub use catalog_database::{CatalogDatabase, CatalogError};
pub use inventory::{InventoryManagement, StockDirection};
pub use order_management::OrderManagement;
pub use payment_gateway::{ConfirmRequest, GatewayError, GatewayPayment, GatewayRefund, PaymentGateway};
pub use settlement_database::{ClientOutcome, SettlementDatabase, SettlementError, SettlementOutcome};
