use crate::{checkout_api::order_objects::OrderQueryFilter, db_types::Order, traits::SettlementError};

/// Order queries that sit outside the settlement flow itself. Operator tooling uses the status filter to
/// find terminal `RefundFailed` orders awaiting a manual refund.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Fetches orders according to the criteria in the filter, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, SettlementError>;
}
