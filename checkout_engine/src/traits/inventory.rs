use std::{collections::BTreeMap, fmt::Display};

use crate::traits::SettlementError;

/// Which way a stock adjustment moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    /// Restores stock. No precondition.
    Increase,
    /// Reserves stock. Each row is only updated if the remaining stock covers the requested quantity.
    Decrease,
}

impl Display for StockDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StockDirection::Increase => write!(f, "increase"),
            StockDirection::Decrease => write!(f, "decrease"),
        }
    }
}

/// Access to the per-product stock counters.
///
/// Stock is the single most contended resource in the system, so it is never mutated through
/// read-modify-write in the application layer. All mutations are pushed down as a single set-based
/// conditional update.
#[allow(async_fn_in_trait)]
pub trait InventoryManagement: Clone {
    /// Adjusts the stock of every product in `qty_by_product` in one batched statement. The map keys the
    /// batch by product id, so a product can appear at most once, and iteration order is ascending: every
    /// concurrent caller acquires row locks in the same order.
    ///
    /// For [`StockDirection::Decrease`], each row carries the predicate `stock >= qty`. The return value is
    /// the number of rows actually updated; callers must treat `updated != requested` as total failure and
    /// roll back their enclosing transaction. There are no partial-commit semantics at this layer.
    async fn conditional_adjust_stock(
        &self,
        qty_by_product: &BTreeMap<i64, i64>,
        direction: StockDirection,
    ) -> Result<u64, SettlementError>;
}
