use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType};

/// Emitted after an order has been settled: the charge is captured and stock is reserved. Typical
/// subscribers kick off fulfilment or send a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when an order leaves the happy path for good: a user cancellation or a stock-exhaustion
/// compensation. The status distinguishes the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub status: OrderStatusType,
}

impl OrderAnnulledEvent {
    pub fn new(order: Order) -> Self {
        let status = order.status;
        Self { order, status }
    }
}
