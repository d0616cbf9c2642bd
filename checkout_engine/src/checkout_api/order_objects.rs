use checkout_common::Krw;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{OrderNumber, OrderStatusType};

/// The inbound settlement request, as forwarded by the HTTP layer after the checkout widget completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub order_number: OrderNumber,
    /// The provider-issued reference for the authorised charge.
    pub payment_key: String,
    /// The amount the provider reports as charged. Must equal the order's frozen `final_price` exactly.
    pub amount: Krw,
    /// The id of the authenticated caller. Must match the order's owner.
    pub user_id: i64,
}

/// The outcome of a successful cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResult {
    pub success: bool,
    pub order_number: OrderNumber,
    pub cancelled_at: DateTime<Utc>,
    /// Amount reversed at the provider. Zero for orders that were never charged.
    pub refund_amount: Krw,
    pub refund_method: Option<String>,
}

/// Filter for order searches. Builder-style; an empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub order_number: Option<OrderNumber>,
    pub user_id: Option<i64>,
    pub status: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn with_order_number(mut self, order_number: OrderNumber) -> Self {
        self.order_number = Some(order_number);
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order_number.is_none()
            && self.user_id.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }
}
