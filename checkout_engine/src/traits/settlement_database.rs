use checkout_common::Krw;
use thiserror::Error;

use crate::{
    db_types::{CartLineProduct, NewOrder, Order, OrderLine, OrderNumber, PaymentSettlement, Product},
    traits::GatewayError,
};

/// This trait defines the persistence behaviour required by the Order Lifecycle Coordinator.
///
/// This behaviour includes:
/// * Creating orders with their line items in a single transaction.
/// * The atomic settlement step: the `Ready → Paid` transition together with the conditional stock decrement.
/// * The durable breadcrumbs of the two-phase compensating transaction.
/// * The cancel transitions, including the `CancelRequested` serialisation state.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Persists a new order and its line items in a single atomic transaction. Line items and cart links are
    /// written in ascending id order so that concurrent inserts acquire row locks in a consistent order.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementError>;

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, SettlementError>;

    async fn fetch_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, SettlementError>;

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, SettlementError>;

    /// Fetches the given cart lines, joined with their products, restricted to the given user. Unknown ids and
    /// lines belonging to other users are silently absent from the result.
    async fn fetch_cart_lines(
        &self,
        user_id: i64,
        cart_line_ids: &[i64],
    ) -> Result<Vec<CartLineProduct>, SettlementError>;

    /// Hard-deletes an abandoned order and its line items. Only legal for orders whose payment confirmation
    /// failed before any state mutation.
    async fn delete_order(&self, order_number: &OrderNumber) -> Result<(), SettlementError>;

    /// Applies settlement in one atomic transaction: transitions the order from `Ready` to `Paid` (the
    /// serialising write), records the payment metadata, and decrements stock for every line item with the
    /// `stock >= qty` predicate. If any line item's decrement is infeasible the whole transaction is rolled
    /// back, no stock is mutated, and [`SettlementOutcome::OutOfStock`] is returned.
    ///
    /// When the status transition misses (another settlement won the race), the post-transition state decides
    /// the outcome: a `Paid` order carrying the same payment key is an idempotent replay
    /// ([`SettlementOutcome::AlreadyPaid`]); anything else is a [`SettlementOutcome::Conflict`].
    async fn settle_order(
        &self,
        order_number: &OrderNumber,
        payment: &PaymentSettlement,
    ) -> Result<SettlementOutcome, SettlementError>;

    /// Durably records the payment key with status `RefundFailed` in its own committed transaction. Written
    /// *before* the gateway reversal is attempted, so a crash between the two compensation phases leaves an
    /// order that an operator can find and refund by hand.
    async fn record_refund_marker(&self, order_number: &OrderNumber, payment_key: &str)
        -> Result<(), SettlementError>;

    /// Completes compensation after a successful gateway reversal: `RefundFailed → Cancelled`. Stock is not
    /// touched; the failed settlement never committed a decrement.
    async fn complete_compensation(&self, order_number: &OrderNumber) -> Result<Order, SettlementError>;

    /// Cancels an order that was never charged: `Ready → Cancelled`, no stock restore.
    async fn cancel_unpaid_order(&self, order_number: &OrderNumber) -> Result<Order, SettlementError>;

    /// Starts cancellation of a paid order: `Paid → CancelRequested`. The conditional transition blocks a
    /// concurrent confirmation or a second cancellation of the same order.
    async fn begin_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError>;

    /// Completes cancellation in one atomic transaction: `CancelRequested → Cancelled` plus the unconditional
    /// batched stock restore for every line item.
    async fn complete_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError>;

    /// Rolls a failed cancellation back to `Paid` after the gateway refused to reverse the charge.
    async fn revert_cancel(&self, order_number: &OrderNumber) -> Result<Order, SettlementError>;

    /// Deletes the cart lines a cart-sourced order was assembled from. Post-settlement cleanup; the caller
    /// treats failures as non-fatal.
    async fn clear_cart_lines_for_order(&self, order: &Order) -> Result<u64, SettlementError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementError> {
        Ok(())
    }
}

/// Result of the atomic settlement step.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The order was settled by this call. Stock has been decremented.
    Settled(Order),
    /// The order was already settled with the same payment key. Idempotent replay; nothing was changed.
    AlreadyPaid(Order),
    /// The order is in a state that does not allow settlement (cancelled, refund-failed, or settled with a
    /// different payment key). Nothing was changed.
    Conflict(Order),
    /// At least one line item could not be decremented. The transaction was rolled back in full.
    OutOfStock,
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The order {0} does not exist")]
    OrderNotFound(OrderNumber),
    #[error("The order {0} does not belong to the caller")]
    Forbidden(OrderNumber),
    #[error("The order {0} is not in a state that allows this operation")]
    Conflict(OrderNumber),
    #[error("The charged amount {actual} does not match the order total {expected}")]
    InvalidAmount { expected: Krw, actual: Krw },
    #[error("The payment provider declined the request: {0}")]
    GatewayRejected(String),
    #[error("The payment provider could not be reached: {0}")]
    GatewayUnavailable(String),
    #[error("Stock ran out for order {0}; the charge was reversed and the order cancelled")]
    StockExhausted(OrderNumber),
    #[error("Stock ran out for order {0} and the charge could not be reversed; manual refund required")]
    CompensationFailed(OrderNumber),
    #[error("The product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Not enough stock of product {0}")]
    InsufficientStock(i64),
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i64, quantity: i64 },
    #[error("An order must contain at least one item")]
    EmptyOrder,
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

impl From<GatewayError> for SettlementError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Rejected { .. } => SettlementError::GatewayRejected(e.to_string()),
            GatewayError::Unavailable(_) | GatewayError::ResponseError(_) => {
                SettlementError::GatewayUnavailable(e.to_string())
            },
        }
    }
}

impl SettlementError {
    /// Collapses the internal taxonomy to the small set of stable outcomes the checkout client is shown.
    /// The full variant is for logs and operator tooling only.
    pub fn client_view(&self) -> ClientOutcome {
        match self {
            SettlementError::InvalidAmount { .. } => ClientOutcome::AmountMismatch,
            SettlementError::Conflict(_) => ClientOutcome::AlreadyProcessed,
            SettlementError::StockExhausted(_)
            | SettlementError::CompensationFailed(_)
            | SettlementError::InsufficientStock(_) => ClientOutcome::OutOfStock,
            _ => ClientOutcome::RetryLater,
        }
    }
}

/// The stable outcomes shown to the checkout client. Internal distinctions (e.g. gateway-rejected vs
/// gateway-unavailable) are collapsed here and preserved only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    AmountMismatch,
    AlreadyProcessed,
    /// Stock is unavailable. The order was not fulfilled; if a charge was captured it has been (or must be)
    /// refunded, and the client is told to contact support.
    OutOfStock,
    RetryLater,
}
