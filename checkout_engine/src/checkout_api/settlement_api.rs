use std::fmt::Debug;

use checkout_common::Krw;
use chrono::Utc;
use log::*;

use crate::{
    checkout_api::order_objects::{CancelResult, ConfirmPaymentRequest},
    db_types::{
        CartLineProduct,
        NewOrder,
        NewOrderLine,
        Order,
        OrderNumber,
        OrderSource,
        OrderStatusType,
        PaymentMethod,
        PaymentSettlement,
    },
    events::{EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    traits::{ConfirmRequest, PaymentGateway, SettlementDatabase, SettlementError, SettlementOutcome},
};

/// Flat delivery fee added to every order at creation time.
pub const DELIVERY_FEE: Krw = Krw::new(1_000);

/// `SettlementApi` is the Order Lifecycle Coordinator. It owns the order state machine: creation, payment
/// confirmation, cancellation, and the compensating transaction that reverses an already-captured charge
/// when local fulfilment cannot proceed.
///
/// Validation and the provider's confirm call happen *outside* the critical section; only the final state
/// mutation (status + payment metadata + stock) runs inside a short serialised transaction, so a slow
/// provider never extends the lock hold time.
pub struct SettlementApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for SettlementApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B, G> SettlementApi<B, G> {
    pub fn new(db: B, gateway: G) -> Self {
        Self { db, gateway, producers: EventProducers::default() }
    }

    pub fn with_producers(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B, G> SettlementApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    /// Creates a `Ready` order for a single product bought directly from its page.
    ///
    /// The stock check here is advisory only: it rejects obviously doomed orders early, but the real
    /// enforcement is the conditional decrement at confirmation time. No stock is reserved yet.
    pub async fn create_direct_order(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<Order, SettlementError> {
        if quantity <= 0 {
            return Err(SettlementError::InvalidQuantity { product_id, quantity });
        }
        let product =
            self.db.fetch_product(product_id).await?.ok_or(SettlementError::ProductNotFound(product_id))?;
        if product.stock < quantity {
            return Err(SettlementError::InsufficientStock(product_id));
        }
        let new_order = NewOrder {
            order_number: OrderNumber::random(),
            user_id,
            label: product.name.clone(),
            final_price: product.price * quantity + DELIVERY_FEE,
            source: OrderSource::Direct,
            lines: vec![NewOrderLine { product_id, quantity, unit_price: product.price }],
            cart_line_ids: Vec::new(),
        };
        let order = self.db.insert_order(new_order).await?;
        debug!("🔄️📦️ Order [{}] created for user {user_id} at {}", order.order_number, order.final_price);
        Ok(order)
    }

    /// Creates a `Ready` order from a set of the user's cart lines. The cart lines themselves are left in
    /// place; settlement clears them once payment succeeds.
    pub async fn create_cart_order(&self, user_id: i64, cart_line_ids: &[i64]) -> Result<Order, SettlementError> {
        let cart_lines = self.db.fetch_cart_lines(user_id, cart_line_ids).await?;
        if cart_lines.is_empty() {
            return Err(SettlementError::EmptyOrder);
        }
        for line in &cart_lines {
            if line.quantity <= 0 {
                return Err(SettlementError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            if line.stock < line.quantity {
                return Err(SettlementError::InsufficientStock(line.product_id));
            }
        }
        let total: Krw = cart_lines.iter().map(|l| l.price * l.quantity).sum();
        let new_order = NewOrder {
            order_number: OrderNumber::random(),
            user_id,
            label: order_label(&cart_lines),
            final_price: total + DELIVERY_FEE,
            source: OrderSource::Cart,
            lines: cart_lines
                .iter()
                .map(|l| NewOrderLine { product_id: l.product_id, quantity: l.quantity, unit_price: l.price })
                .collect(),
            cart_line_ids: cart_lines.iter().map(|l| l.cart_line_id).collect(),
        };
        let order = self.db.insert_order(new_order).await?;
        debug!(
            "🔄️📦️ Order [{}] created for user {user_id} from {} cart lines at {}",
            order.order_number,
            cart_lines.len(),
            order.final_price
        );
        Ok(order)
    }

    /// Confirms the charge for an order with the payment provider and settles the order exactly once.
    ///
    /// The flow is:
    /// 1. Validate the request against the stored order. All validation failures are returned before any
    ///    external call is made.
    /// 2. Confirm the charge with the provider. A rejection or transport failure abandons the order (it was
    ///    never financially committed) by deleting it.
    /// 3. Apply settlement atomically: status, payment metadata, and the conditional stock decrement in a
    ///    single serialised transaction.
    /// 4. If stock ran out between confirmation and settlement, reverse the charge (two-phase compensation
    ///    with a durable `RefundFailed` marker written before the reversal call).
    /// 5. Clear the originating cart lines for cart-sourced orders. Best-effort.
    ///
    /// A replayed request for an already-settled order with the same payment key returns `Ok` without
    /// touching anything.
    pub async fn confirm_payment(&self, req: ConfirmPaymentRequest) -> Result<Order, SettlementError> {
        info!("🔄️💳️ Confirming payment {} for order [{}]", req.payment_key, req.order_number);
        let order = self
            .db
            .fetch_order_by_number(&req.order_number)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(req.order_number.clone()))?;
        if order.user_id != req.user_id {
            warn!(
                "🔄️💳️ User {} tried to confirm order [{}] belonging to user {}",
                req.user_id, order.order_number, order.user_id
            );
            return Err(SettlementError::Forbidden(req.order_number));
        }
        if order.status == OrderStatusType::Paid {
            if order.payment_key.as_deref() == Some(req.payment_key.as_str()) {
                debug!("🔄️💳️ Order [{}] already settled with this payment key. Idempotent replay", order.order_number);
                return Ok(order);
            }
            return Err(SettlementError::Conflict(req.order_number));
        }
        if order.status != OrderStatusType::Ready {
            warn!("🔄️💳️ Order [{}] is {} and cannot be confirmed", order.order_number, order.status);
            return Err(SettlementError::Conflict(req.order_number));
        }
        if order.final_price != req.amount {
            warn!(
                "🔄️💳️ Charged amount {} does not match the frozen total {} for order [{}]",
                req.amount, order.final_price, order.order_number
            );
            return Err(SettlementError::InvalidAmount { expected: order.final_price, actual: req.amount });
        }

        // The provider call happens before the serialised settlement step so a slow provider does not
        // extend the critical section.
        let confirm = ConfirmRequest {
            payment_key: req.payment_key.clone(),
            order_number: req.order_number.clone(),
            amount: req.amount,
        };
        let payment = match self.gateway.confirm_payment(&confirm).await {
            Ok(payment) => payment,
            Err(e) => {
                // No funds were provably captured. Abandon the order rather than leaving it stuck in
                // Ready with an ambiguous payment state; provider-ledger reconciliation runs out of band.
                warn!("🔄️💳️ Provider confirm failed for order [{}]: {e}. Abandoning the order", req.order_number);
                self.db.delete_order(&req.order_number).await?;
                return Err(e.into());
            },
        };

        let settlement = PaymentSettlement {
            payment_key: req.payment_key.clone(),
            method: PaymentMethod::from_gateway(&payment.method),
            approved_at: payment.approved_at.unwrap_or_else(Utc::now),
        };
        match self.db.settle_order(&req.order_number, &settlement).await? {
            SettlementOutcome::Settled(order) => {
                info!("🔄️💳️ Order [{}] settled. {} captured", order.order_number, order.final_price);
                if order.source == OrderSource::Cart {
                    self.clear_cart(&order).await;
                }
                self.call_order_paid_hook(&order).await;
                Ok(order)
            },
            SettlementOutcome::AlreadyPaid(order) => {
                debug!("🔄️💳️ Order [{}] was settled concurrently with this payment key", order.order_number);
                Ok(order)
            },
            SettlementOutcome::Conflict(order) => {
                // A different settlement won the race after we charged this key. The winning order stays
                // untouched; the surplus charge is picked up by provider-ledger reconciliation.
                warn!(
                    "🔄️💳️ Order [{}] is {} under a different payment key. Charge {} needs reconciliation",
                    order.order_number, order.status, req.payment_key
                );
                Err(SettlementError::Conflict(req.order_number))
            },
            SettlementOutcome::OutOfStock => self.compensate(&req.order_number, &req.payment_key).await,
        }
    }

    /// Reverses a charge that was confirmed by the provider but could not be fulfilled locally.
    ///
    /// Phase one durably marks the order `RefundFailed` with the payment key *before* the reversal call, so
    /// a crash between the phases leaves an order an operator can find and refund by hand. Phase two calls
    /// the provider; only a successful reversal moves the order on to `Cancelled`.
    async fn compensate(&self, order_number: &OrderNumber, payment_key: &str) -> Result<Order, SettlementError> {
        warn!("🔄️↩️ Stock ran out after the provider confirmed {payment_key}. Reversing the charge for [{order_number}]");
        self.db.record_refund_marker(order_number, payment_key).await?;
        match self.gateway.cancel_payment(payment_key, "Out of stock").await {
            Ok(_) => {
                let order = self.db.complete_compensation(order_number).await?;
                info!("🔄️↩️ Charge {payment_key} reversed. Order [{order_number}] cancelled");
                self.call_order_annulled_hook(&order).await;
                Err(SettlementError::StockExhausted(order_number.clone()))
            },
            Err(e) => {
                error!(
                    "🔄️↩️ Could not reverse charge {payment_key} for order [{order_number}]: {e}. The order is \
                     marked RefundFailed and needs a manual refund"
                );
                Err(SettlementError::CompensationFailed(order_number.clone()))
            },
        }
    }

    /// Cancels an order. Legal from `Ready` (never charged, no provider call) and from `Paid` (provider
    /// reversal plus stock restore). Everything else is a conflict.
    pub async fn cancel_order(&self, order_number: &OrderNumber, reason: &str) -> Result<CancelResult, SettlementError> {
        info!("🔄️❌️ Cancelling order [{order_number}]: {reason}");
        let order = self
            .db
            .fetch_order_by_number(order_number)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(order_number.clone()))?;
        match order.status {
            OrderStatusType::Ready if order.payment_key.is_none() => {
                let order = self.db.cancel_unpaid_order(order_number).await?;
                debug!("🔄️❌️ Order [{order_number}] was never charged. Cancelled directly");
                self.call_order_annulled_hook(&order).await;
                Ok(CancelResult {
                    success: true,
                    order_number: order.order_number,
                    cancelled_at: Utc::now(),
                    refund_amount: Krw::from(0),
                    refund_method: None,
                })
            },
            OrderStatusType::Paid => {
                // CancelRequested blocks a concurrent confirmation or a second cancel of the same order
                let order = self.db.begin_cancel(order_number).await?;
                let payment_key = order
                    .payment_key
                    .clone()
                    .ok_or_else(|| SettlementError::Conflict(order_number.clone()))?;
                match self.gateway.cancel_payment(&payment_key, reason).await {
                    Ok(refund) => {
                        let order = self.db.complete_cancel(order_number).await?;
                        info!("🔄️❌️ Order [{order_number}] cancelled. {} refunded", refund.refund_amount);
                        self.call_order_annulled_hook(&order).await;
                        Ok(CancelResult {
                            success: true,
                            order_number: order.order_number,
                            cancelled_at: Utc::now(),
                            refund_amount: refund.refund_amount,
                            refund_method: refund.method,
                        })
                    },
                    Err(e) => {
                        warn!("🔄️❌️ Provider refused to reverse {payment_key} for [{order_number}]: {e}. Reverting");
                        self.db.revert_cancel(order_number).await?;
                        Err(e.into())
                    },
                }
            },
            status => {
                warn!("🔄️❌️ Order [{order_number}] is {status} and cannot be cancelled");
                Err(SettlementError::Conflict(order_number.clone()))
            },
        }
    }

    /// Post-settlement cart cleanup. Must never fail the settlement: the order is already paid.
    async fn clear_cart(&self, order: &Order) {
        match self.db.clear_cart_lines_for_order(order).await {
            Ok(removed) => debug!("🔄️🧹️ Cleared {removed} cart lines for order [{}]", order.order_number),
            Err(e) => warn!("🔄️🧹️ Could not clear cart lines for order [{}]: {e}", order.order_number),
        }
    }

    async fn call_order_paid_hook(&self, order: &Order) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️📦️ Notifying order paid hook subscribers");
            let event = OrderPaidEvent { order: order.clone() };
            emitter.publish_event(event).await;
        }
    }

    async fn call_order_annulled_hook(&self, order: &Order) {
        for emitter in &self.producers.order_annulled_producer {
            debug!("🔄️📦️ Notifying order annulled hook subscribers");
            let event = OrderAnnulledEvent::new(order.clone());
            emitter.publish_event(event).await;
        }
    }
}

fn order_label(cart_lines: &[CartLineProduct]) -> String {
    let first = cart_lines[0].name.as_str();
    match cart_lines.len() - 1 {
        0 => first.to_string(),
        more => format!("{first} (+{more} more)"),
    }
}
