use checkout_common::Krw;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::OrderNumber;

/// The charge-confirmation request forwarded to the payment provider.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub payment_key: String,
    pub order_number: OrderNumber,
    pub amount: Krw,
}

/// A confirmed charge as reported by the provider.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub payment_key: String,
    /// The provider's method label, e.g. "카드". Mapped onto [`crate::db_types::PaymentMethod`] by the caller.
    pub method: String,
    pub approved_at: Option<DateTime<Utc>>,
}

/// A reversed charge as reported by the provider.
#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub refund_amount: Krw,
    pub method: Option<String>,
}

/// Outbound calls to the external payment provider.
///
/// `confirm_payment` must never be retried on a transport failure: the outcome of the original attempt is
/// ambiguous and a blind retry could capture the charge twice. Cancellation is idempotent at the provider,
/// so `cancel_payment` implementations may retry transport-class failures.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn confirm_payment(&self, req: &ConfirmRequest) -> Result<GatewayPayment, GatewayError>;

    async fn cancel_payment(&self, payment_key: &str, reason: &str) -> Result<GatewayRefund, GatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider understood and declined the request (4xx), e.g. an amount mismatch on its side.
    #[error("The payment provider declined the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The provider could not be reached, timed out, or failed internally (5xx).
    #[error("The payment provider could not be reached: {0}")]
    Unavailable(String),
    /// The provider answered with a body we could not interpret.
    #[error("The payment provider sent an unreadable response: {0}")]
    ResponseError(String),
}
