use checkout_common::Krw;
use chrono::{DateTime, Utc};
use checkout_engine::{ConfirmRequest, GatewayPayment, GatewayRefund};
use log::warn;
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/payments/confirm`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    pub payment_key: String,
    pub order_id: String,
    pub amount: i64,
}

impl From<&ConfirmRequest> for ConfirmBody {
    fn from(req: &ConfirmRequest) -> Self {
        Self {
            payment_key: req.payment_key.clone(),
            order_id: req.order_number.as_str().to_string(),
            amount: req.amount.value(),
        }
    }
}

/// The slice of the provider's payment object that settlement cares about. Everything else in the response
/// is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub approved_at: Option<String>,
}

impl PaymentResponse {
    pub fn into_payment(self, payment_key: &str) -> GatewayPayment {
        let approved_at = self.approved_at.as_deref().and_then(parse_approved_at);
        GatewayPayment {
            payment_key: payment_key.to_string(),
            method: self.method.unwrap_or_default(),
            approved_at,
        }
    }
}

/// The provider reports approval times as RFC 3339 with the merchant's UTC offset.
fn parse_approved_at(value: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!("Unparseable approvedAt from provider: {value} ({e})");
            None
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBody {
    pub cancel_reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub cancels: Vec<CancelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelEntry {
    pub cancel_amount: i64,
}

impl CancelResponse {
    pub fn into_refund(self) -> GatewayRefund {
        let refund_amount = self.cancels.first().map(|c| Krw::from(c.cancel_amount)).unwrap_or_default();
        GatewayRefund { refund_amount, method: self.method }
    }
}
