use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
    Mutex,
};

use checkout_common::Krw;
use chrono::Utc;

use crate::traits::{ConfirmRequest, GatewayError, GatewayPayment, GatewayRefund, PaymentGateway};

/// A scripted in-memory payment gateway. Succeeds by default; individual operations can be told to fail,
/// and every call is counted so tests can assert on exactly how often the provider was contacted.
#[derive(Clone, Default)]
pub struct MockGateway {
    inner: Arc<MockGatewayState>,
}

#[derive(Default)]
struct MockGatewayState {
    confirm_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    confirm_error: Mutex<Option<GatewayError>>,
    cancel_error: Mutex<Option<GatewayError>>,
    refund_amount: Mutex<Krw>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent confirm call fails with `error` until the script is cleared.
    pub fn fail_confirms_with(&self, error: GatewayError) {
        *self.inner.confirm_error.lock().unwrap() = Some(error);
    }

    /// Every subsequent cancel call fails with `error` until the script is cleared.
    pub fn fail_cancels_with(&self, error: GatewayError) {
        *self.inner.cancel_error.lock().unwrap() = Some(error);
    }

    pub fn clear_script(&self) {
        *self.inner.confirm_error.lock().unwrap() = None;
        *self.inner.cancel_error.lock().unwrap() = None;
    }

    pub fn set_refund_amount(&self, amount: Krw) {
        *self.inner.refund_amount.lock().unwrap() = amount;
    }

    pub fn confirm_calls(&self) -> usize {
        self.inner.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.inner.cancel_calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockGateway {
    async fn confirm_payment(&self, req: &ConfirmRequest) -> Result<GatewayPayment, GatewayError> {
        self.inner.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.inner.confirm_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(GatewayPayment {
            payment_key: req.payment_key.clone(),
            method: "카드".to_string(),
            approved_at: Some(Utc::now()),
        })
    }

    async fn cancel_payment(&self, _payment_key: &str, _reason: &str) -> Result<GatewayRefund, GatewayError> {
        self.inner.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.inner.cancel_error.lock().unwrap().clone() {
            return Err(error);
        }
        let refund_amount = *self.inner.refund_amount.lock().unwrap();
        Ok(GatewayRefund { refund_amount, method: Some("카드".to_string()) })
    }
}
