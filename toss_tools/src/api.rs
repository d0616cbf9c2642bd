use std::{sync::Arc, time::Duration};

use checkout_engine::{ConfirmRequest, GatewayError, GatewayPayment, GatewayRefund, PaymentGateway};
use log::*;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::TossConfig,
    data_objects::{CancelBody, CancelResponse, ConfirmBody, PaymentResponse},
    TossApiError,
};

// Cancellation is idempotent at the provider, so transport-class failures may be retried. Confirmation is
// not: see `confirm_payment`.
const MAX_CANCEL_ATTEMPTS: u32 = 3;
const CANCEL_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct TossApi {
    config: TossConfig,
    client: Arc<Client>,
}

impl TossApi {
    pub fn new(config: TossConfig) -> Result<Self, TossApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TossApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn new_from_env() -> Result<Self, TossApiError> {
        Self::new(TossConfig::new_from_env_or_default())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T, GatewayError> {
        let url = self.url(path);
        trace!("Sending payment API request: {url}");
        let response = self
            .client
            .post(url)
            .basic_auth(self.config.secret_key.reveal(), Some(""))
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            trace!("Payment API request successful. {status}");
            response.json::<T>().await.map_err(|e| GatewayError::ResponseError(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(classify_status(status.as_u16(), message))
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Unavailable(format!("request timed out: {e}"))
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

/// 4xx is a provider-side decision about this request; everything else is the provider being unreachable
/// or broken.
pub(crate) fn classify_status(status: u16, message: String) -> GatewayError {
    if (400..500).contains(&status) {
        GatewayError::Rejected { status, message }
    } else {
        GatewayError::Unavailable(format!("provider returned {status}: {message}"))
    }
}

impl PaymentGateway for TossApi {
    /// Confirms the charge with the provider.
    ///
    /// Never retried: after a timeout or dropped connection the original attempt may still have captured
    /// the charge, and a blind second confirm could capture it twice. The caller abandons the order and
    /// lets the client re-initiate checkout instead.
    async fn confirm_payment(&self, req: &ConfirmRequest) -> Result<GatewayPayment, GatewayError> {
        debug!("Confirming payment {} for order [{}]", req.payment_key, req.order_number);
        let body = ConfirmBody::from(req);
        let response: PaymentResponse = self.post("/v1/payments/confirm", &body).await.map_err(|e| {
            warn!("Payment confirm failed for order [{}]: {e}", req.order_number);
            e
        })?;
        debug!("Payment {} confirmed", req.payment_key);
        Ok(response.into_payment(&req.payment_key))
    }

    async fn cancel_payment(&self, payment_key: &str, reason: &str) -> Result<GatewayRefund, GatewayError> {
        debug!("Cancelling payment {payment_key}: {reason}");
        let path = format!("/v1/payments/{payment_key}/cancel");
        let body = CancelBody { cancel_reason: reason.to_string() };
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post::<CancelResponse, _>(&path, &body).await {
                Ok(response) => {
                    info!("Payment {payment_key} cancelled");
                    return Ok(response.into_refund());
                },
                Err(GatewayError::Unavailable(message)) if attempt < MAX_CANCEL_ATTEMPTS => {
                    warn!("Cancel attempt {attempt} for {payment_key} failed ({message}). Retrying");
                    tokio::time::sleep(CANCEL_RETRY_DELAY).await;
                },
                Err(e) => {
                    warn!("Cancel of {payment_key} failed: {e}");
                    return Err(e);
                },
            }
        }
    }
}
