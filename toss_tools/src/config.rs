use std::time::Duration;

use checkout_common::Secret;
use log::*;

const DEFAULT_BASE_URL: &str = "https://api.tosspayments.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct TossConfig {
    /// Base URL of the provider API, without a trailing slash.
    pub base_url: String,
    /// The merchant secret key. Sent as the username of an HTTP Basic credential with an empty password.
    pub secret_key: Secret<String>,
    /// Bound on every provider call. A confirm that exceeds it is treated as a failed confirmation.
    pub timeout: Duration,
}

impl Default for TossConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key: Secret::new(String::default()),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl TossConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("COMMERCE_TOSS_BASE_URL").unwrap_or_else(|_| {
            warn!("COMMERCE_TOSS_BASE_URL not set, using the live API endpoint");
            DEFAULT_BASE_URL.to_string()
        });
        let secret_key = Secret::new(std::env::var("COMMERCE_TOSS_SECRET_KEY").unwrap_or_else(|_| {
            warn!("COMMERCE_TOSS_SECRET_KEY not set, using a (probably useless) default");
            "test_sk_00000000000000".to_string()
        }));
        let timeout = std::env::var("COMMERCE_TOSS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        Self { base_url, secret_key, timeout }
    }
}
