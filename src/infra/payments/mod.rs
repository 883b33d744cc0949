//! Payment provider clients and webhook signature checks.

pub mod binance;
pub mod stripe;

use thiserror::Error;

pub use binance::BinancePayClient;
pub use stripe::StripeClient;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("signature header missing or malformed")]
    MalformedHeader,
    #[error("no signature matched the payload")]
    SignatureMismatch,
    #[error("timestamp outside the allowed tolerance")]
    StaleTimestamp,
}

/// Checkout page created at a provider.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub provider_ref: String,
    pub url: String,
}

/// Configured provider clients. A missing client means the provider is disabled.
#[derive(Debug, Clone, Default)]
pub struct PaymentGateways {
    pub stripe: Option<StripeClient>,
    pub binance: Option<BinancePayClient>,
}

pub fn cents_to_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
