//! Stripe Checkout sessions and webhook signature verification.

use super::{CheckoutSession, WebhookError};
use anyhow::Context;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac
}

/// Computes the `v1` signature Stripe would send for `payload` at `timestamp`.
pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    hex::encode(signed_payload_mac(secret, timestamp, payload).finalize().into_bytes())
}

/// Builds a full `Stripe-Signature` header value.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!("t={timestamp},v1={}", sign(secret, timestamp, payload))
}

/// Verifies a `Stripe-Signature` header (`t=...,v1=...[,v1=...]`).
///
/// Any of the `v1` entries may match; the timestamp must lie within
/// `tolerance_secs` of `now`.
pub fn verify_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((k, v)) = part.trim().split_once('=') else {
            continue;
        };
        match k {
            "t" => timestamp = v.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(v) {
                    candidates.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    let mac = signed_payload_mac(secret, timestamp, payload);
    let matched = candidates
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());
    if !matched {
        return Err(WebhookError::SignatureMismatch);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp);
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    #[serde(default)]
    cancel_at_period_end: bool,
}

/// One-off purchase of a single product.
#[derive(Debug)]
pub struct PaymentCheckout<'a> {
    pub order_id: i64,
    pub user_id: i64,
    pub product_name: &'a str,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug)]
pub struct SubscriptionCheckout<'a> {
    pub user_id: i64,
    pub plan: &'a str,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            secret_key: secret_key.into(),
            api_base: STRIPE_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root, e.g. stripe-mock.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> anyhow::Result<T> {
        let resp = self
            .http
            .post(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(form)
            .send()
            .await
            .context("stripe request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("stripe returned {status}: {body}");
        }
        resp.json().await.context("invalid stripe response")
    }

    async fn create_session(&self, form: Vec<(String, String)>) -> anyhow::Result<CheckoutSession> {
        let session: SessionResponse = self.post_form("/checkout/sessions", &form).await?;
        let url = session.url.context("stripe session has no url")?;
        Ok(CheckoutSession {
            provider_ref: session.id,
            url,
        })
    }

    pub async fn create_payment_session(
        &self,
        req: &PaymentCheckout<'_>,
    ) -> anyhow::Result<CheckoutSession> {
        self.create_session(payment_form(req)).await
    }

    pub async fn create_subscription_session(
        &self,
        req: &SubscriptionCheckout<'_>,
    ) -> anyhow::Result<CheckoutSession> {
        self.create_session(subscription_form(req)).await
    }

    /// Stops renewal at Stripe; the subscription stays active until its period ends.
    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> anyhow::Result<()> {
        if subscription_id.is_empty() || !subscription_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            anyhow::bail!("invalid stripe subscription id '{subscription_id}'");
        }
        let form = [("cancel_at_period_end".to_string(), "true".to_string())];
        let updated: SubscriptionResponse = self
            .post_form(&format!("/subscriptions/{subscription_id}"), &form)
            .await?;
        if !updated.cancel_at_period_end {
            anyhow::bail!("stripe did not schedule cancellation for {subscription_id}");
        }
        Ok(())
    }
}

fn payment_form(req: &PaymentCheckout<'_>) -> Vec<(String, String)> {
    let pairs = [
        ("mode", "payment".to_string()),
        ("success_url", req.success_url.to_string()),
        ("cancel_url", req.cancel_url.to_string()),
        ("client_reference_id", req.order_id.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price_data][currency]", req.currency.to_lowercase()),
        ("line_items[0][price_data][unit_amount]", req.amount_cents.to_string()),
        ("line_items[0][price_data][product_data][name]", req.product_name.to_string()),
        ("metadata[order_id]", req.order_id.to_string()),
        ("metadata[user_id]", req.user_id.to_string()),
    ];
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn subscription_form(req: &SubscriptionCheckout<'_>) -> Vec<(String, String)> {
    let pairs = [
        ("mode", "subscription".to_string()),
        ("success_url", req.success_url.to_string()),
        ("cancel_url", req.cancel_url.to_string()),
        ("client_reference_id", req.user_id.to_string()),
        ("line_items[0][quantity]", "1".to_string()),
        ("line_items[0][price]", req.price_id.to_string()),
        ("subscription_data[metadata][user_id]", req.user_id.to_string()),
        ("subscription_data[metadata][plan]", req.plan.to_string()),
    ];
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
