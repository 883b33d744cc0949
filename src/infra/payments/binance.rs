//! Binance Pay order creation and webhook signature verification.
//!
//! Signatures are uppercase hex HMAC-SHA512 over
//! `"{timestamp}\n{nonce}\n{body}\n"`.

use super::{cents_to_decimal, CheckoutSession, WebhookError};
use crate::infra::config::BinanceConfig;
use anyhow::Context;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha2::Sha512;
use std::time::Duration;

type HmacSha512 = Hmac<Sha512>;

const BINANCE_API_BASE: &str = "https://bpay.binanceapi.com";
/// Binance Pay settles in USDT; listed prices are charged 1:1.
const SETTLEMENT_CURRENCY: &str = "USDT";

/// Whether a price in `currency` can be charged 1:1 in the settlement currency.
pub fn settles_at_par(currency: &str) -> bool {
    currency.eq_ignore_ascii_case("USD") || currency.eq_ignore_ascii_case(SETTLEMENT_CURRENCY)
}

fn payload_mac(secret: &str, timestamp: &str, nonce: &str, body: &[u8]) -> HmacSha512 {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(nonce.as_bytes());
    mac.update(b"\n");
    mac.update(body);
    mac.update(b"\n");
    mac
}

pub fn sign_payload(secret: &str, timestamp: &str, nonce: &str, body: &[u8]) -> String {
    hex::encode_upper(payload_mac(secret, timestamp, nonce, body).finalize().into_bytes())
}

/// `timestamp` is in milliseconds, as Binance sends it.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    nonce: &str,
    body: &[u8],
    signature: &str,
    now_ms: i64,
    tolerance_secs: i64,
) -> Result<(), WebhookError> {
    let ts: i64 = timestamp.trim().parse().map_err(|_| WebhookError::MalformedHeader)?;
    if nonce.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }
    let provided = hex::decode(signature.trim()).map_err(|_| WebhookError::MalformedHeader)?;
    payload_mac(secret, timestamp.trim(), nonce, body)
        .verify_slice(&provided)
        .map_err(|_| WebhookError::SignatureMismatch)?;
    if (now_ms - ts).abs() > tolerance_secs * 1000 {
        return Err(WebhookError::StaleTimestamp);
    }
    Ok(())
}

pub fn new_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    data: Option<CreateOrderData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderData {
    prepay_id: String,
    checkout_url: String,
}

#[derive(Debug, Clone)]
pub struct BinancePayClient {
    http: reqwest::Client,
    config: BinanceConfig,
    api_base: String,
}

impl BinancePayClient {
    pub fn new(config: BinanceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            config,
            api_base: BINANCE_API_BASE.to_string(),
        })
    }

    pub async fn create_order(
        &self,
        merchant_trade_no: &str,
        amount_cents: i64,
        description: &str,
        return_url: &str,
    ) -> anyhow::Result<CheckoutSession> {
        let body = serde_json::to_vec(&serde_json::json!({
            "env": { "terminalType": "WEB" },
            "merchantTradeNo": merchant_trade_no,
            "orderAmount": cents_to_decimal(amount_cents),
            "currency": SETTLEMENT_CURRENCY,
            "description": description,
            "returnUrl": return_url,
            "goodsDetails": [{
                "goodsType": "02",
                "goodsCategory": "Z000",
                "referenceGoodsId": merchant_trade_no,
                "goodsName": description
            }]
        }))?;

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let nonce = new_nonce();
        let signature = sign_payload(&self.config.secret, &timestamp, &nonce, &body);

        let resp = self
            .http
            .post(format!("{}/binancepay/openapi/v3/order", self.api_base))
            .header("content-type", "application/json")
            .header("BinancePay-Timestamp", &timestamp)
            .header("BinancePay-Nonce", &nonce)
            .header("BinancePay-Certificate-SN", &self.config.api_key)
            .header("BinancePay-Signature", signature)
            .body(body)
            .send()
            .await
            .context("binance pay request failed")?;

        let parsed: CreateOrderResponse = resp.json().await.context("invalid binance pay response")?;
        if parsed.status != "SUCCESS" {
            anyhow::bail!(
                "binance pay rejected order: {}",
                parsed.error_message.unwrap_or_else(|| parsed.status.clone())
            );
        }
        let data = parsed.data.context("binance pay response has no data")?;
        Ok(CheckoutSession {
            provider_ref: data.prepay_id,
            url: data.checkout_url,
        })
    }
}
