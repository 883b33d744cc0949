use crate::app::webhooks::{self, WebhookOutcome};
use crate::infra::payments::{binance, stripe, WebhookError};
use crate::transport::http::error::{ok, ApiError, ApiResult};
use crate::transport::http::types::{ApiResponse, AppState};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Validation(format!("missing {name} header")))
}

fn rejected(provider: &str, err: WebhookError) -> ApiError {
    warn!(provider, error = %err, "webhook rejected");
    ApiError::Validation(format!("webhook rejected: {err}"))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    tag = "webhooks",
    responses(
        (status = 200, description = "Event accepted (or already processed)", body = ApiResponse),
        (status = 400, description = "Bad signature or payload", body = ApiResponse),
        (status = 503, description = "Webhook secret not configured", body = ApiResponse)
    )
)]
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ApiResponse>> {
    let secret = state
        .config
        .stripe
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::ServiceUnavailable("stripe webhooks are not configured".to_string()))?;
    let signature = header(&headers, "stripe-signature")?;
    stripe::verify_signature(
        signature,
        &body,
        secret,
        Utc::now().timestamp(),
        state.config.webhook_tolerance_secs,
    )
    .map_err(|e| rejected("stripe", e))?;

    let outcome = webhooks::handle_stripe(state.pool(), &state.config.license_secret, &body).await?;
    ok(json!({ "received": true, "duplicate": outcome == WebhookOutcome::Duplicate }))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/binance",
    tag = "webhooks",
    responses(
        (status = 200, description = "Acknowledged with returnCode SUCCESS"),
        (status = 400, description = "Bad signature or payload", body = ApiResponse),
        (status = 503, description = "Binance Pay not configured", body = ApiResponse)
    )
)]
pub async fn binance_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<JsonValue>> {
    let config = state
        .config
        .binance
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("binance pay is not configured".to_string()))?;
    binance::verify_signature(
        &config.secret,
        header(&headers, "binancepay-timestamp")?,
        header(&headers, "binancepay-nonce")?,
        &body,
        header(&headers, "binancepay-signature")?,
        Utc::now().timestamp_millis(),
        state.config.webhook_tolerance_secs,
    )
    .map_err(|e| rejected("binance", e))?;

    webhooks::handle_binance(state.pool(), &state.config.license_secret, &body).await?;
    Ok(Json(json!({ "returnCode": "SUCCESS", "returnMessage": null })))
}
