//! Payment provider events. Signatures are checked by the HTTP layer before
//! anything here runs; this module records each event once and applies it.

use crate::app::orders;
use crate::app::subscriptions::{self, ProviderSubscription};
use crate::app::{AppError, AppResult};
use crate::domain::model::order::parse_merchant_trade_no;
use crate::domain::model::{PaymentProvider, Plan, SubscriptionStatus};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Already handled earlier; nothing was applied.
    Duplicate,
}

/// Stores the event and returns its row id, or `None` when an earlier
/// delivery of the same event was already processed. Deliveries whose first
/// attempt failed half-way are handed out again so the provider's retry
/// can finish the job.
pub async fn record_event(
    pool: &PgPool,
    provider: PaymentProvider,
    event_id: &str,
    event_type: &str,
    payload: &JsonValue,
) -> AppResult<Option<i64>> {
    let (id, processed_at): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
        "INSERT INTO webhook_events (provider, event_id, event_type, payload)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (provider, event_id) DO UPDATE SET event_type = EXCLUDED.event_type
         RETURNING id, processed_at",
    )
    .bind(provider.as_str())
    .bind(event_id)
    .bind(event_type)
    .bind(payload)
    .fetch_one(pool)
    .await?;
    Ok(processed_at.is_none().then_some(id))
}

pub async fn mark_processed(pool: &PgPool, id: i64) -> AppResult<()> {
    sqlx::query("UPDATE webhook_events SET processed_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: JsonValue,
}

fn malformed(what: &str) -> AppError {
    AppError::validation(format!("malformed webhook payload: {what}"))
}

fn metadata<'a>(object: &'a JsonValue, key: &str) -> Option<&'a str> {
    object.get("metadata")?.get(key)?.as_str()
}

/// Applies a verified Stripe event.
pub async fn handle_stripe(pool: &PgPool, license_secret: &str, body: &[u8]) -> AppResult<WebhookOutcome> {
    let payload: JsonValue = serde_json::from_slice(body).map_err(|_| malformed("not json"))?;
    let event: StripeEvent =
        serde_json::from_value(payload.clone()).map_err(|_| malformed("missing id, type or data"))?;

    let Some(row_id) = record_event(pool, PaymentProvider::Stripe, &event.id, &event.event_type, &payload).await?
    else {
        info!(event_id = %event.id, "duplicate stripe event");
        return Ok(WebhookOutcome::Duplicate);
    };

    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => stripe_checkout_completed(pool, license_secret, object).await?,
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            stripe_subscription_changed(pool, object, event.event_type.ends_with("deleted")).await?
        }
        "invoice.payment_failed" => {
            if let Some(sub_id) = invoice_subscription(object) {
                if !subscriptions::mark_past_due(pool, sub_id).await? {
                    warn!(provider_ref = sub_id, "payment failure for unknown subscription");
                }
            }
        }
        other => info!(event_type = other, "stripe event recorded without action"),
    }

    mark_processed(pool, row_id).await?;
    Ok(WebhookOutcome::Processed)
}

async fn stripe_checkout_completed(pool: &PgPool, license_secret: &str, session: &JsonValue) -> AppResult<()> {
    // Subscription checkouts are settled by the customer.subscription.* events.
    if session.get("mode").and_then(JsonValue::as_str) != Some("payment") {
        return Ok(());
    }
    if session.get("payment_status").and_then(JsonValue::as_str) == Some("unpaid") {
        return Ok(());
    }
    let order_id = metadata(session, "order_id")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| malformed("checkout session without metadata.order_id"))?;
    let session_id = session.get("id").and_then(JsonValue::as_str);
    orders::mark_paid(pool, license_secret, order_id, PaymentProvider::Stripe, session_id).await?;
    Ok(())
}

/// Newer API versions moved the period end onto the subscription items.
fn period_end(sub: &JsonValue) -> Option<DateTime<Utc>> {
    let secs = sub
        .get("current_period_end")
        .and_then(JsonValue::as_i64)
        .or_else(|| sub.pointer("/items/data/0/current_period_end")?.as_i64())?;
    Utc.timestamp_opt(secs, 0).single()
}

fn invoice_subscription(invoice: &JsonValue) -> Option<&str> {
    invoice
        .get("subscription")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            invoice
                .pointer("/parent/subscription_details/subscription")?
                .as_str()
        })
}

async fn stripe_subscription_changed(pool: &PgPool, sub: &JsonValue, deleted: bool) -> AppResult<()> {
    let provider_ref = sub
        .get("id")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| malformed("subscription without id"))?;

    // Prefer the metadata set at checkout; fall back to the row we already have.
    let known: Option<(i64, String)> =
        sqlx::query_as("SELECT user_id, plan FROM subscriptions WHERE provider_ref = $1")
            .bind(provider_ref)
            .fetch_optional(pool)
            .await?;
    let user_id = metadata(sub, "user_id")
        .and_then(|v| v.parse::<i64>().ok())
        .or(known.as_ref().map(|(u, _)| *u));
    let plan = metadata(sub, "plan")
        .and_then(|p| p.parse::<Plan>().ok())
        .or_else(|| known.as_ref().and_then(|(_, p)| p.parse().ok()));

    let (Some(user_id), Some(plan)) = (user_id, plan) else {
        warn!(provider_ref, "subscription event without user or plan, skipped");
        return Ok(());
    };

    let status = if deleted {
        SubscriptionStatus::Canceled
    } else {
        let raw = sub.get("status").and_then(JsonValue::as_str).unwrap_or_default();
        SubscriptionStatus::from_stripe(raw)
    };
    let current_period_end = period_end(sub).unwrap_or_else(Utc::now);
    let cancel_at_period_end = !deleted
        && sub
            .get("cancel_at_period_end")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);

    subscriptions::upsert_from_provider(
        pool,
        &ProviderSubscription {
            provider_ref,
            user_id,
            plan,
            status,
            current_period_end,
            cancel_at_period_end,
        },
    )
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceNotification {
    biz_type: String,
    #[serde(default)]
    biz_id: Option<JsonValue>,
    #[serde(default)]
    biz_id_str: Option<String>,
    biz_status: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrderData {
    merchant_trade_no: String,
    #[serde(default)]
    transaction_id: Option<String>,
}

impl BinanceNotification {
    fn event_id(&self) -> Option<String> {
        let id = self.biz_id_str.clone().or_else(|| match &self.biz_id {
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(JsonValue::String(s)) => Some(s.clone()),
            _ => None,
        })?;
        // The same bizId is reused across status changes of one order.
        Some(format!("{id}:{}", self.biz_status))
    }
}

/// Applies a verified Binance Pay notification.
pub async fn handle_binance(pool: &PgPool, license_secret: &str, body: &[u8]) -> AppResult<WebhookOutcome> {
    let payload: JsonValue = serde_json::from_slice(body).map_err(|_| malformed("not json"))?;
    let note: BinanceNotification =
        serde_json::from_value(payload.clone()).map_err(|_| malformed("missing bizType, bizStatus or data"))?;
    let event_id = note.event_id().ok_or_else(|| malformed("missing bizId"))?;

    let Some(row_id) = record_event(pool, PaymentProvider::Binance, &event_id, &note.biz_status, &payload).await?
    else {
        info!(event_id = %event_id, "duplicate binance event");
        return Ok(WebhookOutcome::Duplicate);
    };

    if note.biz_type == "PAY" {
        let data: BinanceOrderData =
            serde_json::from_str(&note.data).map_err(|_| malformed("data is not an order"))?;
        let order_id = parse_merchant_trade_no(&data.merchant_trade_no)
            .ok_or_else(|| malformed("unknown merchantTradeNo"))?;
        match note.biz_status.as_str() {
            "PAY_SUCCESS" => {
                orders::mark_paid(
                    pool,
                    license_secret,
                    order_id,
                    PaymentProvider::Binance,
                    data.transaction_id.as_deref(),
                )
                .await?;
            }
            "PAY_CLOSED" => {
                orders::cancel(pool, order_id).await?;
            }
            other => info!(biz_status = other, order_id, "binance status recorded without action"),
        }
    } else {
        info!(biz_type = %note.biz_type, "binance event recorded without action");
    }

    mark_processed(pool, row_id).await?;
    Ok(WebhookOutcome::Processed)
}
