use crate::app::{Actor, AppError, AppResult};
use crate::domain::model::{Plan, Subscription, SubscriptionStatus};
use crate::domain::subscription::is_entitled;
use crate::infra::config::StripeConfig;
use crate::infra::payments::stripe::SubscriptionCheckout;
use crate::infra::payments::StripeClient;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan, status, provider_ref, current_period_end, \
                                    cancel_at_period_end, created_at, updated_at";

pub const MAX_GRANT_DAYS: i64 = 3650;

#[derive(Debug, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<Subscription>,
    pub entitled: bool,
}

/// Provider-side view of a subscription, as carried by webhook payloads.
#[derive(Debug, Clone)]
pub struct ProviderSubscription<'a> {
    pub provider_ref: &'a str,
    pub user_id: i64,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

pub async fn latest_for_user(pool: &PgPool, user_id: i64) -> AppResult<Option<Subscription>> {
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1
         ORDER BY created_at DESC, id DESC LIMIT 1"
    );
    Ok(sqlx::query_as::<_, Subscription>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?)
}

pub async fn overview(pool: &PgPool, user_id: i64) -> AppResult<SubscriptionOverview> {
    let subscription = latest_for_user(pool, user_id).await?;
    let entitled = subscription
        .as_ref()
        .is_some_and(|s| is_entitled(s, Utc::now()));
    Ok(SubscriptionOverview { subscription, entitled })
}

pub async fn start_checkout(
    stripe: Option<&StripeClient>,
    prices: &StripeConfig,
    public_base_url: &str,
    actor: Actor,
    plan: Plan,
) -> AppResult<String> {
    let stripe = stripe.ok_or(AppError::Unavailable("stripe"))?;
    let price_id = match plan {
        Plan::Basic => prices.price_basic.as_deref(),
        Plan::Pro => prices.price_pro.as_deref(),
    }
    .ok_or(AppError::Unavailable("subscription price"))?;

    let success_url = format!("{public_base_url}/account/subscription?status=success");
    let cancel_url = format!("{public_base_url}/account/subscription?status=cancelled");
    let session = stripe
        .create_subscription_session(&SubscriptionCheckout {
            user_id: actor.id,
            plan: plan.as_str(),
            price_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;
    info!(user_id = actor.id, plan = %plan, "subscription checkout started");
    Ok(session.url)
}

/// Stops renewal; access continues until the current period ends.
///
/// Provider-backed subscriptions are cancelled at Stripe first, so the next
/// `customer.subscription.updated` event agrees with the local flag.
pub async fn cancel(
    pool: &PgPool,
    stripe: Option<&StripeClient>,
    actor: Actor,
    id: i64,
) -> AppResult<Subscription> {
    let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1 AND user_id = $2");
    let current = sqlx::query_as::<_, Subscription>(&sql)
        .bind(id)
        .bind(actor.id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("subscription"))?;
    if matches!(current.status, SubscriptionStatus::Canceled | SubscriptionStatus::Expired) {
        return Err(AppError::conflict(format!("subscription is {}", current.status)));
    }
    if let Some(provider_ref) = current.provider_ref.as_deref() {
        let stripe = stripe.ok_or(AppError::Unavailable("stripe"))?;
        stripe.cancel_at_period_end(provider_ref).await?;
    }

    let sql = format!(
        "UPDATE subscriptions SET cancel_at_period_end = TRUE, updated_at = now()
         WHERE id = $1
         RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    let sub = sqlx::query_as::<_, Subscription>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;
    info!(subscription_id = id, user_id = actor.id, "subscription set to cancel at period end");
    Ok(sub)
}

pub async fn grant(pool: &PgPool, user_id: i64, plan: Plan, days: i64) -> AppResult<Subscription> {
    if !(1..=MAX_GRANT_DAYS).contains(&days) {
        return Err(AppError::validation(format!("days must be between 1 and {MAX_GRANT_DAYS}")));
    }
    crate::app::users::get(pool, user_id).await?;

    let sql = format!(
        "INSERT INTO subscriptions (user_id, plan, status, current_period_end)
         VALUES ($1, $2, $3, $4) RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    let sub = sqlx::query_as::<_, Subscription>(&sql)
        .bind(user_id)
        .bind(plan.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(Utc::now() + Duration::days(days))
        .fetch_one(pool)
        .await?;
    info!(subscription_id = sub.id, user_id, plan = %plan, days, "subscription granted");
    Ok(sub)
}

/// Inserts or refreshes the row keyed by the provider's subscription id.
pub async fn upsert_from_provider(pool: &PgPool, update: &ProviderSubscription<'_>) -> AppResult<Subscription> {
    let sql = format!(
        "INSERT INTO subscriptions
            (user_id, plan, status, provider_ref, current_period_end, cancel_at_period_end)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (provider_ref) DO UPDATE SET
            plan = EXCLUDED.plan,
            status = EXCLUDED.status,
            current_period_end = EXCLUDED.current_period_end,
            cancel_at_period_end = EXCLUDED.cancel_at_period_end,
            updated_at = now()
         RETURNING {SUBSCRIPTION_COLUMNS}"
    );
    let sub = sqlx::query_as::<_, Subscription>(&sql)
        .bind(update.user_id)
        .bind(update.plan.as_str())
        .bind(update.status.as_str())
        .bind(update.provider_ref)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .fetch_one(pool)
        .await?;
    info!(
        subscription_id = sub.id,
        provider_ref = update.provider_ref,
        status = %update.status,
        "subscription synced"
    );
    Ok(sub)
}

/// Returns whether a subscription with this provider reference existed.
pub async fn mark_past_due(pool: &PgPool, provider_ref: &str) -> AppResult<bool> {
    let result = sqlx::query(
        "UPDATE subscriptions SET status = 'past_due', updated_at = now() WHERE provider_ref = $1",
    )
    .bind(provider_ref)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
