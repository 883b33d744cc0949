//! Read-only aggregates for the admin dashboard.

use crate::app::AppResult;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

pub const MAX_DAYS: i64 = 365;
pub const MAX_TOP_PRODUCTS: i64 = 50;

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct Overview {
    pub users: i64,
    pub published_products: i64,
    pub paid_orders: i64,
    pub revenue_cents: i64,
    pub active_subscriptions: i64,
    pub topics: i64,
    pub pending_moderation: i64,
    pub quarantined_uploads: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct RevenueDay {
    pub day: NaiveDate,
    pub orders: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: i64,
    pub title: String,
    pub orders: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct SignupDay {
    pub day: NaiveDate,
    pub signups: i64,
}

pub fn clamp_days(days: Option<i64>) -> i64 {
    days.unwrap_or(30).clamp(1, MAX_DAYS)
}

pub fn clamp_top(limit: Option<i64>) -> i64 {
    limit.unwrap_or(10).clamp(1, MAX_TOP_PRODUCTS)
}

pub async fn overview(pool: &PgPool) -> AppResult<Overview> {
    Ok(sqlx::query_as::<_, Overview>(
        "SELECT
            (SELECT count(*) FROM users) AS users,
            (SELECT count(*) FROM products WHERE status = 'published') AS published_products,
            (SELECT count(*) FROM orders WHERE status = 'paid') AS paid_orders,
            (SELECT COALESCE(sum(amount_cents), 0)::bigint FROM orders WHERE status = 'paid') AS revenue_cents,
            (SELECT count(*) FROM subscriptions
                WHERE status IN ('active', 'trialing') AND current_period_end > now()) AS active_subscriptions,
            (SELECT count(*) FROM topics) AS topics,
            (SELECT count(*) FROM topics WHERE status IN ('pending', 'flagged'))
              + (SELECT count(*) FROM comments WHERE status IN ('pending', 'flagged')) AS pending_moderation,
            (SELECT count(*) FROM uploads WHERE status = 'quarantined') AS quarantined_uploads",
    )
    .fetch_one(pool)
    .await?)
}

/// Daily paid-order totals for the last `days` days, today included. Days
/// without sales appear with zeros.
pub async fn revenue(pool: &PgPool, days: i64) -> AppResult<Vec<RevenueDay>> {
    Ok(sqlx::query_as::<_, RevenueDay>(
        "SELECT d.day::date AS day,
                count(o.id) AS orders,
                COALESCE(sum(o.amount_cents), 0)::bigint AS revenue_cents
         FROM generate_series(current_date - ($1::int - 1), current_date, interval '1 day') AS d(day)
         LEFT JOIN orders o
           ON o.status = 'paid' AND o.paid_at::date = d.day::date
         GROUP BY d.day
         ORDER BY d.day",
    )
    .bind(days as i32)
    .fetch_all(pool)
    .await?)
}

pub async fn top_products(pool: &PgPool, limit: i64) -> AppResult<Vec<TopProduct>> {
    Ok(sqlx::query_as::<_, TopProduct>(
        "SELECT p.id AS product_id, p.title,
                count(o.id) AS orders,
                COALESCE(sum(o.amount_cents), 0)::bigint AS revenue_cents
         FROM orders o JOIN products p ON p.id = o.product_id
         WHERE o.status = 'paid'
         GROUP BY p.id, p.title
         ORDER BY revenue_cents DESC, orders DESC, p.id
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?)
}

pub async fn signups(pool: &PgPool, days: i64) -> AppResult<Vec<SignupDay>> {
    Ok(sqlx::query_as::<_, SignupDay>(
        "SELECT d.day::date AS day, count(u.id) AS signups
         FROM generate_series(current_date - ($1::int - 1), current_date, interval '1 day') AS d(day)
         LEFT JOIN users u ON u.created_at::date = d.day::date
         GROUP BY d.day
         ORDER BY d.day",
    )
    .bind(days as i32)
    .fetch_all(pool)
    .await?)
}
