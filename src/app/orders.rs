use crate::app::{licenses, Actor, AppError, AppResult};
use crate::domain::model::order::merchant_trade_no;
use crate::domain::model::{Order, OrderStatus, PaymentProvider};
use crate::infra::payments::stripe::PaymentCheckout;
use crate::infra::payments::{binance, PaymentGateways};
use sqlx::PgPool;
use tracing::{info, warn};

const ORDER_COLUMNS: &str =
    "id, user_id, product_id, amount_cents, currency, status, provider, provider_ref, created_at, paid_at";

pub async fn create(pool: &PgPool, buyer: Actor, product_id: i64) -> AppResult<Order> {
    let product = crate::app::products::get(pool, product_id).await?;
    if !product.is_published() {
        return Err(AppError::NotFound("product"));
    }
    if product.seller_id == buyer.id {
        return Err(AppError::validation("cannot buy your own product"));
    }

    let sql = format!(
        "INSERT INTO orders (user_id, product_id, amount_cents, currency, status)
         VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(buyer.id)
        .bind(product.id)
        .bind(product.price_cents)
        .bind(&product.currency)
        .bind(OrderStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;
    info!(order_id = order.id, user_id = buyer.id, product_id, "order created");
    Ok(order)
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Order> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("order"))
}

/// Owner or admin; everyone else gets a 404 rather than learning the id exists.
pub async fn get_for(pool: &PgPool, actor: Actor, id: i64) -> AppResult<Order> {
    let order = get(pool, id).await?;
    if actor.owns_or_admin(order.user_id) {
        Ok(order)
    } else {
        Err(AppError::NotFound("order"))
    }
}

pub async fn list_for_user(pool: &PgPool, user_id: i64, limit: i64, offset: i64) -> AppResult<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1
         ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
    );
    Ok(sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
}

/// Opens a checkout page at the chosen provider for a pending order.
pub async fn start_checkout(
    pool: &PgPool,
    gateways: &PaymentGateways,
    public_base_url: &str,
    actor: Actor,
    id: i64,
    provider: PaymentProvider,
) -> AppResult<String> {
    let order = get(pool, id).await?;
    if order.user_id != actor.id {
        return Err(AppError::NotFound("order"));
    }
    if order.status != OrderStatus::Pending {
        return Err(AppError::conflict(format!("order is {}", order.status)));
    }
    let product = crate::app::products::get(pool, order.product_id).await?;

    let success_url = format!("{public_base_url}/orders/{id}?status=success");
    let cancel_url = format!("{public_base_url}/orders/{id}?status=cancelled");

    let session = match provider {
        PaymentProvider::Stripe => {
            let stripe = gateways.stripe.as_ref().ok_or(AppError::Unavailable("stripe"))?;
            stripe
                .create_payment_session(&PaymentCheckout {
                    order_id: order.id,
                    user_id: order.user_id,
                    product_name: &product.title,
                    amount_cents: order.amount_cents,
                    currency: &order.currency,
                    success_url: &success_url,
                    cancel_url: &cancel_url,
                })
                .await?
        }
        PaymentProvider::Binance => {
            if !binance::settles_at_par(&order.currency) {
                return Err(AppError::validation(format!(
                    "binance pay settles in USDT and cannot charge {} prices",
                    order.currency
                )));
            }
            let binance = gateways.binance.as_ref().ok_or(AppError::Unavailable("binance pay"))?;
            binance
                .create_order(&merchant_trade_no(order.id), order.amount_cents, &product.title, &success_url)
                .await?
        }
        PaymentProvider::Manual => {
            return Err(AppError::validation("manual payments cannot be checked out"));
        }
    };

    sqlx::query("UPDATE orders SET provider = $2, provider_ref = $3 WHERE id = $1 AND status = 'pending'")
        .bind(order.id)
        .bind(provider.as_str())
        .bind(&session.provider_ref)
        .execute(pool)
        .await?;
    info!(order_id = order.id, provider = %provider, "checkout started");
    Ok(session.url)
}

/// Marks a pending order paid and grants its license.
///
/// Returns `None` when the order was not pending, so replays have no effect.
pub async fn mark_paid(
    pool: &PgPool,
    license_secret: &str,
    id: i64,
    provider: PaymentProvider,
    provider_ref: Option<&str>,
) -> AppResult<Option<Order>> {
    let mut tx = pool.begin().await?;
    let sql = format!(
        "UPDATE orders SET status = 'paid', paid_at = now(), provider = $2,
            provider_ref = COALESCE($3, provider_ref)
         WHERE id = $1 AND status = 'pending'
         RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .bind(provider.as_str())
        .bind(provider_ref)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(order) = order else {
        tx.rollback().await?;
        warn!(order_id = id, "payment for an order that is not pending ignored");
        return Ok(None);
    };

    if !licenses::has_active(&mut *tx, order.user_id, order.product_id).await? {
        licenses::issue(&mut *tx, license_secret, order.user_id, order.product_id, Some(order.id), None)
            .await?;
    }
    tx.commit().await?;
    info!(order_id = order.id, provider = %provider, "order paid");
    Ok(Some(order))
}

/// `pending → cancelled`; no-op for any other state.
pub async fn cancel(pool: &PgPool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = 'cancelled' WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;
    let changed = result.rows_affected() > 0;
    if changed {
        info!(order_id = id, "order cancelled");
    }
    Ok(changed)
}

/// `paid → refunded`, revoking the licenses the order granted.
pub async fn refund(pool: &PgPool, id: i64) -> AppResult<Order> {
    let mut tx = pool.begin().await?;
    let sql = format!(
        "UPDATE orders SET status = 'refunded' WHERE id = $1 AND status = 'paid' RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(order) = order else {
        tx.rollback().await?;
        let current = get(pool, id).await?;
        return Err(AppError::conflict(format!("order is {}", current.status)));
    };
    let revoked = licenses::revoke_for_order(&mut *tx, id).await?;
    tx.commit().await?;
    info!(order_id = id, revoked, "order refunded");
    Ok(order)
}
