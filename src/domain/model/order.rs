use chrono::{DateTime, Utc};
use serde::Serialize;

text_enum! {
    pub enum OrderStatus {
        Pending => "pending",
        Paid => "paid",
        Cancelled => "cancelled",
        Refunded => "refunded",
    }
}

text_enum! {
    pub enum PaymentProvider {
        Stripe => "stripe",
        Binance => "binance",
        Manual => "manual",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub provider: Option<String>,
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Binance Pay merchant trade numbers are alphanumeric, so order ids travel as `ORD{id}`.
pub fn merchant_trade_no(order_id: i64) -> String {
    format!("ORD{order_id}")
}

pub fn parse_merchant_trade_no(trade_no: &str) -> Option<i64> {
    trade_no.strip_prefix("ORD")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_numbers_carry_the_order_id() {
        assert_eq!(merchant_trade_no(42), "ORD42");
        assert_eq!(parse_merchant_trade_no("ORD42"), Some(42));
        assert_eq!(parse_merchant_trade_no("42"), None);
        assert_eq!(parse_merchant_trade_no("ORDabc"), None);
    }
}
