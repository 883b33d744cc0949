use chrono::{DateTime, Utc};
use serde::Serialize;

text_enum! {
    pub enum LicenseStatus {
        Active => "active",
        Revoked => "revoked",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct License {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub order_id: Option<i64>,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    #[sqlx(try_from = "String")]
    pub status: LicenseStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Why a license key did not validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    Revoked,
    Expired,
    ProductMismatch,
}

impl License {
    pub fn check(&self, product_id: Option<i64>, now: DateTime<Utc>) -> Result<(), InvalidReason> {
        if self.status == LicenseStatus::Revoked {
            return Err(InvalidReason::Revoked);
        }
        if self.expires_at.is_some_and(|exp| exp <= now) {
            return Err(InvalidReason::Expired);
        }
        if product_id.is_some_and(|p| p != self.product_id) {
            return Err(InvalidReason::ProductMismatch);
        }
        Ok(())
    }
}
