//! License issuance, validation and download links.

use crate::app::{Actor, AppError, AppResult};
use crate::crypto::hashing::{
    generate_license_key, hash_license_key, is_well_formed_license_key, license_key_prefix,
};
use crate::crypto::signing::UrlSigner;
use crate::domain::model::license::InvalidReason;
use crate::domain::model::{License, LicenseStatus, UploadStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgExecutor, PgPool};
use tracing::info;

const LICENSE_COLUMNS: &str =
    "id, user_id, product_id, order_id, key_hash, key_prefix, status, expires_at, created_at";

/// A license together with its raw key. The key is only ever available here.
#[derive(Debug, Serialize)]
pub struct IssuedLicense {
    pub license: License,
    pub key: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationOutcome {
    fn invalid(reason: InvalidReason, license: Option<&License>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            license_id: license.map(|l| l.id),
            product_id: None,
            expires_at: None,
        }
    }
}

pub async fn issue<'e, E>(
    executor: E,
    secret: &str,
    user_id: i64,
    product_id: i64,
    order_id: Option<i64>,
    expires_at: Option<DateTime<Utc>>,
) -> AppResult<IssuedLicense>
where
    E: PgExecutor<'e>,
{
    let key = generate_license_key();
    let sql = format!(
        "INSERT INTO licenses (user_id, product_id, order_id, key_hash, key_prefix, status, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {LICENSE_COLUMNS}"
    );
    let license = sqlx::query_as::<_, License>(&sql)
        .bind(user_id)
        .bind(product_id)
        .bind(order_id)
        .bind(hash_license_key(secret, &key))
        .bind(license_key_prefix(&key))
        .bind(LicenseStatus::Active.as_str())
        .bind(expires_at)
        .fetch_one(executor)
        .await?;
    info!(license_id = license.id, user_id, product_id, "license issued");
    Ok(IssuedLicense { license, key })
}

/// Whether the user already holds an active, unexpired license for the product.
pub async fn has_active<'e, E>(executor: E, user_id: i64, product_id: i64) -> AppResult<bool>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
            SELECT 1 FROM licenses
            WHERE user_id = $1 AND product_id = $2 AND status = 'active'
              AND (expires_at IS NULL OR expires_at > now())
        )",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(executor)
    .await?;
    Ok(exists)
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<License> {
    let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = $1");
    sqlx::query_as::<_, License>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("license"))
}

pub async fn list_for_user(pool: &PgPool, user_id: i64) -> AppResult<Vec<License>> {
    let sql = format!(
        "SELECT {LICENSE_COLUMNS} FROM licenses WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    );
    Ok(sqlx::query_as::<_, License>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?)
}

/// Replaces the key of the caller's license; the previous key stops validating.
pub async fn regenerate(pool: &PgPool, secret: &str, actor: Actor, id: i64) -> AppResult<IssuedLicense> {
    let current = get(pool, id).await?;
    if current.user_id != actor.id {
        return Err(AppError::NotFound("license"));
    }
    if current.status == LicenseStatus::Revoked {
        return Err(AppError::conflict("license is revoked"));
    }

    let key = generate_license_key();
    let sql = format!(
        "UPDATE licenses SET key_hash = $2, key_prefix = $3 WHERE id = $1 RETURNING {LICENSE_COLUMNS}"
    );
    let license = sqlx::query_as::<_, License>(&sql)
        .bind(id)
        .bind(hash_license_key(secret, &key))
        .bind(license_key_prefix(&key))
        .fetch_one(pool)
        .await?;
    info!(license_id = id, user_id = actor.id, "license key regenerated");
    Ok(IssuedLicense { license, key })
}

/// Looks a raw key up by its hash and checks status, expiry and product.
pub async fn validate(
    pool: &PgPool,
    secret: &str,
    key: &str,
    product_id: Option<i64>,
) -> AppResult<ValidationOutcome> {
    if !is_well_formed_license_key(key) {
        return Ok(ValidationOutcome::invalid(InvalidReason::NotFound, None));
    }

    let sql = format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE key_hash = $1");
    let license = sqlx::query_as::<_, License>(&sql)
        .bind(hash_license_key(secret, key))
        .fetch_optional(pool)
        .await?;

    let Some(license) = license else {
        return Ok(ValidationOutcome::invalid(InvalidReason::NotFound, None));
    };

    Ok(match license.check(product_id, Utc::now()) {
        Ok(()) => ValidationOutcome {
            valid: true,
            reason: None,
            license_id: Some(license.id),
            product_id: Some(license.product_id),
            expires_at: license.expires_at,
        },
        Err(reason) => ValidationOutcome::invalid(reason, Some(&license)),
    })
}

pub async fn revoke(pool: &PgPool, id: i64) -> AppResult<License> {
    let sql = format!("UPDATE licenses SET status = $2 WHERE id = $1 RETURNING {LICENSE_COLUMNS}");
    let license = sqlx::query_as::<_, License>(&sql)
        .bind(id)
        .bind(LicenseStatus::Revoked.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("license"))?;
    info!(license_id = id, "license revoked");
    Ok(license)
}

pub async fn revoke_for_order<'e, E>(executor: E, order_id: i64) -> AppResult<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("UPDATE licenses SET status = 'revoked' WHERE order_id = $1 AND status = 'active'")
        .bind(order_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub filename: String,
}

/// Presigned link to the product file for the owner of a valid license.
pub async fn download_link(
    pool: &PgPool,
    signer: &UrlSigner,
    actor: Actor,
    id: i64,
    ttl_secs: i64,
) -> AppResult<DownloadLink> {
    let license = get(pool, id).await?;
    if license.user_id != actor.id {
        return Err(AppError::NotFound("license"));
    }
    if let Err(reason) = license.check(None, Utc::now()) {
        return Err(AppError::forbidden(format!("license is not valid: {reason:?}")));
    }

    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT u.storage_key, u.filename, u.status
         FROM products p JOIN uploads u ON u.id = p.upload_id
         WHERE p.id = $1",
    )
    .bind(license.product_id)
    .fetch_optional(pool)
    .await?;

    let (storage_key, filename, status) = row.ok_or(AppError::NotFound("product file"))?;
    if status != UploadStatus::Approved.as_str() {
        return Err(AppError::NotFound("product file"));
    }

    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    Ok(DownloadLink {
        url: signer.presign(&storage_key, expires_at.timestamp()),
        expires_at,
        filename,
    })
}
