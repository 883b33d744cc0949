//! Seller uploads. Files land in quarantine and only become downloadable once
//! a moderator approves them.

use crate::app::moderation::{log_action, LogEntry};
use crate::app::{Actor, AppError, AppResult};
use crate::crypto::hashing::sha256_hex;
use crate::domain::model::{TargetType, Upload, UploadStatus};
use crate::domain::validation::is_allowed_filename;
use crate::infra::storage::{new_storage_key, FileStorage};
use sqlx::PgPool;
use tracing::{error, info, warn};

const UPLOAD_COLUMNS: &str =
    "id, owner_id, filename, content_type, size_bytes, sha256, storage_key, status, created_at, reviewed_at";

const PURGE_BATCH: i64 = 100;

pub struct NewUpload<'a> {
    pub filename: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

pub async fn store(
    pool: &PgPool,
    storage: &FileStorage,
    owner: Actor,
    new: NewUpload<'_>,
    max_bytes: usize,
) -> AppResult<Upload> {
    if new.bytes.is_empty() {
        return Err(AppError::validation("upload body is empty"));
    }
    if new.bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge(max_bytes));
    }
    if !is_allowed_filename(new.filename) {
        return Err(AppError::validation("filename is not a plain name with an allowed extension"));
    }

    let key = new_storage_key();
    storage.write_quarantined(&key, new.bytes).await?;

    let sql = format!(
        "INSERT INTO uploads (owner_id, filename, content_type, size_bytes, sha256, storage_key, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {UPLOAD_COLUMNS}"
    );
    let inserted = sqlx::query_as::<_, Upload>(&sql)
        .bind(owner.id)
        .bind(new.filename)
        .bind(new.content_type)
        .bind(new.bytes.len() as i64)
        .bind(sha256_hex(new.bytes))
        .bind(&key)
        .bind(UploadStatus::Quarantined.as_str())
        .fetch_one(pool)
        .await;

    match inserted {
        Ok(upload) => {
            info!(upload_id = upload.id, owner_id = owner.id, size = upload.size_bytes, "upload quarantined");
            Ok(upload)
        }
        Err(e) => {
            if let Err(cleanup) = storage.remove_quarantined(&key).await {
                warn!(storage_key = %key, error = %cleanup, "orphaned quarantine file");
            }
            Err(e.into())
        }
    }
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Upload> {
    let sql = format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = $1");
    sqlx::query_as::<_, Upload>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("upload"))
}

/// The approved upload stored under `storage_key`.
pub async fn find_approved_by_key(pool: &PgPool, storage_key: &str) -> AppResult<Upload> {
    let sql = format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE storage_key = $1 AND status = 'approved'"
    );
    sqlx::query_as::<_, Upload>(&sql)
        .bind(storage_key)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("file"))
}

pub async fn list_for_owner(pool: &PgPool, owner_id: i64) -> AppResult<Vec<Upload>> {
    let sql = format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
    );
    Ok(sqlx::query_as::<_, Upload>(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await?)
}

pub async fn list_quarantined(pool: &PgPool, limit: i64) -> AppResult<Vec<Upload>> {
    let sql = format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE status = 'quarantined' ORDER BY created_at LIMIT $1"
    );
    Ok(sqlx::query_as::<_, Upload>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}

/// Approves (file moves to the public area) or rejects (file is deleted) a
/// quarantined upload.
///
/// Row and log are written first. An approved file is promoted before the
/// commit and moved back if the commit fails; a rejected file is only deleted
/// once the commit succeeded.
pub async fn review(
    pool: &PgPool,
    storage: &FileStorage,
    actor: Actor,
    id: i64,
    approve: bool,
    reason: Option<&str>,
) -> AppResult<Upload> {
    let mut tx = pool.begin().await?;
    let sql = format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = $1 FOR UPDATE");
    let upload = sqlx::query_as::<_, Upload>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("upload"))?;
    if upload.status != UploadStatus::Quarantined {
        return Err(AppError::conflict(format!("upload is already {}", upload.status)));
    }

    let status = if approve {
        UploadStatus::Approved
    } else {
        UploadStatus::Rejected
    };
    let sql = format!(
        "UPDATE uploads SET status = $2, reviewed_at = now() WHERE id = $1 RETURNING {UPLOAD_COLUMNS}"
    );
    let reviewed = sqlx::query_as::<_, Upload>(&sql)
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await?;
    log_action(
        &mut *tx,
        LogEntry {
            target_type: TargetType::Upload,
            target_id: id,
            action: if approve { "approve" } else { "reject" },
            moderator_id: Some(actor.id),
            automated: false,
            reason,
            scores: None,
        },
    )
    .await?;

    let key = &upload.storage_key;
    if approve {
        storage.promote(key).await?;
        if let Err(e) = tx.commit().await {
            if let Err(undo) = storage.demote(key).await {
                error!(upload_id = id, storage_key = %key, error = %undo, "approved file stranded in public area");
            }
            return Err(e.into());
        }
    } else {
        tx.commit().await?;
        if let Err(e) = storage.remove_quarantined(key).await {
            warn!(upload_id = id, storage_key = %key, error = %e, "rejected file left in quarantine");
        }
    }
    info!(upload_id = id, actor = actor.id, status = %status, "upload reviewed");
    Ok(reviewed)
}

/// Deletes quarantined uploads older than `ttl_secs`: file first, then row.
pub async fn purge_expired(pool: &PgPool, storage: &FileStorage, ttl_secs: i64) -> AppResult<usize> {
    let sql = format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads
         WHERE status = 'quarantined' AND created_at < now() - make_interval(secs => $1)
         ORDER BY created_at LIMIT $2"
    );
    let expired = sqlx::query_as::<_, Upload>(&sql)
        .bind(ttl_secs as f64)
        .bind(PURGE_BATCH)
        .fetch_all(pool)
        .await?;

    let mut purged = 0;
    for upload in expired {
        if !storage.remove_quarantined(&upload.storage_key).await? {
            warn!(upload_id = upload.id, "quarantined file was already missing");
        }
        let result = sqlx::query("DELETE FROM uploads WHERE id = $1 AND status = 'quarantined'")
            .bind(upload.id)
            .execute(pool)
            .await?;
        purged += result.rows_affected() as usize;
    }
    Ok(purged)
}
