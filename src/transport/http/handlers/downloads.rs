use crate::app::{uploads, AppError};
use crate::crypto::signing::SignatureError;
use crate::transport::http::error::{ApiError, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{AppState, DownloadQuery};
use axum::extract::State;
use axum::http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::info;

#[utoipa::path(
    get,
    path = "/downloads/{key}",
    tag = "licenses",
    params(
        ("key" = String, Path, description = "Storage key"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream"),
        (status = 403, description = "Bad or expired signature"),
        (status = 404, description = "No approved file under this key")
    )
)]
pub async fn download_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    state
        .signer
        .verify(&key, query.expires, &query.signature, Utc::now().timestamp())
        .map_err(|e| match e {
            SignatureError::Expired => ApiError::Forbidden("download link expired".to_string()),
            SignatureError::Malformed | SignatureError::Mismatch => {
                ApiError::Forbidden("invalid download signature".to_string())
            }
        })?;

    let upload = uploads::find_approved_by_key(state.pool(), &key).await?;

    let bytes = state
        .storage
        .read_public(&key)
        .await
        .map_err(AppError::from)?;
    info!(storage_key = %key, size = bytes.len(), "file downloaded");

    let disposition = HeaderValue::from_str(&content_disposition(&upload.filename))
        .map_err(|e| ApiError::Internal(format!("content-disposition for upload {}: {e}", upload.id)))?;
    Ok(([(CONTENT_TYPE, upload.content_type)], [(CONTENT_DISPOSITION, disposition)], bytes).into_response())
}

/// `attachment` with an ASCII `filename` fallback and the exact name as
/// RFC 5987 `filename*`.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    let mut encoded = String::with_capacity(filename.len());
    for b in filename.bytes() {
        if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(
            content_disposition("plugin-v1.zip"),
            "attachment; filename=\"plugin-v1.zip\"; filename*=UTF-8''plugin-v1.zip"
        );
    }

    #[test]
    fn every_name_yields_a_valid_header() {
        for name in ["résumé 2024.pdf", "read\nme.zip", "quo\"te.txt", "日本語.txt"] {
            let value = content_disposition(name);
            assert!(HeaderValue::from_str(&value).is_ok(), "{value}");
        }
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }
}
