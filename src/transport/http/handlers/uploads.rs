use crate::app::uploads::{self, NewUpload};
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{created, ok, ApiError, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{ApiResponse, AppState, ReasonRequest, UploadQuery};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[utoipa::path(
    put,
    path = "/api/uploads",
    tag = "uploads",
    security(("bearer" = [])),
    params(UploadQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 201, description = "File stored in quarantine", body = ApiResponse),
        (status = 400, description = "Empty body or disallowed filename", body = ApiResponse),
        (status = 413, description = "Body over the upload limit", body = ApiResponse)
    )
)]
pub async fn upload_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let seller = user.require(Role::Seller)?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!(
                "payload exceeds the {} byte limit",
                state.config.max_upload_bytes
            ))
        } else {
            ApiError::Validation(rejection.body_text())
        }
    })?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    let upload = uploads::store(
        state.pool(),
        &state.storage,
        seller,
        NewUpload {
            filename: query.filename.trim(),
            content_type,
            bytes: &body,
        },
        state.config.max_upload_bytes,
    )
    .await?;
    created(upload)
}

#[utoipa::path(
    get,
    path = "/api/uploads",
    tag = "uploads",
    security(("bearer" = [])),
    responses((status = 200, description = "Caller's uploads", body = ApiResponse))
)]
pub async fn list_uploads_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<ApiResponse>> {
    ok(uploads::list_for_owner(state.pool(), actor.id).await?)
}

async fn review(
    state: &AppState,
    user: AuthUser,
    id: i64,
    approve: bool,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    let moderator = user.require(Role::Moderator)?;
    let reason = request.and_then(|Json(r)| r.reason);
    ok(uploads::review(state.pool(), &state.storage, moderator, id, approve, reason.as_deref()).await?)
}

#[utoipa::path(
    post,
    path = "/api/uploads/{id}/approve",
    tag = "uploads",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Upload id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "File published", body = ApiResponse),
        (status = 409, description = "Upload already reviewed", body = ApiResponse)
    )
)]
pub async fn approve_upload_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    review(&state, user, id, true, request).await
}

#[utoipa::path(
    post,
    path = "/api/uploads/{id}/reject",
    tag = "uploads",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Upload id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "File deleted", body = ApiResponse),
        (status = 409, description = "Upload already reviewed", body = ApiResponse)
    )
)]
pub async fn reject_upload_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    review(&state, user, id, false, request).await
}
