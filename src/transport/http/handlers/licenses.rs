use crate::app::licenses;
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{created, ok, ApiResult};
use crate::transport::http::extract::Path;
use crate::transport::http::types::{
    ApiResponse, AppState, IssueLicenseRequest, ValidateLicenseRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/admin/licenses",
    tag = "admin",
    security(("bearer" = [])),
    request_body = IssueLicenseRequest,
    responses(
        (status = 201, description = "License issued; the raw key is only returned here", body = ApiResponse),
        (status = 403, description = "Admin role required", body = ApiResponse)
    )
)]
pub async fn issue_license_handler(
    State(state): State<AppState>,
    user: AuthUser,
    request: Result<Json<IssueLicenseRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    user.require(Role::Admin)?;
    let Json(req) = request?;
    crate::app::users::get(state.pool(), req.user_id).await?;
    crate::app::products::get(state.pool(), req.product_id).await?;
    let issued = licenses::issue(
        state.pool(),
        &state.config.license_secret,
        req.user_id,
        req.product_id,
        None,
        req.expires_at,
    )
    .await?;
    created(issued)
}

#[utoipa::path(
    get,
    path = "/api/licenses",
    tag = "licenses",
    security(("bearer" = [])),
    responses((status = 200, description = "Caller's licenses (keys are never returned)", body = ApiResponse))
)]
pub async fn list_licenses_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<ApiResponse>> {
    ok(licenses::list_for_user(state.pool(), actor.id).await?)
}

#[utoipa::path(
    post,
    path = "/api/licenses/{id}/regenerate",
    tag = "licenses",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "License id")),
    responses(
        (status = 200, description = "New raw key; the previous key stops validating", body = ApiResponse),
        (status = 404, description = "Unknown license", body = ApiResponse),
        (status = 409, description = "License revoked", body = ApiResponse)
    )
)]
pub async fn regenerate_license_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(licenses::regenerate(state.pool(), &state.config.license_secret, actor, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/licenses/validate",
    tag = "licenses",
    request_body = ValidateLicenseRequest,
    responses((status = 200, description = "Validation outcome", body = ApiResponse))
)]
pub async fn validate_license_handler(
    State(state): State<AppState>,
    request: Result<Json<ValidateLicenseRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(req) = request?;
    ok(licenses::validate(state.pool(), &state.config.license_secret, &req.key, req.product_id).await?)
}

#[utoipa::path(
    get,
    path = "/api/licenses/{id}/download",
    tag = "licenses",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "License id")),
    responses(
        (status = 200, description = "Presigned download link", body = ApiResponse),
        (status = 403, description = "License not valid", body = ApiResponse),
        (status = 404, description = "Unknown license or no approved file", body = ApiResponse)
    )
)]
pub async fn download_link_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    let link = licenses::download_link(
        state.pool(),
        &state.signer,
        actor,
        id,
        state.config.download_url_ttl_secs,
    )
    .await?;
    ok(link)
}

#[utoipa::path(
    post,
    path = "/api/admin/licenses/{id}/revoke",
    tag = "admin",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "License id")),
    responses(
        (status = 200, description = "License revoked", body = ApiResponse),
        (status = 404, description = "Unknown license", body = ApiResponse)
    )
)]
pub async fn revoke_license_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(licenses::revoke(state.pool(), id).await?)
}
