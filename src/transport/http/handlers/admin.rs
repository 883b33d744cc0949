use crate::app::{analytics, page, users};
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{ok, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{
    ApiResponse, AppState, ChangeRoleRequest, DaysQuery, LimitQuery, PageQuery, ReasonRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "admin",
    security(("bearer" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Users", body = ApiResponse),
        (status = 403, description = "Admin role required", body = ApiResponse)
    )
)]
pub async fn list_users_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    let (limit, offset) = page(query.limit, query.offset);
    ok(users::list(state.pool(), limit, offset).await?)
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/role",
    tag = "admin",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = ApiResponse),
        (status = 400, description = "Own role", body = ApiResponse),
        (status = 403, description = "Outside the actor's authority", body = ApiResponse)
    )
)]
pub async fn change_role_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    request: Result<Json<ChangeRoleRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let admin = user.require(Role::Admin)?;
    let Json(req) = request?;
    ok(users::change_role(state.pool(), admin, id, req.role).await?)
}

async fn set_banned(
    state: &AppState,
    user: AuthUser,
    id: i64,
    banned: bool,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    let admin = user.require(Role::Admin)?;
    let reason = request.and_then(|Json(r)| r.reason);
    ok(users::set_banned(state.pool(), admin, id, banned, reason.as_deref()).await?)
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/ban",
    tag = "admin",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "User banned and logged", body = ApiResponse),
        (status = 403, description = "Admin role required", body = ApiResponse)
    )
)]
pub async fn ban_user_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    set_banned(&state, user, id, true, request).await
}

#[utoipa::path(
    post,
    path = "/api/admin/users/{id}/unban",
    tag = "admin",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "User unbanned and logged", body = ApiResponse),
        (status = 403, description = "Admin role required", body = ApiResponse)
    )
)]
pub async fn unban_user_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse>> {
    set_banned(&state, user, id, false, request).await
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics/overview",
    tag = "analytics",
    security(("bearer" = [])),
    responses((status = 200, description = "Platform totals", body = ApiResponse))
)]
pub async fn overview_handler(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(analytics::overview(state.pool()).await?)
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics/revenue",
    tag = "analytics",
    security(("bearer" = [])),
    params(DaysQuery),
    responses((status = 200, description = "Daily paid orders and revenue, zero-filled", body = ApiResponse))
)]
pub async fn revenue_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(analytics::revenue(state.pool(), analytics::clamp_days(query.days)).await?)
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics/top-products",
    tag = "analytics",
    security(("bearer" = [])),
    params(LimitQuery),
    responses((status = 200, description = "Best selling products by revenue", body = ApiResponse))
)]
pub async fn top_products_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(analytics::top_products(state.pool(), analytics::clamp_top(query.limit)).await?)
}

#[utoipa::path(
    get,
    path = "/api/admin/analytics/signups",
    tag = "analytics",
    security(("bearer" = [])),
    params(DaysQuery),
    responses((status = 200, description = "Daily signups, zero-filled", body = ApiResponse))
)]
pub async fn signups_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(analytics::signups(state.pool(), analytics::clamp_days(query.days)).await?)
}
