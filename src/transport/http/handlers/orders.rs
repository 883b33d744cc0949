use crate::app::{orders, page};
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{created, ok, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{
    ApiResponse, AppState, CheckoutRequest, CheckoutResponse, CreateOrderRequest, PageQuery,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "orders",
    security(("bearer" = [])),
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Pending order", body = ApiResponse),
        (status = 400, description = "Cannot buy this product", body = ApiResponse),
        (status = 404, description = "Product not available", body = ApiResponse)
    )
)]
pub async fn create_order_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    request: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let Json(req) = request?;
    created(orders::create(state.pool(), actor, req.product_id).await?)
}

#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "orders",
    security(("bearer" = [])),
    params(PageQuery),
    responses((status = 200, description = "Caller's orders", body = ApiResponse))
)]
pub async fn list_orders_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ApiResponse>> {
    let (limit, offset) = page(query.limit, query.offset);
    ok(orders::list_for_user(state.pool(), actor.id, limit, offset).await?)
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "orders",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order", body = ApiResponse),
        (status = 404, description = "Unknown order", body = ApiResponse)
    )
)]
pub async fn get_order_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(orders::get_for(state.pool(), actor, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/checkout",
    tag = "orders",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Order id")),
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Provider checkout page", body = ApiResponse),
        (status = 409, description = "Order is not pending", body = ApiResponse),
        (status = 503, description = "Provider not configured", body = ApiResponse)
    )
)]
pub async fn checkout_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    request: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(req) = request?;
    let checkout_url = orders::start_checkout(
        state.pool(),
        &state.payments,
        &state.config.public_base_url,
        actor,
        id,
        req.provider,
    )
    .await?;
    ok(CheckoutResponse { checkout_url })
}

#[utoipa::path(
    post,
    path = "/api/admin/orders/{id}/refund",
    tag = "admin",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order refunded, licenses revoked", body = ApiResponse),
        (status = 409, description = "Order is not paid", body = ApiResponse)
    )
)]
pub async fn refund_order_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Admin)?;
    ok(orders::refund(state.pool(), id).await?)
}
