use crate::app::subscriptions;
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{created, ok, ApiResult};
use crate::transport::http::extract::Path;
use crate::transport::http::types::{
    ApiResponse, AppState, CheckoutResponse, GrantSubscriptionRequest, SubscriptionCheckoutRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/subscriptions/me",
    tag = "subscriptions",
    security(("bearer" = [])),
    responses((status = 200, description = "Latest subscription and whether it grants access", body = ApiResponse))
)]
pub async fn my_subscription_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<ApiResponse>> {
    ok(subscriptions::overview(state.pool(), actor.id).await?)
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/checkout",
    tag = "subscriptions",
    security(("bearer" = [])),
    request_body = SubscriptionCheckoutRequest,
    responses(
        (status = 200, description = "Stripe checkout page", body = ApiResponse),
        (status = 503, description = "Stripe or plan price not configured", body = ApiResponse)
    )
)]
pub async fn subscription_checkout_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    request: Result<Json<SubscriptionCheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(req) = request?;
    let checkout_url = subscriptions::start_checkout(
        state.payments.stripe.as_ref(),
        &state.config.stripe,
        &state.config.public_base_url,
        actor,
        req.plan,
    )
    .await?;
    ok(CheckoutResponse { checkout_url })
}

#[utoipa::path(
    post,
    path = "/api/subscriptions/{id}/cancel",
    tag = "subscriptions",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Subscription id")),
    responses(
        (status = 200, description = "Cancels at period end", body = ApiResponse),
        (status = 404, description = "Unknown subscription", body = ApiResponse),
        (status = 409, description = "Already canceled or expired", body = ApiResponse),
        (status = 503, description = "Stripe-backed subscription but Stripe not configured", body = ApiResponse)
    )
)]
pub async fn cancel_subscription_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(subscriptions::cancel(state.pool(), state.payments.stripe.as_ref(), actor, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/admin/subscriptions",
    tag = "admin",
    security(("bearer" = [])),
    request_body = GrantSubscriptionRequest,
    responses(
        (status = 201, description = "Active subscription granted", body = ApiResponse),
        (status = 400, description = "Invalid duration", body = ApiResponse)
    )
)]
pub async fn grant_subscription_handler(
    State(state): State<AppState>,
    user: AuthUser,
    request: Result<Json<GrantSubscriptionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    user.require(Role::Admin)?;
    let Json(req) = request?;
    created(subscriptions::grant(state.pool(), req.user_id, req.plan, req.days).await?)
}
