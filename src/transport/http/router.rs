use crate::app::analytics::{Overview, RevenueDay, SignupDay, TopProduct};
use crate::domain::model::{
    ModerationAction, PaymentProvider, Plan, ProductStatus, TargetType,
};
use crate::domain::Role;
use crate::transport::http::handlers::{
    admin, auth, downloads, forum, health, licenses, moderation, orders, products, subscriptions,
    uploads, webhooks,
};
use crate::transport::http::types::{
    ApiResponse, AppState, ChangeRoleRequest, CheckoutRequest, CheckoutResponse,
    CreateCommentRequest, CreateOrderRequest, CreateProductRequest, CreateTopicRequest,
    GrantSubscriptionRequest, IssueLicenseRequest, LoginRequest, ModerationActionRequest,
    ReasonRequest, RegisterRequest, SubscriptionCheckoutRequest, UpdateProductRequest,
    ValidateLicenseRequest,
};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post, put};
use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthcheck_handler,
        auth::register_handler,
        auth::login_handler,
        auth::me_handler,
        products::list_products_handler,
        products::get_product_handler,
        products::my_products_handler,
        products::create_product_handler,
        products::update_product_handler,
        products::archive_product_handler,
        orders::create_order_handler,
        orders::list_orders_handler,
        orders::get_order_handler,
        orders::checkout_handler,
        orders::refund_order_handler,
        licenses::issue_license_handler,
        licenses::list_licenses_handler,
        licenses::regenerate_license_handler,
        licenses::validate_license_handler,
        licenses::download_link_handler,
        licenses::revoke_license_handler,
        downloads::download_handler,
        subscriptions::my_subscription_handler,
        subscriptions::subscription_checkout_handler,
        subscriptions::cancel_subscription_handler,
        subscriptions::grant_subscription_handler,
        webhooks::stripe_webhook_handler,
        webhooks::binance_webhook_handler,
        forum::list_topics_handler,
        forum::get_topic_handler,
        forum::create_topic_handler,
        forum::create_comment_handler,
        forum::like_topic_handler,
        forum::unlike_topic_handler,
        forum::like_comment_handler,
        forum::unlike_comment_handler,
        forum::delete_comment_handler,
        forum::lock_topic_handler,
        forum::unlock_topic_handler,
        forum::pin_topic_handler,
        forum::unpin_topic_handler,
        moderation::queue_handler,
        moderation::apply_action_handler,
        moderation::logs_handler,
        uploads::upload_handler,
        uploads::list_uploads_handler,
        uploads::approve_upload_handler,
        uploads::reject_upload_handler,
        admin::list_users_handler,
        admin::change_role_handler,
        admin::ban_user_handler,
        admin::unban_user_handler,
        admin::overview_handler,
        admin::revenue_handler,
        admin::top_products_handler,
        admin::signups_handler
    ),
    components(schemas(
        ApiResponse,
        RegisterRequest,
        LoginRequest,
        CreateProductRequest,
        UpdateProductRequest,
        CreateOrderRequest,
        CheckoutRequest,
        CheckoutResponse,
        IssueLicenseRequest,
        ValidateLicenseRequest,
        SubscriptionCheckoutRequest,
        GrantSubscriptionRequest,
        CreateTopicRequest,
        CreateCommentRequest,
        ModerationActionRequest,
        ReasonRequest,
        ChangeRoleRequest,
        Role,
        Plan,
        PaymentProvider,
        ProductStatus,
        ModerationAction,
        TargetType,
        Overview,
        RevenueDay,
        TopProduct,
        SignupDay
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Registration and sessions"),
        (name = "products", description = "Marketplace catalogue"),
        (name = "orders", description = "Purchases and checkout"),
        (name = "licenses", description = "License keys and downloads"),
        (name = "subscriptions", description = "Recurring plans"),
        (name = "webhooks", description = "Payment provider callbacks"),
        (name = "forum", description = "Topics, comments and likes"),
        (name = "moderation", description = "Content review"),
        (name = "uploads", description = "Seller files and quarantine"),
        (name = "admin", description = "User and commerce administration"),
        (name = "analytics", description = "Dashboard aggregates"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = app_state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::healthcheck_handler))
        // auth
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/me", get(auth::me_handler))
        // products
        .route(
            "/api/products",
            get(products::list_products_handler).post(products::create_product_handler),
        )
        .route("/api/products/mine", get(products::my_products_handler))
        .route(
            "/api/products/:id",
            get(products::get_product_handler)
                .patch(products::update_product_handler)
                .delete(products::archive_product_handler),
        )
        // orders
        .route(
            "/api/orders",
            get(orders::list_orders_handler).post(orders::create_order_handler),
        )
        .route("/api/orders/:id", get(orders::get_order_handler))
        .route("/api/orders/:id/checkout", post(orders::checkout_handler))
        // licenses
        .route("/api/licenses", get(licenses::list_licenses_handler))
        .route("/api/licenses/validate", post(licenses::validate_license_handler))
        .route("/api/licenses/:id/regenerate", post(licenses::regenerate_license_handler))
        .route("/api/licenses/:id/download", get(licenses::download_link_handler))
        .route("/downloads/:key", get(downloads::download_handler))
        // subscriptions
        .route("/api/subscriptions/me", get(subscriptions::my_subscription_handler))
        .route("/api/subscriptions/checkout", post(subscriptions::subscription_checkout_handler))
        .route("/api/subscriptions/:id/cancel", post(subscriptions::cancel_subscription_handler))
        // webhooks
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook_handler))
        .route("/api/webhooks/binance", post(webhooks::binance_webhook_handler))
        // forum
        .route(
            "/api/forum/topics",
            get(forum::list_topics_handler).post(forum::create_topic_handler),
        )
        .route("/api/forum/topics/:id", get(forum::get_topic_handler))
        .route("/api/forum/topics/:id/comments", post(forum::create_comment_handler))
        .route(
            "/api/forum/topics/:id/like",
            post(forum::like_topic_handler).delete(forum::unlike_topic_handler),
        )
        .route("/api/forum/topics/:id/lock", post(forum::lock_topic_handler))
        .route("/api/forum/topics/:id/unlock", post(forum::unlock_topic_handler))
        .route("/api/forum/topics/:id/pin", post(forum::pin_topic_handler))
        .route("/api/forum/topics/:id/unpin", post(forum::unpin_topic_handler))
        .route("/api/forum/comments/:id", axum::routing::delete(forum::delete_comment_handler))
        .route(
            "/api/forum/comments/:id/like",
            post(forum::like_comment_handler).delete(forum::unlike_comment_handler),
        )
        // moderation
        .route("/api/moderation/queue", get(moderation::queue_handler))
        .route("/api/moderation/logs", get(moderation::logs_handler))
        .route("/api/moderation/:target_type/:id", post(moderation::apply_action_handler))
        // uploads
        .route(
            "/api/uploads",
            put(uploads::upload_handler)
                .get(uploads::list_uploads_handler)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/uploads/:id/approve", post(uploads::approve_upload_handler))
        .route("/api/uploads/:id/reject", post(uploads::reject_upload_handler))
        // admin
        .route("/api/admin/users", get(admin::list_users_handler))
        .route("/api/admin/users/:id/role", patch(admin::change_role_handler))
        .route("/api/admin/users/:id/ban", post(admin::ban_user_handler))
        .route("/api/admin/users/:id/unban", post(admin::unban_user_handler))
        .route("/api/admin/orders/:id/refund", post(orders::refund_order_handler))
        .route("/api/admin/licenses", post(licenses::issue_license_handler))
        .route("/api/admin/licenses/:id/revoke", post(licenses::revoke_license_handler))
        .route("/api/admin/subscriptions", post(subscriptions::grant_subscription_handler))
        .route("/api/admin/analytics/overview", get(admin::overview_handler))
        .route("/api/admin/analytics/revenue", get(admin::revenue_handler))
        .route("/api/admin/analytics/top-products", get(admin::top_products_handler))
        .route("/api/admin/analytics/signups", get(admin::signups_handler))
        .with_state(app_state)
}
