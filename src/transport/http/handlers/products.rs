use crate::app::products::{self, NewProduct, ProductChanges};
use crate::app::page;
use crate::domain::validation::{
    is_valid_currency, Validator, PRODUCT_DESCRIPTION_MAX, PRODUCT_TITLE_LEN,
};
use crate::domain::Role;
use crate::transport::http::auth::{AuthUser, MaybeAuthUser};
use crate::transport::http::error::{created, ok, ApiError, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{
    ApiResponse, AppState, CreateProductRequest, ProductListQuery, UpdateProductRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

fn validate_fields(
    title: Option<&str>,
    description: Option<&str>,
    price_cents: Option<i64>,
    currency: Option<&str>,
) -> ApiResult<()> {
    let mut v = Validator::new();
    if let Some(title) = title {
        v.length("title", title.trim(), PRODUCT_TITLE_LEN);
    }
    if let Some(description) = description {
        v.check(
            description.chars().count() <= PRODUCT_DESCRIPTION_MAX,
            format!("description must be at most {PRODUCT_DESCRIPTION_MAX} characters"),
        );
    }
    if let Some(price) = price_cents {
        v.check(price > 0, "price_cents must be positive");
    }
    if let Some(currency) = currency {
        v.check(is_valid_currency(currency), "currency must be a 3-letter uppercase code");
    }
    v.finish().map_err(ApiError::Validation)
}

#[utoipa::path(
    get,
    path = "/api/products",
    tag = "products",
    params(ProductListQuery),
    responses((status = 200, description = "Published products", body = ApiResponse))
)]
pub async fn list_products_handler(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Json<ApiResponse>> {
    let (limit, offset) = page(query.limit, query.offset);
    ok(products::list_published(state.pool(), query.q.as_deref(), limit, offset).await?)
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "products",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = ApiResponse),
        (status = 404, description = "Unknown or not visible", body = ApiResponse)
    )
)]
pub async fn get_product_handler(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(products::get_visible(state.pool(), viewer, id).await?)
}

#[utoipa::path(
    get,
    path = "/api/products/mine",
    tag = "products",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The seller's products in every status", body = ApiResponse),
        (status = 403, description = "Seller role required", body = ApiResponse)
    )
)]
pub async fn my_products_handler(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<ApiResponse>> {
    let seller = user.require(Role::Seller)?;
    ok(products::list_by_seller(state.pool(), seller.id).await?)
}

#[utoipa::path(
    post,
    path = "/api/products",
    tag = "products",
    security(("bearer" = [])),
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Draft product created", body = ApiResponse),
        (status = 400, description = "Invalid input", body = ApiResponse),
        (status = 403, description = "Seller role required", body = ApiResponse)
    )
)]
pub async fn create_product_handler(
    State(state): State<AppState>,
    user: AuthUser,
    request: Result<Json<CreateProductRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let seller = user.require(Role::Seller)?;
    let Json(req) = request?;
    validate_fields(
        Some(&req.title),
        Some(&req.description),
        Some(req.price_cents),
        Some(&req.currency),
    )?;
    let product = products::create(
        state.pool(),
        seller,
        NewProduct {
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            currency: req.currency,
        },
    )
    .await?;
    created(product)
}

#[utoipa::path(
    patch,
    path = "/api/products/{id}",
    tag = "products",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = ApiResponse),
        (status = 400, description = "Invalid input", body = ApiResponse),
        (status = 403, description = "Not the owner", body = ApiResponse)
    )
)]
pub async fn update_product_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    request: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(req) = request?;
    validate_fields(
        req.title.as_deref(),
        req.description.as_deref(),
        req.price_cents,
        req.currency.as_deref(),
    )?;
    let changes = ProductChanges {
        title: req.title,
        description: req.description,
        price_cents: req.price_cents,
        currency: req.currency,
        status: req.status,
        upload_id: req.upload_id,
    };
    ok(products::update(state.pool(), actor, id, changes).await?)
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    tag = "products",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product archived", body = ApiResponse),
        (status = 403, description = "Not the owner", body = ApiResponse)
    )
)]
pub async fn archive_product_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(products::archive(state.pool(), actor, id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_updates_only_check_present_fields() {
        assert!(validate_fields(None, None, None, None).is_ok());
        assert!(validate_fields(None, None, Some(0), None).is_err());
        assert!(validate_fields(Some("ok"), None, None, None).is_err());
        assert!(validate_fields(Some("Icon pack"), None, Some(500), Some("EUR")).is_ok());
        assert!(validate_fields(None, None, None, Some("eur")).is_err());
    }
}
