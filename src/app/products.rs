use crate::app::{Actor, AppError, AppResult};
use crate::domain::model::{Product, ProductStatus, UploadStatus};
use crate::domain::Role;
use sqlx::PgPool;
use tracing::info;

const PRODUCT_COLUMNS: &str = "id, seller_id, title, description, price_cents, currency, status, \
                               upload_id, created_at, updated_at";

pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Default)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<ProductStatus>,
    pub upload_id: Option<i64>,
}

pub async fn create(pool: &PgPool, seller: Actor, new: NewProduct) -> AppResult<Product> {
    let sql = format!(
        "INSERT INTO products (seller_id, title, description, price_cents, currency, status)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PRODUCT_COLUMNS}"
    );
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(seller.id)
        .bind(new.title.trim())
        .bind(new.description.trim())
        .bind(new.price_cents)
        .bind(&new.currency)
        .bind(ProductStatus::Draft.as_str())
        .fetch_one(pool)
        .await?;
    info!(product_id = product.id, seller_id = seller.id, "product created");
    Ok(product)
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<Product> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("product"))
}

/// Published products are public; anything else only to the seller or staff.
pub async fn get_visible(pool: &PgPool, viewer: Option<Actor>, id: i64) -> AppResult<Product> {
    let product = get(pool, id).await?;
    let allowed = product.is_published()
        || viewer.is_some_and(|v| v.owns_or_admin(product.seller_id));
    if allowed {
        Ok(product)
    } else {
        Err(AppError::NotFound("product"))
    }
}

pub async fn list_published(
    pool: &PgPool,
    query: Option<&str>,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Product>> {
    let pattern = query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{}%", q.replace('%', "\\%").replace('_', "\\_")));
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE status = 'published'
           AND ($1::text IS NULL OR title ILIKE $1 OR description ILIKE $1)
         ORDER BY created_at DESC, id DESC
         LIMIT $2 OFFSET $3"
    );
    Ok(sqlx::query_as::<_, Product>(&sql)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
}

pub async fn list_by_seller(pool: &PgPool, seller_id: i64) -> AppResult<Vec<Product>> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE seller_id = $1 ORDER BY created_at DESC, id DESC"
    );
    Ok(sqlx::query_as::<_, Product>(&sql)
        .bind(seller_id)
        .fetch_all(pool)
        .await?)
}

pub async fn update(pool: &PgPool, actor: Actor, id: i64, changes: ProductChanges) -> AppResult<Product> {
    let product = get(pool, id).await?;
    if !actor.owns_or_admin(product.seller_id) {
        return Err(AppError::forbidden("only the seller or an admin can edit this product"));
    }

    if let Some(upload_id) = changes.upload_id {
        let (owner_id, status): (i64, String) =
            sqlx::query_as("SELECT owner_id, status FROM uploads WHERE id = $1")
                .bind(upload_id)
                .fetch_optional(pool)
                .await?
                .ok_or(AppError::NotFound("upload"))?;
        if status != UploadStatus::Approved.as_str() {
            return Err(AppError::validation("upload must be approved before attaching"));
        }
        if owner_id != product.seller_id && !actor.is_at_least(Role::Admin) {
            return Err(AppError::forbidden("upload belongs to another user"));
        }
    }

    let sql = format!(
        "UPDATE products SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            price_cents = COALESCE($4, price_cents),
            currency = COALESCE($5, currency),
            status = COALESCE($6, status),
            upload_id = COALESCE($7, upload_id),
            updated_at = now()
         WHERE id = $1
         RETURNING {PRODUCT_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .bind(changes.title.as_deref().map(str::trim))
        .bind(changes.description.as_deref().map(str::trim))
        .bind(changes.price_cents)
        .bind(changes.currency)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.upload_id)
        .fetch_one(pool)
        .await?;
    info!(product_id = id, actor = actor.id, status = %updated.status, "product updated");
    Ok(updated)
}

/// Soft delete.
pub async fn archive(pool: &PgPool, actor: Actor, id: i64) -> AppResult<Product> {
    update(
        pool,
        actor,
        id,
        ProductChanges {
            status: Some(ProductStatus::Archived),
            ..Default::default()
        },
    )
    .await
}
