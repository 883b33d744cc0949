//! Postgres connection pool and schema bootstrap.
//!
//! All tables are created with idempotent `CREATE TABLE IF NOT EXISTS`
//! statements at startup, so a fresh database needs no separate migration step.

use crate::infra::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Tables owned by the service, in creation order (foreign keys point backwards).
pub const TABLES: &[&str] = &[
    "users",
    "uploads",
    "products",
    "orders",
    "licenses",
    "subscriptions",
    "topics",
    "comments",
    "topic_likes",
    "comment_likes",
    "moderation_logs",
    "webhook_events",
];

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        display_name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user',
        banned BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS uploads (
        id BIGSERIAL PRIMARY KEY,
        owner_id BIGINT NOT NULL REFERENCES users(id),
        filename TEXT NOT NULL,
        content_type TEXT NOT NULL,
        size_bytes BIGINT NOT NULL,
        sha256 TEXT NOT NULL,
        storage_key TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'quarantined',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        reviewed_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS uploads_status_created_idx ON uploads (status, created_at)",
    "CREATE TABLE IF NOT EXISTS products (
        id BIGSERIAL PRIMARY KEY,
        seller_id BIGINT NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        price_cents BIGINT NOT NULL CHECK (price_cents > 0),
        currency TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        upload_id BIGINT REFERENCES uploads(id) ON DELETE SET NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        product_id BIGINT NOT NULL REFERENCES products(id),
        amount_cents BIGINT NOT NULL,
        currency TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        provider TEXT,
        provider_ref TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        paid_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS orders_status_paid_idx ON orders (status, paid_at)",
    "CREATE TABLE IF NOT EXISTS licenses (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        product_id BIGINT NOT NULL REFERENCES products(id),
        order_id BIGINT REFERENCES orders(id),
        key_hash TEXT NOT NULL UNIQUE,
        key_prefix TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        expires_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS subscriptions (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        plan TEXT NOT NULL,
        status TEXT NOT NULL,
        provider_ref TEXT UNIQUE,
        current_period_end TIMESTAMPTZ NOT NULL,
        cancel_at_period_end BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS topics (
        id BIGSERIAL PRIMARY KEY,
        author_id BIGINT NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        locked BOOLEAN NOT NULL DEFAULT FALSE,
        pinned BOOLEAN NOT NULL DEFAULT FALSE,
        like_count BIGINT NOT NULL DEFAULT 0,
        comment_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS topics_status_created_idx ON topics (status, created_at)",
    "CREATE TABLE IF NOT EXISTS comments (
        id BIGSERIAL PRIMARY KEY,
        topic_id BIGINT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        author_id BIGINT NOT NULL REFERENCES users(id),
        body TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        like_count BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS comments_status_created_idx ON comments (status, created_at)",
    "CREATE TABLE IF NOT EXISTS topic_likes (
        topic_id BIGINT NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (topic_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS comment_likes (
        comment_id BIGINT NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
        user_id BIGINT NOT NULL REFERENCES users(id),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (comment_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS moderation_logs (
        id BIGSERIAL PRIMARY KEY,
        target_type TEXT NOT NULL,
        target_id BIGINT NOT NULL,
        action TEXT NOT NULL,
        moderator_id BIGINT REFERENCES users(id),
        automated BOOLEAN NOT NULL DEFAULT FALSE,
        reason TEXT,
        scores JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE INDEX IF NOT EXISTS moderation_logs_target_idx ON moderation_logs (target_type, target_id)",
    "CREATE TABLE IF NOT EXISTS webhook_events (
        id BIGSERIAL PRIMARY KEY,
        provider TEXT NOT NULL,
        event_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        payload JSONB NOT NULL,
        processed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (provider, event_id)
    )",
];

// Arbitrary constant lock ID (must be stable across instances).
const SCHEMA_LOCK_ID: i64 = 7_310_001;

/// Owns the connection pool shared by every request handler and worker.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: PgPool,
}

impl DatabaseService {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connects to Postgres and makes sure the schema exists.
    pub async fn new(config: &Config) -> Result<Self, anyhow::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(&config.database_url)
            .await?;

        let service = Self { pool };
        service.apply_schema().await?;
        info!(tables = TABLES.len(), "database schema ready");
        Ok(service)
    }

    /// Builds a pool that only connects on first use. Nothing is checked up front.
    pub fn connect_lazy(config: &Config) -> Result<Self, anyhow::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect_lazy(&config.database_url)?;
        Ok(Self { pool })
    }

    pub async fn apply_schema(&self) -> Result<(), anyhow::Error> {
        let mut tx = self.pool.begin().await?;
        // Concurrent `CREATE TABLE IF NOT EXISTS` can still collide in pg_type.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_ID)
            .execute(&mut *tx)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Returns the service tables that do not exist yet.
    pub async fn missing_tables(&self) -> Result<Vec<String>, anyhow::Error> {
        let present: Vec<String> = sqlx::query_scalar(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = current_schema()",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(TABLES
            .iter()
            .filter(|t| !present.iter().any(|p| p == *t))
            .map(|t| t.to_string())
            .collect())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
