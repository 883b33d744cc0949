use crate::app::error::is_unique_violation;
use crate::app::{Actor, AppError, AppResult};
use crate::app::moderation::{log_action, LogEntry};
use crate::domain::model::{TargetType, User};
use crate::domain::Role;
use sqlx::PgPool;
use tracing::info;

const USER_COLUMNS: &str = "id, email, password_hash, display_name, role, banned, created_at";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub role: Role,
}

pub async fn create_user(pool: &PgPool, new: NewUser<'_>) -> AppResult<User> {
    let sql = format!(
        "INSERT INTO users (email, password_hash, display_name, role)
         VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.display_name.trim())
        .bind(new.role.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict("email already registered")
            } else {
                e.into()
            }
        })
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> AppResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?)
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<User> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("user"))
}

/// Role and ban flag as currently stored. Sessions are authorized against
/// this rather than the role baked into the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessState {
    pub role: Role,
    pub banned: bool,
}

pub async fn access_state(pool: &PgPool, id: i64) -> AppResult<Option<AccessState>> {
    let row: Option<(String, bool)> = sqlx::query_as("SELECT role, banned FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|(role, banned)| {
        let role = role
            .parse::<Role>()
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        Ok(AccessState { role, banned })
    })
    .transpose()
}

pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> AppResult<Vec<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
}

/// Changes a user's role, enforcing the hierarchy.
pub async fn change_role(pool: &PgPool, actor: Actor, user_id: i64, new_role: Role) -> AppResult<User> {
    if actor.id == user_id {
        return Err(AppError::validation("cannot change your own role"));
    }
    let target = get(pool, user_id).await?;
    if !actor.role.can_assign(target.role, new_role) {
        return Err(AppError::forbidden(format!(
            "{} cannot move a {} to {}",
            actor.role, target.role, new_role
        )));
    }

    let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .bind(new_role.as_str())
        .fetch_one(pool)
        .await?;
    info!(actor = actor.id, user_id, role = %new_role, "role changed");
    Ok(user)
}

/// Bans or unbans a user and records the action in the moderation log.
pub async fn set_banned(
    pool: &PgPool,
    actor: Actor,
    user_id: i64,
    banned: bool,
    reason: Option<&str>,
) -> AppResult<User> {
    if actor.id == user_id {
        return Err(AppError::validation("cannot ban yourself"));
    }
    let target = get(pool, user_id).await?;
    if target.role.rank() >= actor.role.rank() {
        return Err(AppError::forbidden("target outranks or equals the actor"));
    }

    let mut tx = pool.begin().await?;
    let sql = format!("UPDATE users SET banned = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .bind(banned)
        .fetch_one(&mut *tx)
        .await?;
    log_action(
        &mut *tx,
        LogEntry {
            target_type: TargetType::User,
            target_id: user_id,
            action: if banned { "ban" } else { "unban" },
            moderator_id: Some(actor.id),
            automated: false,
            reason,
            scores: None,
        },
    )
    .await?;
    tx.commit().await?;
    info!(actor = actor.id, user_id, banned, "ban state changed");
    Ok(user)
}
