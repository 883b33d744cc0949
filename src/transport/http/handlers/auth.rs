use crate::app::users::{self, NewUser};
use crate::crypto::password::{spawn_hash_password, spawn_verify_password};
use crate::domain::model::User;
use crate::domain::validation::{
    is_valid_email, normalize_email, Validator, DISPLAY_NAME_LEN, PASSWORD_LEN,
};
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{created, ok, ApiError, ApiResult};
use crate::transport::http::types::{ApiResponse, AppState, LoginRequest, RegisterRequest};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct Session {
    token: String,
    user: User,
}

fn session(state: &AppState, user: User) -> ApiResult<Session> {
    let token = state
        .tokens
        .issue(user.id, user.role)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Session { token, user })
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, session issued", body = ApiResponse),
        (status = 400, description = "Invalid input", body = ApiResponse),
        (status = 409, description = "Email already registered", body = ApiResponse)
    )
)]
pub async fn register_handler(
    State(state): State<AppState>,
    request: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let Json(req) = request?;
    let email = normalize_email(&req.email);
    let display_name = req.display_name.trim();
    Validator::new()
        .check(is_valid_email(&email), "email is not a valid address")
        .length("password", &req.password, PASSWORD_LEN)
        .length("display_name", display_name, DISPLAY_NAME_LEN)
        .finish()
        .map_err(ApiError::Validation)?;

    let role = if state.config.bootstrap_admin_email.as_deref() == Some(email.as_str()) {
        Role::Admin
    } else {
        Role::User
    };
    let password_hash = spawn_hash_password(req.password)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let user = users::create_user(
        state.pool(),
        NewUser {
            email: &email,
            password_hash: &password_hash,
            display_name,
            role,
        },
    )
    .await?;
    info!(user_id = user.id, role = %user.role, "user registered");
    created(session(&state, user)?)
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = ApiResponse),
        (status = 401, description = "Wrong credentials", body = ApiResponse),
        (status = 403, description = "Account banned", body = ApiResponse)
    )
)]
pub async fn login_handler(
    State(state): State<AppState>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let Json(req) = request?;
    let email = normalize_email(&req.email);
    let wrong = || ApiError::Unauthorized("invalid email or password".to_string());

    let user = users::find_by_email(state.pool(), &email).await?.ok_or_else(wrong)?;
    let matches = spawn_verify_password(req.password, user.password_hash.clone())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !matches {
        return Err(wrong());
    }
    if user.banned {
        return Err(ApiError::Forbidden("account is banned".to_string()));
    }
    info!(user_id = user.id, "user logged in");
    ok(session(&state, user)?)
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = ApiResponse),
        (status = 401, description = "Missing or invalid token", body = ApiResponse)
    )
)]
pub async fn me_handler(State(state): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<ApiResponse>> {
    ok(users::get(state.pool(), actor.id).await?)
}
