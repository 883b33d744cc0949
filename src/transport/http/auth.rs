//! Bearer-token extraction and role gates.
//!
//! The token proves identity; role and ban state are read from `users` on
//! every request.

use crate::app::{users, Actor};
use crate::crypto::token::TokenError;
use crate::domain::Role;
use crate::transport::http::error::ApiError;
use crate::transport::http::types::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// The caller, authenticated from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

/// Like [`AuthUser`] but anonymous requests are allowed. A token that is
/// present but invalid is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<Actor>);

impl AuthUser {
    /// Returns the actor when their role is at least `role`, 403 otherwise.
    pub fn require(self, role: Role) -> Result<Actor, ApiError> {
        if self.0.is_at_least(role) {
            Ok(self.0)
        } else {
            Err(ApiError::Forbidden(format!("requires role {role}")))
        }
    }
}

fn bearer(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthorized("malformed authorization header".to_string()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))
}

/// Verifies the token, then authorizes against the stored account so bans and
/// role changes apply to sessions that are already open.
async fn authenticate(token: &str, state: &AppState) -> Result<Actor, ApiError> {
    let claims = state.tokens.verify(token).map_err(|e| match e {
        TokenError::Expired => ApiError::Unauthorized("session expired".to_string()),
        TokenError::Invalid(_) => ApiError::Unauthorized("invalid session token".to_string()),
    })?;
    let account = users::access_state(state.pool(), claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;
    if account.banned {
        return Err(ApiError::Forbidden("account is banned".to_string()));
    }
    Ok(Actor {
        id: claims.sub,
        role: account.role,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;
        authenticate(token, state).await.map(AuthUser)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer(parts)? {
            Some(token) => authenticate(token, state).await.map(|a| MaybeAuthUser(Some(a))),
            None => Ok(MaybeAuthUser(None)),
        }
    }
}
