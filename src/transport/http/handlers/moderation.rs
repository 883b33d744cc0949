use crate::app::moderation;
use crate::domain::model::TargetType;
use crate::domain::Role;
use crate::transport::http::auth::AuthUser;
use crate::transport::http::error::{ok, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{
    ApiResponse, AppState, LimitQuery, LogsQuery, ModerationActionRequest,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/moderation/queue",
    tag = "moderation",
    security(("bearer" = [])),
    params(LimitQuery),
    responses(
        (status = 200, description = "Pending and flagged content, quarantined uploads", body = ApiResponse),
        (status = 403, description = "Moderator role required", body = ApiResponse)
    )
)]
pub async fn queue_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Moderator)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    ok(moderation::queue(state.pool(), limit).await?)
}

#[utoipa::path(
    post,
    path = "/api/moderation/{target_type}/{id}",
    tag = "moderation",
    security(("bearer" = [])),
    params(
        ("target_type" = TargetType, Path, description = "topic, comment or upload"),
        ("id" = i64, Path, description = "Target id")
    ),
    request_body = ModerationActionRequest,
    responses(
        (status = 200, description = "Action applied and logged", body = ApiResponse),
        (status = 403, description = "Moderator role required", body = ApiResponse),
        (status = 404, description = "Unknown target", body = ApiResponse)
    )
)]
pub async fn apply_action_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path((target_type, id)): Path<(TargetType, i64)>,
    request: Result<Json<ModerationActionRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse>> {
    let moderator = user.require(Role::Moderator)?;
    let Json(req) = request?;
    moderation::apply_manual(
        state.pool(),
        &state.storage,
        moderator,
        target_type,
        id,
        req.action,
        req.reason.as_deref(),
    )
    .await?;
    ok(json!({ "target_type": target_type, "target_id": id, "action": req.action }))
}

#[utoipa::path(
    get,
    path = "/api/moderation/logs",
    tag = "moderation",
    security(("bearer" = [])),
    params(LogsQuery),
    responses(
        (status = 200, description = "Moderation log, newest first", body = ApiResponse),
        (status = 403, description = "Moderator role required", body = ApiResponse)
    )
)]
pub async fn logs_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<ApiResponse>> {
    user.require(Role::Moderator)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    ok(moderation::list_logs(state.pool(), query.target_type, query.target_id, limit).await?)
}
