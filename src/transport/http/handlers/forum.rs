use crate::app::forum::{self, TopicFlag};
use crate::app::page;
use crate::domain::model::TargetType;
use crate::domain::Role;
use crate::transport::http::auth::{AuthUser, MaybeAuthUser};
use crate::transport::http::error::{created, ok, ApiResult};
use crate::transport::http::extract::{Path, Query};
use crate::transport::http::types::{
    ApiResponse, AppState, CreateCommentRequest, CreateTopicRequest, PageQuery,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

#[utoipa::path(
    get,
    path = "/api/forum/topics",
    tag = "forum",
    params(PageQuery),
    responses((status = 200, description = "Approved topics, pinned first", body = ApiResponse))
)]
pub async fn list_topics_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<ApiResponse>> {
    let (limit, offset) = page(query.limit, query.offset);
    ok(forum::list_topics(state.pool(), limit, offset).await?)
}

#[utoipa::path(
    get,
    path = "/api/forum/topics/{id}",
    tag = "forum",
    params(("id" = i64, Path, description = "Topic id")),
    responses(
        (status = 200, description = "Topic with approved comments", body = ApiResponse),
        (status = 404, description = "Unknown or hidden topic", body = ApiResponse)
    )
)]
pub async fn get_topic_handler(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    ok(forum::topic_view(state.pool(), viewer, id).await?)
}

#[utoipa::path(
    post,
    path = "/api/forum/topics",
    tag = "forum",
    security(("bearer" = [])),
    request_body = CreateTopicRequest,
    responses(
        (status = 201, description = "Topic created and moderated", body = ApiResponse),
        (status = 400, description = "Invalid input", body = ApiResponse)
    )
)]
pub async fn create_topic_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    request: Result<Json<CreateTopicRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let Json(req) = request?;
    created(forum::create_topic(state.pool(), &state.moderation, actor, &req.title, &req.body).await?)
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/comments",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created and moderated", body = ApiResponse),
        (status = 404, description = "Unknown or unapproved topic", body = ApiResponse),
        (status = 409, description = "Topic locked", body = ApiResponse)
    )
)]
pub async fn create_comment_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    request: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let Json(req) = request?;
    created(forum::create_comment(state.pool(), &state.moderation, actor, id, &req.body).await?)
}

async fn like(state: &AppState, actor: AuthUser, target: TargetType, id: i64, liked: bool) -> ApiResult<Json<ApiResponse>> {
    let like_count = forum::set_like(state.pool(), actor.0, target, id, liked).await?;
    ok(json!({ "liked": liked, "like_count": like_count }))
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/like",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Liked; returns the like count", body = ApiResponse))
)]
pub async fn like_topic_handler(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    like(&state, actor, TargetType::Topic, id, true).await
}

#[utoipa::path(
    delete,
    path = "/api/forum/topics/{id}/like",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Like removed; returns the like count", body = ApiResponse))
)]
pub async fn unlike_topic_handler(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    like(&state, actor, TargetType::Topic, id, false).await
}

#[utoipa::path(
    post,
    path = "/api/forum/comments/{id}/like",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Comment id")),
    responses((status = 200, description = "Liked; returns the like count", body = ApiResponse))
)]
pub async fn like_comment_handler(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    like(&state, actor, TargetType::Comment, id, true).await
}

#[utoipa::path(
    delete,
    path = "/api/forum/comments/{id}/like",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Comment id")),
    responses((status = 200, description = "Like removed; returns the like count", body = ApiResponse))
)]
pub async fn unlike_comment_handler(
    State(state): State<AppState>,
    actor: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    like(&state, actor, TargetType::Comment, id, false).await
}

#[utoipa::path(
    delete,
    path = "/api/forum/comments/{id}",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Comment id")),
    responses(
        (status = 200, description = "Comment removed", body = ApiResponse),
        (status = 403, description = "Neither author nor moderator", body = ApiResponse)
    )
)]
pub async fn delete_comment_handler(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    forum::delete_comment(state.pool(), actor, id).await?;
    ok(json!({ "removed": id }))
}

async fn toggle(state: &AppState, user: AuthUser, id: i64, flag: TopicFlag, on: bool) -> ApiResult<Json<ApiResponse>> {
    let moderator = user.require(Role::Moderator)?;
    ok(forum::set_topic_flag(state.pool(), moderator, id, flag, on).await?)
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/lock",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Topic locked", body = ApiResponse))
)]
pub async fn lock_topic_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    toggle(&state, user, id, TopicFlag::Locked, true).await
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/unlock",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Topic unlocked", body = ApiResponse))
)]
pub async fn unlock_topic_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    toggle(&state, user, id, TopicFlag::Locked, false).await
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/pin",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Topic pinned", body = ApiResponse))
)]
pub async fn pin_topic_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    toggle(&state, user, id, TopicFlag::Pinned, true).await
}

#[utoipa::path(
    post,
    path = "/api/forum/topics/{id}/unpin",
    tag = "forum",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "Topic id")),
    responses((status = 200, description = "Topic unpinned", body = ApiResponse))
)]
pub async fn unpin_topic_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse>> {
    toggle(&state, user, id, TopicFlag::Pinned, false).await
}
