use crate::app::moderation::{log_action, transition, LogEntry, ModerationPipeline};
use crate::app::{Actor, AppError, AppResult};
use crate::domain::model::{Comment, ContentStatus, TargetType, Topic};
use crate::domain::validation::{Validator, POST_BODY_LEN, TOPIC_TITLE_LEN};
use crate::domain::Role;
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

pub(crate) const TOPIC_COLUMNS: &str = "id, author_id, title, body, status, locked, pinned, \
                                        like_count, comment_count, created_at, updated_at";
pub(crate) const COMMENT_COLUMNS: &str =
    "id, topic_id, author_id, body, status, like_count, created_at";

#[derive(Debug, Serialize)]
pub struct TopicView {
    pub topic: Topic,
    pub comments: Vec<Comment>,
}

/// Moderator toggles on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicFlag {
    Locked,
    Pinned,
}

impl TopicFlag {
    fn column(self) -> &'static str {
        match self {
            TopicFlag::Locked => "locked",
            TopicFlag::Pinned => "pinned",
        }
    }

    fn action(self, on: bool) -> &'static str {
        match (self, on) {
            (TopicFlag::Locked, true) => "lock",
            (TopicFlag::Locked, false) => "unlock",
            (TopicFlag::Pinned, true) => "pin",
            (TopicFlag::Pinned, false) => "unpin",
        }
    }
}

async fn ensure_not_banned(pool: &PgPool, user_id: i64) -> AppResult<()> {
    let banned: Option<bool> = sqlx::query_scalar("SELECT banned FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    match banned {
        Some(false) => Ok(()),
        Some(true) => Err(AppError::forbidden("account is banned")),
        None => Err(AppError::NotFound("user")),
    }
}

pub async fn list_topics(pool: &PgPool, limit: i64, offset: i64) -> AppResult<Vec<Topic>> {
    let sql = format!(
        "SELECT {TOPIC_COLUMNS} FROM topics WHERE status = 'approved'
         ORDER BY pinned DESC, created_at DESC, id DESC
         LIMIT $1 OFFSET $2"
    );
    Ok(sqlx::query_as::<_, Topic>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?)
}

pub async fn get_topic(pool: &PgPool, id: i64) -> AppResult<Topic> {
    let sql = format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = $1");
    sqlx::query_as::<_, Topic>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("topic"))
}

pub async fn get_comment(pool: &PgPool, id: i64) -> AppResult<Comment> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1");
    sqlx::query_as::<_, Comment>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("comment"))
}

fn can_see(viewer: Option<Actor>, author_id: i64) -> bool {
    viewer.is_some_and(|v| v.id == author_id || v.is_at_least(Role::Moderator))
}

/// Topic with its approved comments. Unapproved topics are only shown to
/// their author and to moderators.
pub async fn topic_view(pool: &PgPool, viewer: Option<Actor>, id: i64) -> AppResult<TopicView> {
    let topic = get_topic(pool, id).await?;
    if topic.status != ContentStatus::Approved && !can_see(viewer, topic.author_id) {
        return Err(AppError::NotFound("topic"));
    }
    let sql = format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE topic_id = $1 AND status = 'approved'
         ORDER BY created_at, id"
    );
    let comments = sqlx::query_as::<_, Comment>(&sql)
        .bind(id)
        .fetch_all(pool)
        .await?;
    Ok(TopicView { topic, comments })
}

pub async fn create_topic(
    pool: &PgPool,
    pipeline: &ModerationPipeline,
    author: Actor,
    title: &str,
    body: &str,
) -> AppResult<Topic> {
    let (title, body) = (title.trim(), body.trim());
    Validator::new()
        .length("title", title, TOPIC_TITLE_LEN)
        .length("body", body, POST_BODY_LEN)
        .finish()
        .map_err(AppError::Validation)?;
    ensure_not_banned(pool, author.id).await?;

    let sql = format!(
        "INSERT INTO topics (author_id, title, body, status)
         VALUES ($1, $2, $3, $4) RETURNING {TOPIC_COLUMNS}"
    );
    let topic = sqlx::query_as::<_, Topic>(&sql)
        .bind(author.id)
        .bind(title)
        .bind(body)
        .bind(ContentStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;
    info!(topic_id = topic.id, author_id = author.id, "topic created");

    let text = format!("{title}\n\n{body}");
    match pipeline.moderate(pool, TargetType::Topic, topic.id, &text).await? {
        Some(_) => get_topic(pool, topic.id).await,
        None => Ok(topic),
    }
}

pub async fn create_comment(
    pool: &PgPool,
    pipeline: &ModerationPipeline,
    author: Actor,
    topic_id: i64,
    body: &str,
) -> AppResult<Comment> {
    let body = body.trim();
    Validator::new()
        .length("body", body, POST_BODY_LEN)
        .finish()
        .map_err(AppError::Validation)?;
    ensure_not_banned(pool, author.id).await?;

    let topic = get_topic(pool, topic_id).await?;
    if topic.status != ContentStatus::Approved {
        return Err(AppError::NotFound("topic"));
    }
    if topic.locked {
        return Err(AppError::conflict("topic is locked"));
    }

    let sql = format!(
        "INSERT INTO comments (topic_id, author_id, body, status)
         VALUES ($1, $2, $3, $4) RETURNING {COMMENT_COLUMNS}"
    );
    let comment = sqlx::query_as::<_, Comment>(&sql)
        .bind(topic_id)
        .bind(author.id)
        .bind(body)
        .bind(ContentStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;
    info!(comment_id = comment.id, topic_id, author_id = author.id, "comment created");

    match pipeline.moderate(pool, TargetType::Comment, comment.id, body).await? {
        Some(_) => get_comment(pool, comment.id).await,
        None => Ok(comment),
    }
}

/// Adds or removes the caller's like and returns the resulting count.
/// The counter only moves when a like row was actually inserted or deleted.
pub async fn set_like(
    pool: &PgPool,
    actor: Actor,
    target_type: TargetType,
    id: i64,
    liked: bool,
) -> AppResult<i64> {
    let (table, likes, key) = match target_type {
        TargetType::Topic => ("topics", "topic_likes", "topic_id"),
        TargetType::Comment => ("comments", "comment_likes", "comment_id"),
        _ => return Err(AppError::validation("only topics and comments can be liked")),
    };

    let mut tx = pool.begin().await?;
    let status: Option<String> =
        sqlx::query_scalar(&format!("SELECT status FROM {table} WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    if status.as_deref() != Some(ContentStatus::Approved.as_str()) {
        return Err(AppError::NotFound(if table == "topics" { "topic" } else { "comment" }));
    }

    let sql = if liked {
        format!("INSERT INTO {likes} ({key}, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
    } else {
        format!("DELETE FROM {likes} WHERE {key} = $1 AND user_id = $2")
    };
    let change = sqlx::query(&sql)
        .bind(id)
        .bind(actor.id)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i64;

    let delta = if liked { change } else { -change };
    let count: i64 = sqlx::query_scalar(&format!(
        "UPDATE {table} SET like_count = like_count + $2 WHERE id = $1 RETURNING like_count"
    ))
    .bind(id)
    .bind(delta)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(count)
}

/// Authors remove their own comments; moderators can remove any.
pub async fn delete_comment(pool: &PgPool, actor: Actor, id: i64) -> AppResult<()> {
    let comment = get_comment(pool, id).await?;
    let is_author = comment.author_id == actor.id;
    if !is_author && !actor.is_at_least(Role::Moderator) {
        return Err(AppError::forbidden("only the author or a moderator can delete this comment"));
    }

    let mut tx = pool.begin().await?;
    transition(&mut tx, TargetType::Comment, id, ContentStatus::Removed, None).await?;
    if !is_author {
        log_action(
            &mut *tx,
            LogEntry {
                target_type: TargetType::Comment,
                target_id: id,
                action: "remove",
                moderator_id: Some(actor.id),
                automated: false,
                reason: None,
                scores: None,
            },
        )
        .await?;
    }
    tx.commit().await?;
    info!(comment_id = id, actor = actor.id, "comment removed");
    Ok(())
}

pub async fn set_topic_flag(
    pool: &PgPool,
    actor: Actor,
    id: i64,
    flag: TopicFlag,
    on: bool,
) -> AppResult<Topic> {
    let mut tx = pool.begin().await?;
    let sql = format!(
        "UPDATE topics SET {} = $2, updated_at = now() WHERE id = $1 RETURNING {TOPIC_COLUMNS}",
        flag.column()
    );
    let topic = sqlx::query_as::<_, Topic>(&sql)
        .bind(id)
        .bind(on)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("topic"))?;
    log_action(
        &mut *tx,
        LogEntry {
            target_type: TargetType::Topic,
            target_id: id,
            action: flag.action(on),
            moderator_id: Some(actor.id),
            automated: false,
            reason: None,
            scores: None,
        },
    )
    .await?;
    tx.commit().await?;
    info!(topic_id = id, actor = actor.id, action = flag.action(on), "topic updated");
    Ok(topic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_actions_are_named() {
        assert_eq!(TopicFlag::Locked.action(true), "lock");
        assert_eq!(TopicFlag::Pinned.action(false), "unpin");
        assert_eq!(TopicFlag::Pinned.column(), "pinned");
    }

    #[test]
    fn hidden_content_visibility() {
        let author = Actor { id: 5, role: Role::User };
        let other = Actor { id: 6, role: Role::Seller };
        let moderator = Actor { id: 7, role: Role::Moderator };
        assert!(can_see(Some(author), 5));
        assert!(!can_see(Some(other), 5));
        assert!(can_see(Some(moderator), 5));
        assert!(!can_see(None, 5));
    }
}
