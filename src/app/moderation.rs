//! Automated and manual review of user content, plus the audit log.

use crate::app::{uploads, Actor, AppError, AppResult};
use crate::domain::model::{
    Comment, ContentStatus, ModerationAction, ModerationLog, TargetType, Topic, Upload,
};
use crate::domain::moderation::{ModerationDecision, ModerationPolicy};
use crate::infra::moderation::ContentClassifier;
use crate::infra::storage::FileStorage;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgExecutor, PgPool};
use std::sync::Arc;
use tracing::{debug, info, warn};

const LOG_COLUMNS: &str =
    "id, target_type, target_id, action, moderator_id, automated, reason, scores, created_at";

pub const DISABLED_REASON: &str = "classifier disabled";

pub struct LogEntry<'a> {
    pub target_type: TargetType,
    pub target_id: i64,
    pub action: &'a str,
    pub moderator_id: Option<i64>,
    pub automated: bool,
    pub reason: Option<&'a str>,
    pub scores: Option<JsonValue>,
}

pub async fn log_action<'e, E>(executor: E, entry: LogEntry<'_>) -> AppResult<ModerationLog>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO moderation_logs (target_type, target_id, action, moderator_id, automated, reason, scores)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {LOG_COLUMNS}"
    );
    Ok(sqlx::query_as::<_, ModerationLog>(&sql)
        .bind(entry.target_type.as_str())
        .bind(entry.target_id)
        .bind(entry.action)
        .bind(entry.moderator_id)
        .bind(entry.automated)
        .bind(entry.reason)
        .bind(entry.scores)
        .fetch_one(executor)
        .await?)
}

/// Moves a topic or comment to `status`, keeping the topic's approved-comment
/// counter in step. When `only_from` is set the row must currently hold that
/// status. Returns the previous status, or `None` if nothing changed.
pub async fn transition(
    conn: &mut PgConnection,
    target_type: TargetType,
    id: i64,
    status: ContentStatus,
    only_from: Option<ContentStatus>,
) -> AppResult<Option<ContentStatus>> {
    match target_type {
        TargetType::Topic => {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM topics WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let previous = parse_status(current.ok_or(AppError::NotFound("topic"))?)?;
            if only_from.is_some_and(|s| s != previous) {
                return Ok(None);
            }
            sqlx::query("UPDATE topics SET status = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&mut *conn)
                .await?;
            Ok(Some(previous))
        }
        TargetType::Comment => {
            let row: Option<(String, i64)> =
                sqlx::query_as("SELECT status, topic_id FROM comments WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?;
            let (current, topic_id) = row.ok_or(AppError::NotFound("comment"))?;
            let previous = parse_status(current)?;
            if only_from.is_some_and(|s| s != previous) {
                return Ok(None);
            }
            sqlx::query("UPDATE comments SET status = $2 WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .execute(&mut *conn)
                .await?;

            let delta = approved_delta(previous, status);
            if delta != 0 {
                sqlx::query("UPDATE topics SET comment_count = comment_count + $2 WHERE id = $1")
                    .bind(topic_id)
                    .bind(delta)
                    .execute(&mut *conn)
                    .await?;
            }
            Ok(Some(previous))
        }
        other => Err(AppError::validation(format!("{other} has no content status"))),
    }
}

fn parse_status(raw: String) -> AppResult<ContentStatus> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(anyhow::anyhow!(e)))
}

fn approved_delta(from: ContentStatus, to: ContentStatus) -> i64 {
    let approved = |s: ContentStatus| i64::from(s == ContentStatus::Approved);
    approved(to) - approved(from)
}

/// Classifier plus thresholds, applied to freshly written content.
#[derive(Clone)]
pub struct ModerationPipeline {
    classifier: Arc<dyn ContentClassifier>,
    policy: ModerationPolicy,
}

impl ModerationPipeline {
    pub fn new(classifier: Arc<dyn ContentClassifier>, policy: ModerationPolicy) -> Self {
        Self { classifier, policy }
    }

    /// Classifies `text` and settles the pending target.
    ///
    /// Returns the new status, or `None` when the classifier failed and the
    /// content stays pending for the queue worker.
    pub async fn moderate(
        &self,
        pool: &PgPool,
        target_type: TargetType,
        target_id: i64,
        text: &str,
    ) -> AppResult<Option<ContentStatus>> {
        let (decision, scores) = if !self.classifier.enabled() {
            let decision = ModerationDecision {
                status: ContentStatus::Approved,
                reason: DISABLED_REASON.to_string(),
            };
            (decision, None)
        } else {
            match self.classifier.classify(text).await {
                Ok(result) => {
                    let scores = serde_json::to_value(&result.category_scores).ok();
                    (self.policy.decide(&result), scores)
                }
                Err(e) => {
                    warn!(
                        target_type = %target_type,
                        target_id,
                        classifier = self.classifier.name(),
                        error = %e,
                        "classification failed, leaving content pending"
                    );
                    return Ok(None);
                }
            }
        };

        let mut tx = pool.begin().await?;
        let changed = transition(
            &mut tx,
            target_type,
            target_id,
            decision.status,
            Some(ContentStatus::Pending),
        )
        .await?;
        if changed.is_none() {
            tx.rollback().await?;
            debug!(target_type = %target_type, target_id, "already reviewed, skipping");
            return Ok(None);
        }
        log_action(
            &mut *tx,
            LogEntry {
                target_type,
                target_id,
                action: decision.status.as_str(),
                moderator_id: None,
                automated: true,
                reason: Some(&decision.reason),
                scores,
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            target_type = %target_type,
            target_id,
            status = %decision.status,
            "content moderated"
        );
        Ok(Some(decision.status))
    }
}

/// A pending topic or comment awaiting classification.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingItem {
    #[sqlx(try_from = "String")]
    pub target_type: TargetType,
    pub id: i64,
    pub text: String,
}

/// Oldest pending items first, skipping anything younger than `min_age_secs`.
pub async fn pending_batch(pool: &PgPool, limit: i64, min_age_secs: i64) -> AppResult<Vec<PendingItem>> {
    Ok(sqlx::query_as::<_, PendingItem>(
        "SELECT target_type, id, text FROM (
            SELECT 'topic' AS target_type, id, title || E'\\n\\n' || body AS text, created_at
            FROM topics WHERE status = 'pending'
            UNION ALL
            SELECT 'comment' AS target_type, id, body AS text, created_at
            FROM comments WHERE status = 'pending'
         ) pending
         WHERE created_at < now() - make_interval(secs => $2)
         ORDER BY created_at
         LIMIT $1",
    )
    .bind(limit)
    .bind(min_age_secs as f64)
    .fetch_all(pool)
    .await?)
}

#[derive(Debug, Serialize)]
pub struct ModerationQueue {
    pub topics: Vec<Topic>,
    pub comments: Vec<Comment>,
    pub uploads: Vec<Upload>,
}

pub async fn queue(pool: &PgPool, limit: i64) -> AppResult<ModerationQueue> {
    let topics = sqlx::query_as::<_, Topic>(&format!(
        "SELECT {} FROM topics WHERE status IN ('pending', 'flagged') ORDER BY created_at LIMIT $1",
        crate::app::forum::TOPIC_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {} FROM comments WHERE status IN ('pending', 'flagged') ORDER BY created_at LIMIT $1",
        crate::app::forum::COMMENT_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    let uploads = uploads::list_quarantined(pool, limit).await?;
    Ok(ModerationQueue {
        topics,
        comments,
        uploads,
    })
}

fn status_for(action: ModerationAction) -> ContentStatus {
    match action {
        ModerationAction::Approve | ModerationAction::Restore => ContentStatus::Approved,
        ModerationAction::Reject => ContentStatus::Rejected,
        ModerationAction::Remove => ContentStatus::Removed,
    }
}

/// A moderator's decision on a topic, comment or upload.
pub async fn apply_manual(
    pool: &PgPool,
    storage: &FileStorage,
    actor: Actor,
    target_type: TargetType,
    target_id: i64,
    action: ModerationAction,
    reason: Option<&str>,
) -> AppResult<()> {
    match target_type {
        TargetType::Topic | TargetType::Comment => {
            let mut tx = pool.begin().await?;
            transition(&mut tx, target_type, target_id, status_for(action), None).await?;
            log_action(
                &mut *tx,
                LogEntry {
                    target_type,
                    target_id,
                    action: action.as_str(),
                    moderator_id: Some(actor.id),
                    automated: false,
                    reason,
                    scores: None,
                },
            )
            .await?;
            tx.commit().await?;
        }
        TargetType::Upload => match action {
            ModerationAction::Approve => {
                uploads::review(pool, storage, actor, target_id, true, reason).await?;
            }
            ModerationAction::Reject | ModerationAction::Remove => {
                uploads::review(pool, storage, actor, target_id, false, reason).await?;
            }
            ModerationAction::Restore => {
                return Err(AppError::validation("rejected uploads cannot be restored"));
            }
        },
        TargetType::User => {
            return Err(AppError::validation("use the ban endpoints for users"));
        }
    }
    info!(actor = actor.id, target_type = %target_type, target_id, action = %action, "moderation action applied");
    Ok(())
}

pub async fn list_logs(
    pool: &PgPool,
    target_type: Option<TargetType>,
    target_id: Option<i64>,
    limit: i64,
) -> AppResult<Vec<ModerationLog>> {
    let sql = format!(
        "SELECT {LOG_COLUMNS} FROM moderation_logs
         WHERE ($1::text IS NULL OR target_type = $1)
           AND ($2::bigint IS NULL OR target_id = $2)
         ORDER BY created_at DESC, id DESC
         LIMIT $3"
    );
    Ok(sqlx::query_as::<_, ModerationLog>(&sql)
        .bind(target_type.map(|t| t.as_str()))
        .bind(target_id)
        .bind(limit)
        .fetch_all(pool)
        .await?)
}
