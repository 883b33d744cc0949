use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

text_enum! {
    pub enum TargetType {
        Topic => "topic",
        Comment => "comment",
        Upload => "upload",
        User => "user",
    }
}

text_enum! {
    /// Manual actions a moderator can take on a piece of content.
    pub enum ModerationAction {
        Approve => "approve",
        Reject => "reject",
        Remove => "remove",
        Restore => "restore",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModerationLog {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub target_type: TargetType,
    pub target_id: i64,
    pub action: String,
    pub moderator_id: Option<i64>,
    pub automated: bool,
    pub reason: Option<String>,
    pub scores: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}
