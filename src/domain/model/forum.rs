use chrono::{DateTime, Utc};
use serde::Serialize;

text_enum! {
    /// Review state shared by topics and comments.
    pub enum ContentStatus {
        Pending => "pending",
        Approved => "approved",
        Flagged => "flagged",
        Rejected => "rejected",
        Removed => "removed",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Topic {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub status: ContentStatus,
    pub locked: bool,
    pub pinned: bool,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub topic_id: i64,
    pub author_id: i64,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub status: ContentStatus,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}
