use chrono::{DateTime, Utc};
use serde::Serialize;

text_enum! {
    pub enum UploadStatus {
        Quarantined => "quarantined",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Upload {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_key: String,
    #[sqlx(try_from = "String")]
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}
