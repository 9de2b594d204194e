use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One staff reply to one complaint. Append-only; later replies are additional
/// rows, not edits.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Response {
    pub id: i64,
    pub complaint_id: i64,
    pub responder_id: i64,
    pub responder_label: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
