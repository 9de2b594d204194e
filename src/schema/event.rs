use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only audit trail. Rows are written inside the same transaction as
/// the state change they describe.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub trace_id: Option<String>,
    pub source: String,
    pub action: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
