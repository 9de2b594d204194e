use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity cache keyed by the platform-assigned user id. Refreshed on every
/// filed complaint, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub onboarded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
