use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complaint categories form a closed set; intake only accepts an explicit
/// selection, so every stored complaint maps onto the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    GovernmentServices,
    Health,
    Education,
    Transport,
    Utilities,
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::GovernmentServices,
        Category::Health,
        Category::Education,
        Category::Transport,
        Category::Utilities,
        Category::Other,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Category::GovernmentServices => "government_services",
            Category::Health => "health",
            Category::Education => "education",
            Category::Transport => "transport",
            Category::Utilities => "utilities",
            Category::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::GovernmentServices => "Government services",
            Category::Health => "Health",
            Category::Education => "Education",
            Category::Transport => "Transport",
            Category::Utilities => "Utilities",
            Category::Other => "Other",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.slug() == slug)
    }
}

/// Status only ever moves New -> Answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    New,
    Answered,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Complaint {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    pub category: Category,
    pub body: String,
    pub image_ref: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    /// Message id of the staff-channel notice, assigned by the gateway.
    /// Unique across all complaints; a reply is resolved through it.
    pub correlation_key: Option<i64>,
}

/// Fully validated intake output, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintDraft {
    pub user_id: i64,
    pub name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    pub category: Category,
    pub body: String,
    pub image_ref: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_round_trips_for_every_category() {
        for category in Category::ALL {
            assert_eq!(Category::from_slug(category.slug()), Some(category));
        }
    }

    #[test]
    fn rejects_unknown_slug() {
        assert_eq!(Category::from_slug("weather"), None);
        assert_eq!(Category::from_slug(""), None);
    }
}
