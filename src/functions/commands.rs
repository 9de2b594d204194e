//! Staff channel commands and citizen listings: aggregate statistics, the
//! full-archive export snapshot, and the short history views. All of it is
//! read-only over the store.

use crate::schema::{Category, Complaint, Status};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total: i64,
    pub new: i64,
    pub answered: i64,
    pub today: i64,
    pub last_week: i64,
    pub by_category: Vec<(Category, i64)>,
}

/// One archived complaint as it appears in an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintExport {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    pub category: Category,
    pub body: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub responses: Vec<String>,
}

pub async fn aggregate_stats(
    db: &SqlitePool,
    tz: Tz,
    now: DateTime<Utc>,
) -> sqlx::Result<AggregateStats> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints")
        .fetch_one(db)
        .await?;
    let new: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints WHERE status = 'new'")
        .fetch_one(db)
        .await?;

    let (day_start, _) = crate::functions::quota::day_bounds(tz, now);
    let today: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints WHERE created_at >= ?1")
        .bind(day_start)
        .fetch_one(db)
        .await?;
    let last_week: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM complaints WHERE created_at >= ?1")
            .bind(now - chrono::Duration::days(7))
            .fetch_one(db)
            .await?;

    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT category, COUNT(*) FROM complaints GROUP BY category ORDER BY COUNT(*) DESC",
    )
    .fetch_all(db)
    .await?;

    let by_category = rows
        .into_iter()
        .filter_map(|(slug, count)| Category::from_slug(&slug).map(|c| (c, count)))
        .collect();

    Ok(AggregateStats {
        total,
        new,
        answered: total - new,
        today,
        last_week,
        by_category,
    })
}

pub fn format_statistics(stats: &AggregateStats) -> String {
    let mut text = format!(
        "STATISTICS\nTotal: {}\nAwaiting answer: {}\nAnswered: {}\nToday: {}\nLast 7 days: {}\n",
        stats.total, stats.new, stats.answered, stats.today, stats.last_week,
    );
    for (category, count) in &stats.by_category {
        text.push_str(&format!("\n{}: {}", category.label(), count));
    }
    text
}

/// Everything the export file carries: summary stats plus the archive, newest
/// first, each complaint joined with its full response history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub generated_at: DateTime<Utc>,
    pub stats: AggregateStats,
    pub complaints: Vec<ComplaintExport>,
}

pub async fn snapshot(db: &SqlitePool, tz: Tz, now: DateTime<Utc>) -> sqlx::Result<ReportSnapshot> {
    let stats = aggregate_stats(db, tz, now).await?;
    let complaints = crate::store::all_complaints(db).await?;
    let mut export = Vec::with_capacity(complaints.len());
    for complaint in complaints {
        let responses = crate::store::responses_for_complaint(db, complaint.id).await?;
        export.push(ComplaintExport {
            id: complaint.id,
            user_id: complaint.user_id,
            name: complaint.name,
            national_id: complaint.national_id,
            phone: complaint.phone,
            address: complaint.address,
            category: complaint.category,
            body: complaint.body,
            status: complaint.status,
            created_at: complaint.created_at,
            answered_at: complaint.answered_at,
            responses: responses.into_iter().map(|r| r.body).collect(),
        });
    }
    Ok(ReportSnapshot {
        generated_at: now,
        stats,
        complaints: export,
    })
}

const MY_COMPLAINTS_LIMIT: i64 = 10;
const ANSWER_SNIPPET_CHARS: usize = 80;

/// The citizen's own history. Registration through /start is required first;
/// answered entries carry the beginning of the latest answer.
pub async fn my_complaints(db: &SqlitePool, user_id: i64, tz: Tz) -> sqlx::Result<String> {
    if crate::store::user_by_id(db, user_id).await?.is_none() {
        return Ok("You are not registered yet. Use /start first.".to_string());
    }
    let complaints = crate::store::complaints_for_user(db, user_id, MY_COMPLAINTS_LIMIT).await?;
    if complaints.is_empty() {
        return Ok("YOUR COMPLAINTS\nNothing on record.".to_string());
    }
    let mut text = String::from("YOUR COMPLAINTS");
    for complaint in &complaints {
        text.push_str(&entry_line(complaint, tz));
        if complaint.status == Status::Answered {
            if let Some(answer) = crate::store::latest_response(db, complaint.id).await? {
                text.push_str(&format!("\n    answer: {}", snippet(&answer.body)));
            }
        }
    }
    Ok(text)
}

fn snippet(body: &str) -> String {
    if body.chars().count() <= ANSWER_SNIPPET_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(ANSWER_SNIPPET_CHARS).collect();
        format!("{cut}...")
    }
}

const DEBUG_LIMIT: i64 = 5;

/// Staff diagnostic: the latest complaints plus the tail of the audit trail.
pub async fn recent_overview(db: &SqlitePool, tz: Tz) -> sqlx::Result<String> {
    let complaints = crate::store::recent_complaints(db, DEBUG_LIMIT).await?;
    let mut text = String::from("LATEST COMPLAINTS");
    if complaints.is_empty() {
        text.push_str("\nNothing on record.");
    }
    for complaint in &complaints {
        text.push_str(&entry_line(complaint, tz));
    }

    let events = crate::store::recent_events(db, DEBUG_LIMIT).await?;
    text.push_str("\n\nAUDIT TRAIL");
    if events.is_empty() {
        text.push_str("\nEmpty.");
    }
    for event in &events {
        text.push_str(&format!(
            "\n{} {}/{} {}",
            event.created_at.with_timezone(&tz).format("%m-%d %H:%M"),
            event.source,
            event.action,
            event.trace_id.as_deref().unwrap_or("-"),
        ));
    }
    Ok(text)
}

fn entry_line(complaint: &Complaint, tz: Tz) -> String {
    let state = match complaint.status {
        Status::New => "awaiting answer",
        Status::Answered => "answered",
    };
    format!(
        "\n#{} | {} | {} | {}",
        complaint.id,
        complaint.category.label(),
        complaint.created_at.with_timezone(&tz).format("%Y-%m-%d"),
        state,
    )
}
