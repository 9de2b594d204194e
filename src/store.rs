use crate::schema::{Complaint, ComplaintDraft, Event, Response, Status, User};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection};

/// Schema for the structured store. `correlation_key` carries a UNIQUE index:
/// it is the basis of reply lookup and a collision would misroute a reply.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    name TEXT,
    phone TEXT,
    onboarded INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS complaints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    national_id TEXT NOT NULL,
    phone TEXT NOT NULL,
    address TEXT NOT NULL,
    category TEXT NOT NULL,
    body TEXT NOT NULL,
    image_ref TEXT,
    status TEXT NOT NULL DEFAULT 'new',
    created_at TEXT NOT NULL,
    answered_at TEXT,
    correlation_key INTEGER UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_complaints_user_created
    ON complaints (user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_complaints_status_created
    ON complaints (status, created_at);

CREATE TABLE IF NOT EXISTS responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    complaint_id INTEGER NOT NULL,
    responder_id INTEGER NOT NULL,
    responder_label TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_responses_complaint
    ON responses (complaint_id, created_at);

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    trace_id TEXT,
    source TEXT NOT NULL,
    action TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);
"#;

const COMPLAINT_COLUMNS: &str = "id, user_id, name, national_id, phone, address, category, \
     body, image_ref, status, created_at, answered_at, correlation_key";

pub async fn connect(path: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    init(&pool).await?;
    Ok(pool)
}

pub async fn init(db: &SqlitePool) -> anyhow::Result<()> {
    let mut conn = db.acquire().await?;
    sqlx::raw_sql(SCHEMA).execute(&mut *conn).await?;
    Ok(())
}

pub async fn record_event(
    conn: &mut SqliteConnection,
    trace_id: Option<&str>,
    source: &str,
    action: &str,
    payload: serde_json::Value,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO events (trace_id, source, action, payload, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(trace_id)
    .bind(source)
    .bind(action)
    .bind(payload.to_string())
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Upsert keeps the original `created_at` and the onboarded flag; only the
/// last-known display name and phone are refreshed.
pub async fn upsert_user(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: Option<&str>,
    phone: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO users (id, name, phone, onboarded, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 0, ?4, ?4) \
         ON CONFLICT(id) DO UPDATE SET \
             name = COALESCE(excluded.name, users.name), \
             phone = COALESCE(excluded.phone, users.phone), \
             updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(name)
    .bind(phone)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Sets the onboarding-notice flag, creating or refreshing the user row in the
/// same transaction. Returns whether the notice had already been shown before.
pub async fn mark_onboarded(
    db: &SqlitePool,
    user_id: i64,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> sqlx::Result<bool> {
    let mut conn = db.acquire().await?;
    let mut tx = conn.begin().await?;
    let already: Option<bool> = sqlx::query_scalar("SELECT onboarded FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
    upsert_user(&mut tx, user_id, name, None, now).await?;
    sqlx::query("UPDATE users SET onboarded = 1, updated_at = ?2 WHERE id = ?1")
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(already.unwrap_or(false))
}

pub async fn user_by_id(db: &SqlitePool, user_id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as(
        "SELECT id, name, phone, onboarded, created_at, updated_at FROM users WHERE id = ?1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Persists a delivered complaint: user upsert, complaint insert and audit
/// event are one transaction so a user row and its complaint never appear
/// partially applied.
pub async fn insert_complaint(
    db: &SqlitePool,
    draft: &ComplaintDraft,
    correlation_key: i64,
    trace_id: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let mut conn = db.acquire().await?;
    let mut tx = conn.begin().await?;

    upsert_user(&mut tx, draft.user_id, Some(&draft.name), Some(&draft.phone), now).await?;

    let result = sqlx::query(
        "INSERT INTO complaints \
             (user_id, name, national_id, phone, address, category, body, image_ref, \
              status, created_at, correlation_key) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(draft.user_id)
    .bind(&draft.name)
    .bind(&draft.national_id)
    .bind(&draft.phone)
    .bind(&draft.address)
    .bind(draft.category)
    .bind(&draft.body)
    .bind(&draft.image_ref)
    .bind(Status::New)
    .bind(now)
    .bind(correlation_key)
    .execute(&mut *tx)
    .await?;
    let complaint_id = result.last_insert_rowid();

    record_event(
        &mut tx,
        Some(trace_id),
        "routing",
        "complaint_created",
        serde_json::json!({
            "complaint_id": complaint_id,
            "user_id": draft.user_id,
            "category": draft.category.slug(),
            "correlation_key": correlation_key,
        }),
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(complaint_id)
}

pub async fn complaint_by_correlation(
    db: &SqlitePool,
    correlation_key: i64,
) -> sqlx::Result<Option<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE correlation_key = ?1"
    ))
    .bind(correlation_key)
    .fetch_optional(db)
    .await
}

pub async fn complaint_by_id(db: &SqlitePool, id: i64) -> sqlx::Result<Option<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

pub struct AppendedResponse {
    pub response_id: i64,
    /// True when this reply moved the complaint New -> Answered; false when it
    /// was already answered and only the response row was added.
    pub status_flipped: bool,
}

/// Response append and status transition are one transaction. The UPDATE is
/// guarded on `status = 'new'` so resolution stays idempotent on status.
pub async fn append_response(
    db: &SqlitePool,
    complaint_id: i64,
    responder_id: i64,
    responder_label: &str,
    body: &str,
    trace_id: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<AppendedResponse> {
    let mut conn = db.acquire().await?;
    let mut tx = conn.begin().await?;

    let result = sqlx::query(
        "INSERT INTO responses (complaint_id, responder_id, responder_label, body, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(complaint_id)
    .bind(responder_id)
    .bind(responder_label)
    .bind(body)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    let response_id = result.last_insert_rowid();

    let updated = sqlx::query(
        "UPDATE complaints SET status = ?1, answered_at = ?2 WHERE id = ?3 AND status = ?4",
    )
    .bind(Status::Answered)
    .bind(now)
    .bind(complaint_id)
    .bind(Status::New)
    .execute(&mut *tx)
    .await?;
    let status_flipped = updated.rows_affected() > 0;

    record_event(
        &mut tx,
        Some(trace_id),
        "resolve",
        "response_appended",
        serde_json::json!({
            "complaint_id": complaint_id,
            "response_id": response_id,
            "responder_id": responder_id,
            "status_flipped": status_flipped,
        }),
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(AppendedResponse {
        response_id,
        status_flipped,
    })
}

pub async fn count_complaints_between(
    db: &SqlitePool,
    user_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM complaints \
         WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_one(db)
    .await
}

/// `new` complaints created before the cutoff, oldest first.
pub async fn stale_new_complaints(
    db: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> sqlx::Result<Vec<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints \
         WHERE status = ?1 AND created_at < ?2 \
         ORDER BY created_at, id"
    ))
    .bind(Status::New)
    .bind(cutoff)
    .fetch_all(db)
    .await
}

pub async fn complaints_for_user(
    db: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> sqlx::Result<Vec<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints \
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn recent_complaints(db: &SqlitePool, limit: i64) -> sqlx::Result<Vec<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints ORDER BY id DESC LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn all_complaints(db: &SqlitePool) -> sqlx::Result<Vec<Complaint>> {
    sqlx::query_as(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(db)
    .await
}

pub async fn recent_events(db: &SqlitePool, limit: i64) -> sqlx::Result<Vec<Event>> {
    sqlx::query_as(
        "SELECT id, trace_id, source, action, payload, created_at \
         FROM events ORDER BY id DESC LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn responses_for_complaint(
    db: &SqlitePool,
    complaint_id: i64,
) -> sqlx::Result<Vec<Response>> {
    sqlx::query_as(
        "SELECT id, complaint_id, responder_id, responder_label, body, created_at \
         FROM responses WHERE complaint_id = ?1 ORDER BY created_at, id",
    )
    .bind(complaint_id)
    .fetch_all(db)
    .await
}

pub async fn latest_response(
    db: &SqlitePool,
    complaint_id: i64,
) -> sqlx::Result<Option<Response>> {
    sqlx::query_as(
        "SELECT id, complaint_id, responder_id, responder_label, body, created_at \
         FROM responses WHERE complaint_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
    )
    .bind(complaint_id)
    .fetch_optional(db)
    .await
}
