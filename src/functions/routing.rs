//! Routing & correlation. A finished draft is delivered to its category's
//! staff channel first; only a confirmed delivery is persisted, with the
//! returned message id as the complaint's correlation key. A complaint must
//! never exist without a correlation key, and a delivered notice must never
//! go unpersisted silently, otherwise replies become unroutable or orphaned.

use crate::config::Config;
use crate::error::DeliverError;
use crate::schema::ComplaintDraft;
use crate::services::gateway::{MessagingGateway, deliver_with_timeout};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub complaint_id: i64,
    pub correlation_key: i64,
    pub channel_id: i64,
}

#[derive(Debug, Error)]
pub enum RouteError {
    /// Nothing was persisted; the submitter may retry the whole submission.
    #[error("could not deliver the notice: {0}")]
    Delivery(#[from] DeliverError),

    /// The notice went out but the store rejected the insert. The delivered
    /// message id is kept in the message so the orphan stays findable.
    #[error("complaint not persisted after delivery of message {correlation_key}: {source}")]
    Store {
        correlation_key: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// The notice staff see in the channel. Replying to it answers the citizen.
pub fn format_notice(draft: &ComplaintDraft, now: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "NEW COMPLAINT\n\
         Name: {}\n\
         National id: {}\n\
         Phone: {}\n\
         Address: {}\n\
         Category: {}\n\n\
         {}\n\n\
         Date: {}\n\
         User id: {}\n\
         Reply to this message to answer the citizen.",
        draft.name,
        draft.national_id,
        draft.phone,
        draft.address,
        draft.category.label(),
        draft.body,
        now.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        draft.user_id,
    )
}

/// Attachment image if present, else the configured placeholder if it exists
/// on disk, else plain text.
fn notice_image<'a>(draft: &'a ComplaintDraft, config: &'a Config) -> Option<&'a str> {
    if let Some(image) = draft.image_ref.as_deref() {
        return Some(image);
    }
    config
        .placeholder_image
        .as_deref()
        .filter(|path| std::path::Path::new(path).exists())
}

pub async fn route(
    db: &SqlitePool,
    gateway: &dyn MessagingGateway,
    config: &Config,
    draft: &ComplaintDraft,
    now: DateTime<Utc>,
) -> Result<Routed, RouteError> {
    let channel_id = config.channel_for(draft.category);
    let trace_id = Uuid::new_v4().to_string();
    let notice = format_notice(draft, now, config.timezone);

    let correlation_key = deliver_with_timeout(
        gateway,
        config.gateway_timeout,
        channel_id,
        &notice,
        notice_image(draft, config),
    )
    .await
    .inspect_err(|error| {
        tracing::warn!(
            user_id = draft.user_id,
            channel_id,
            trace_id,
            %error,
            "routing: notice delivery failed, nothing persisted"
        );
    })?;

    let complaint_id = store_delivered(db, draft, correlation_key, &trace_id, now).await?;

    tracing::info!(
        complaint_id,
        correlation_key,
        channel_id,
        category = draft.category.slug(),
        trace_id,
        "routing: complaint persisted"
    );

    Ok(Routed {
        complaint_id,
        correlation_key,
        channel_id,
    })
}

async fn store_delivered(
    db: &SqlitePool,
    draft: &ComplaintDraft,
    correlation_key: i64,
    trace_id: &str,
    now: DateTime<Utc>,
) -> Result<i64, RouteError> {
    crate::store::insert_complaint(db, draft, correlation_key, trace_id, now)
        .await
        .map_err(|source| {
            // the delivered notice is now an orphan; this must be loud
            tracing::error!(
                user_id = draft.user_id,
                correlation_key,
                trace_id,
                error = %source,
                "routing: delivery succeeded but persistence failed, replies to this notice will not resolve"
            );
            RouteError::Store {
                correlation_key,
                source,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::config;
    use crate::schema::{Category, Status};
    use crate::services::gateway::testing::RecordingGateway;
    use crate::store::testing;

    #[tokio::test]
    async fn routes_to_the_category_channel_and_persists_the_receipt() {
        let db = testing::memory().await;
        let gateway = RecordingGateway::new();
        let config = config();
        let draft = testing::draft(42);

        let routed = route(&db, &gateway, &config, &draft, Utc::now())
            .await
            .unwrap();

        let sent = gateway.last_delivered().unwrap();
        assert_eq!(sent.channel_id, -2001, "health maps to the health channel");
        assert_eq!(routed.channel_id, -2001);
        assert_eq!(routed.correlation_key, sent.message_id);
        assert!(sent.text.contains("Ali Valiyev"));
        assert!(sent.text.contains("My water pipe is broken for two weeks"));

        let stored = crate::store::complaint_by_correlation(&db, sent.message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, routed.complaint_id);
        assert_eq!(stored.status, Status::New);
        assert_eq!(stored.category, Category::Health);
        assert_eq!(stored.user_id, 42);
    }

    #[tokio::test]
    async fn unmapped_category_falls_back_to_the_default_channel() {
        let db = testing::memory().await;
        let gateway = RecordingGateway::new();
        let config = config();
        let mut draft = testing::draft(42);
        draft.category = Category::Transport;

        let routed = route(&db, &gateway, &config, &draft, Utc::now())
            .await
            .unwrap();
        assert_eq!(routed.channel_id, config.default_channel);
    }

    #[tokio::test]
    async fn delivery_failure_persists_nothing() {
        let db = testing::memory().await;
        let gateway = RecordingGateway::new();
        gateway.fail_deliveries(DeliverError::Transport("connection reset".to_string()));
        let config = config();

        let result = route(&db, &gateway, &config, &testing::draft(42), Utc::now()).await;
        assert!(matches!(result, Err(RouteError::Delivery(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM complaints")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 0);
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(users, 0);
    }

    #[tokio::test]
    async fn two_routes_never_share_a_correlation_key() {
        let db = testing::memory().await;
        let gateway = RecordingGateway::new();
        let config = config();

        let first = route(&db, &gateway, &config, &testing::draft(1), Utc::now())
            .await
            .unwrap();
        let second = route(&db, &gateway, &config, &testing::draft(2), Utc::now())
            .await
            .unwrap();
        assert_ne!(first.correlation_key, second.correlation_key);
    }

    #[tokio::test]
    async fn attachment_is_forwarded_with_the_notice() {
        let db = testing::memory().await;
        let gateway = RecordingGateway::new();
        let config = config();
        let mut draft = testing::draft(42);
        draft.image_ref = Some("media/42_1.jpg".to_string());

        route(&db, &gateway, &config, &draft, Utc::now())
            .await
            .unwrap();
        let sent = gateway.last_delivered().unwrap();
        assert_eq!(sent.image.as_deref(), Some("media/42_1.jpg"));
    }

    #[test]
    fn notice_renders_local_time() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 8, 28, 5, 0, 0).unwrap();
        let notice = format_notice(&testing::draft(42), now, chrono_tz::Asia::Tashkent);
        assert!(notice.contains("2026-08-28 10:00"), "{notice}");
        assert!(notice.contains("User id: 42"));
    }
}
