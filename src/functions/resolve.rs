//! Staff reply resolution. A channel reply to a routed notice is matched back
//! to its complaint through the correlation key, appended as a response, and
//! forwarded to the citizen. The append and the status flip commit before the
//! outbound notification, so a citizen we cannot reach still has an answered
//! complaint on record.

use crate::config::Config;
use crate::error::NotifyError;
use crate::schema::Complaint;
use crate::services::gateway::{MessagingGateway, notify_with_timeout};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Replies shorter than this are treated as accidental noise, not answers.
pub const MIN_REPLY_CHARS: usize = 3;

/// A channel reply as the gateway saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundReply {
    pub channel_id: i64,
    /// Message id the staff member replied to.
    pub replied_to: i64,
    pub body: String,
    pub responder_id: i64,
    pub responder_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved {
        complaint_id: i64,
        user_id: i64,
        notification: NotificationStatus,
    },
    /// The reply body was too short to count as an answer.
    TooShort,
    /// The replied-to message is not a routed notice; ignore silently.
    NoMatch,
    /// The complaint resolves to the service account itself; the reply is
    /// recorded but no notification is attempted.
    IntegrityFault { complaint_id: i64, user_id: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationStatus {
    Delivered,
    /// Recorded and resolved, but the citizen could not be reached.
    Failed(NotifyError),
}

/// What the citizen receives when staff answer.
pub fn format_answer(complaint: &Complaint, reply: &str) -> String {
    format!(
        "Your complaint #{} ({}) has been answered:\n\n{}",
        complaint.id,
        complaint.category.label(),
        reply,
    )
}

pub async fn resolve(
    db: &SqlitePool,
    gateway: &dyn MessagingGateway,
    config: &Config,
    reply: &InboundReply,
    now: DateTime<Utc>,
) -> anyhow::Result<ResolveOutcome> {
    let body = reply.body.trim();
    if body.chars().count() < MIN_REPLY_CHARS {
        return Ok(ResolveOutcome::TooShort);
    }

    let Some(complaint) = crate::store::complaint_by_correlation(db, reply.replied_to).await?
    else {
        tracing::debug!(
            channel_id = reply.channel_id,
            replied_to = reply.replied_to,
            "resolve: reply does not correlate to a complaint"
        );
        return Ok(ResolveOutcome::NoMatch);
    };

    let trace_id = Uuid::new_v4().to_string();
    let appended = crate::store::append_response(
        db,
        complaint.id,
        reply.responder_id,
        &reply.responder_label,
        body,
        &trace_id,
        now,
    )
    .await?;

    tracing::info!(
        complaint_id = complaint.id,
        response_id = appended.response_id,
        responder_id = reply.responder_id,
        status_flipped = appended.status_flipped,
        trace_id,
        "resolve: response recorded"
    );

    // never message the service account about its own complaints
    if complaint.user_id == config.bot_user_id {
        tracing::warn!(
            complaint_id = complaint.id,
            user_id = complaint.user_id,
            trace_id,
            "resolve: complaint belongs to the service account, notification skipped"
        );
        return Ok(ResolveOutcome::IntegrityFault {
            complaint_id: complaint.id,
            user_id: complaint.user_id,
        });
    }

    let answer = format_answer(&complaint, body);
    let notification = match notify_with_timeout(
        gateway,
        config.gateway_timeout,
        complaint.user_id,
        &answer,
    )
    .await
    {
        Ok(()) => NotificationStatus::Delivered,
        Err(error) => {
            // transports surface raw platform messages as Other; classify them
            // here so the staff channel sees "blocked" instead of a raw string
            let error = match error {
                NotifyError::Other(raw) => NotifyError::classify(&raw),
                classified => classified,
            };
            tracing::warn!(
                complaint_id = complaint.id,
                user_id = complaint.user_id,
                %error,
                trace_id,
                "resolve: citizen notification failed"
            );
            NotificationStatus::Failed(error)
        }
    };

    Ok(ResolveOutcome::Resolved {
        complaint_id: complaint.id,
        user_id: complaint.user_id,
        notification,
    })
}
