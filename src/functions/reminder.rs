//! Reminder sweep. Periodically finds complaints that stayed unanswered past
//! the age threshold and posts a digest to each affected staff channel. The
//! sweep is read-only: it never mutates complaint state, so the same entry
//! keeps appearing until staff actually answer it.

use crate::config::Config;
use crate::schema::Complaint;
use crate::services::gateway::{MessagingGateway, deliver_with_timeout};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// At most this many entries are itemized per digest; the rest are summarized
/// by the total line.
const DIGEST_MAX_ENTRIES: usize = 10;

pub fn format_digest(stale: &[Complaint], age_threshold_days: i64, now: DateTime<Utc>) -> String {
    let mut digest = format!(
        "REMINDER: {} complaint(s) unanswered for over {} days\n",
        stale.len(),
        age_threshold_days,
    );
    for complaint in stale.iter().take(DIGEST_MAX_ENTRIES) {
        let age_days = (now - complaint.created_at).num_days();
        digest.push_str(&format!(
            "\n#{} | {} | {} | {} day(s) old",
            complaint.id,
            complaint.category.label(),
            complaint.name,
            age_days,
        ));
    }
    if stale.len() > DIGEST_MAX_ENTRIES {
        digest.push_str(&format!(
            "\n...and {} more",
            stale.len() - DIGEST_MAX_ENTRIES
        ));
    }
    digest
}

/// One pass: collect stale complaints, group them by their routing channel and
/// deliver a digest per channel. Returns the number of stale complaints found.
/// A failed digest delivery is logged and skipped; the next sweep retries.
pub async fn sweep(
    db: &SqlitePool,
    gateway: &dyn MessagingGateway,
    config: &Config,
    now: DateTime<Utc>,
) -> anyhow::Result<u32> {
    let cutoff = now - Duration::days(config.reminder_days);
    let stale = crate::store::stale_new_complaints(db, cutoff).await?;
    if stale.is_empty() {
        tracing::debug!("reminder: nothing stale");
        return Ok(0);
    }

    let mut by_channel: BTreeMap<i64, Vec<Complaint>> = BTreeMap::new();
    for complaint in stale {
        by_channel
            .entry(config.channel_for(complaint.category))
            .or_default()
            .push(complaint);
    }

    let mut total = 0u32;
    for (channel_id, complaints) in &by_channel {
        total += complaints.len() as u32;
        let digest = format_digest(complaints, config.reminder_days, now);
        match deliver_with_timeout(gateway, config.gateway_timeout, *channel_id, &digest, None)
            .await
        {
            Ok(message_id) => {
                tracing::info!(
                    channel_id,
                    message_id,
                    stale = complaints.len(),
                    "reminder: digest delivered"
                );
            }
            Err(error) => {
                tracing::warn!(channel_id, %error, "reminder: digest delivery failed");
            }
        }
    }

    tracing::info!(total, channels = by_channel.len(), "reminder: sweep done");
    Ok(total)
}
