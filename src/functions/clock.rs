//! Scheduling for the reminder sweep. The schedule is a cron expression
//! evaluated in the configured timezone; the daemon sleeps in short slices so
//! shutdown stays responsive and clock adjustments are picked up.

use crate::config::Config;
use crate::services::gateway::MessagingGateway;
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

// the `cron` crate requires 6-field (second-granularity) expressions,
// so we prepend "0" to standard 5-field minute-granularity inputs
fn normalize_schedule(schedule: &str) -> String {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let normalized = fields.join(" ");
    if fields.len() == 5 {
        format!("0 {normalized}")
    } else {
        normalized
    }
}

pub fn compute_next_run_at(
    schedule: &str,
    tz: Tz,
    from: DateTime<Utc>,
) -> anyhow::Result<DateTime<Utc>> {
    let normalized = normalize_schedule(schedule);
    let parsed = cron::Schedule::from_str(&normalized)
        .with_context(|| format!("invalid cron expression `{normalized}`"))?;

    let from_local = from.with_timezone(&tz);
    let next_local = parsed
        .after(&from_local)
        .next()
        .with_context(|| format!("cron expression `{normalized}` never fires"))?;
    Ok(next_local.with_timezone(&Utc))
}

const POLL_SLICE_MS: u64 = 1000;

pub async fn clock(
    db: SqlitePool,
    gateway: Arc<dyn MessagingGateway>,
    config: Arc<Config>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut next_run = compute_next_run_at(&config.reminder_schedule, config.timezone, Utc::now())?;
    tracing::info!(schedule = config.reminder_schedule, %next_run, "clock started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(std::time::Duration::from_millis(POLL_SLICE_MS)) => {
                let now = Utc::now();
                if now < next_run {
                    continue;
                }
                match crate::functions::reminder::sweep(&db, gateway.as_ref(), &config, now).await {
                    Ok(n) if n > 0 => tracing::info!(stale = n, "clock: reminder sweep"),
                    Err(e) => tracing::error!(error = %e, "clock: reminder sweep failed"),
                    _ => {}
                }
                next_run = compute_next_run_at(&config.reminder_schedule, config.timezone, now)?;
                tracing::debug!(%next_run, "clock rescheduled");
            }
        }
    }
    Ok(())
}
