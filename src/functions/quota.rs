//! Per-user daily submission limiter. Counts are read from the store at
//! admission time; the later complaint insert is a separate transaction, so
//! two near-simultaneous submissions around the boundary can exceed the limit
//! by one. The quota is a soft limit.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;

use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// A normal, user-visible outcome, not an error.
    Denied { used: i64, limit: i64 },
}

/// The calendar day containing `now` in the system timezone, as a UTC
/// half-open interval.
pub fn day_bounds(tz: Tz, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = now.with_timezone(&tz).date_naive();
    let start = local_midnight(tz, date);
    let end = date
        .succ_opt()
        .map(|next| local_midnight(tz, next))
        .unwrap_or(start + chrono::Duration::days(1));
    (start, end)
}

fn local_midnight(tz: Tz, date: chrono::NaiveDate) -> DateTime<Utc> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        // midnight can fall into a DST gap; read the wall time as UTC then
        .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

pub async fn count_today(
    db: &SqlitePool,
    user_id: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> sqlx::Result<i64> {
    let (start, end) = day_bounds(tz, now);
    store::count_complaints_between(db, user_id, start, end).await
}

pub async fn admit(
    db: &SqlitePool,
    user_id: i64,
    limit: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> sqlx::Result<Admission> {
    let used = count_today(db, user_id, tz, now).await?;
    if used >= limit {
        tracing::info!(user_id, used, limit, "quota: submission denied");
        Ok(Admission::Denied { used, limit })
    } else {
        Ok(Admission::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing;
    use chrono::Duration;
    use chrono_tz::Asia::Tashkent;

    #[test]
    fn day_bounds_cover_exactly_one_local_day() {
        // 23:30 in Tashkent (UTC+5) on 2026-08-28 is 18:30 UTC
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 18, 30, 0).unwrap();
        let (start, end) = day_bounds(Tashkent, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 27, 19, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 8, 28, 19, 0, 0).unwrap());
        assert!(start <= now && now < end);
    }

    #[test]
    fn early_utc_morning_still_counts_to_the_local_day() {
        // 01:00 UTC is 06:00 in Tashkent, same local date
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 1, 0, 0).unwrap();
        let (start, _) = day_bounds(Tashkent, now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 27, 19, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn denies_at_limit_and_admits_after_day_boundary() {
        let db = testing::memory().await;
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 10, 0, 0).unwrap();

        crate::store::insert_complaint(&db, &testing::draft(10), 501, "t1", now)
            .await
            .unwrap();
        crate::store::insert_complaint(&db, &testing::draft(10), 502, "t2", now)
            .await
            .unwrap();

        assert_eq!(
            admit(&db, 10, 2, Tashkent, now).await.unwrap(),
            Admission::Denied { used: 2, limit: 2 }
        );

        // the next local day admits again
        let tomorrow = now + Duration::days(1);
        assert_eq!(
            admit(&db, 10, 2, Tashkent, tomorrow).await.unwrap(),
            Admission::Allowed
        );
    }

    #[tokio::test]
    async fn other_users_do_not_consume_the_quota() {
        let db = testing::memory().await;
        let now = Utc::now();
        crate::store::insert_complaint(&db, &testing::draft(11), 501, "t1", now)
            .await
            .unwrap();

        assert_eq!(count_today(&db, 10, Tashkent, now).await.unwrap(), 0);
        assert_eq!(
            admit(&db, 10, 1, Tashkent, now).await.unwrap(),
            Admission::Allowed
        );
    }

    #[tokio::test]
    async fn yesterdays_complaints_are_not_counted() {
        let db = testing::memory().await;
        let now = Utc.with_ymd_and_hms(2026, 8, 28, 10, 0, 0).unwrap();
        crate::store::insert_complaint(&db, &testing::draft(10), 501, "t1", now - Duration::days(1))
            .await
            .unwrap();

        assert_eq!(count_today(&db, 10, Tashkent, now).await.unwrap(), 0);
    }
}
