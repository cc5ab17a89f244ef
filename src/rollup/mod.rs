//! The rollup engine: raw impressions → hourly → daily → monthly aggregates,
//! each pass followed by a retention sweep of its source tier.
//!
//! Every operation takes its reference time as an argument; nothing in here
//! reads the wall clock. Insert and cleanup are separate commits — a failure
//! between them leaves the inserted window in place and the source rows for
//! the next sweep to collect.

pub mod fold;
pub mod window;

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};

use crate::config::RollupSettings;
use crate::error::StoreError;
use crate::store::{AggregateStore, EventStore};

/// Row counts from one rollup run, for caller-side logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupOutcome {
    pub rows_written: u64,
    pub rows_deleted: u64,
}

pub struct RollupEngine {
    events: Arc<dyn EventStore>,
    hourly: Arc<dyn AggregateStore>,
    daily: Arc<dyn AggregateStore>,
    monthly: Arc<dyn AggregateStore>,
    settings: RollupSettings,
}

impl RollupEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        hourly: Arc<dyn AggregateStore>,
        daily: Arc<dyn AggregateStore>,
        monthly: Arc<dyn AggregateStore>,
        settings: RollupSettings,
    ) -> Self {
        Self {
            events,
            hourly,
            daily,
            monthly,
            settings,
        }
    }

    /// Roll the hour containing `now` into the hourly tier, then purge raw
    /// events older than the raw retention threshold (a single unbatched
    /// delete over the whole table, not scoped to the window).
    pub async fn aggregate_hourly(&self, now: DateTime<Utc>) -> Result<RollupOutcome, StoreError> {
        let (start, end) = window::hour_window(now);

        let events = self.events.fetch_window(start, end).await?;
        let rows = fold::fold_events(start, &events);
        if rows.is_empty() {
            tracing::info!("hourly rollup: no impressions in window starting {start}");
        } else {
            self.hourly.insert(&rows).await?;
        }

        let cutoff = now - Duration::days(self.settings.raw_retention_days);
        let deleted = self.events.delete_older_than(cutoff).await?;

        let outcome = RollupOutcome {
            rows_written: rows.len() as u64,
            rows_deleted: deleted,
        };
        tracing::info!(
            "hourly rollup for {start}: {} events -> {} rows, {} raw events purged",
            events.len(),
            outcome.rows_written,
            outcome.rows_deleted,
        );
        Ok(outcome)
    }

    /// Roll the previous calendar day's hourly rows into the daily tier, then
    /// purge hourly rows past their retention in bounded batches.
    pub async fn aggregate_daily(&self, now: DateTime<Utc>) -> Result<RollupOutcome, StoreError> {
        let (start, end) = window::previous_day_window(now);

        let hourly_rows = self.hourly.fetch_window(start, end).await?;
        let rows = fold::merge_rows(start, &hourly_rows);
        if rows.is_empty() {
            tracing::info!("daily rollup: no hourly rows for {start}");
        } else {
            self.daily.insert(&rows).await?;
        }

        let cutoff = now - Duration::days(self.settings.hourly_retention_days);
        let deleted = self.drain_expired(&*self.hourly, cutoff).await?;

        let outcome = RollupOutcome {
            rows_written: rows.len() as u64,
            rows_deleted: deleted,
        };
        tracing::info!(
            "daily rollup for {start}: {} hourly rows -> {} rows, {} hourly rows purged",
            hourly_rows.len(),
            outcome.rows_written,
            outcome.rows_deleted,
        );
        Ok(outcome)
    }

    /// Roll the previous calendar month's daily rows into the monthly tier,
    /// then purge daily rows past their retention in bounded batches. Monthly
    /// rows are never deleted.
    pub async fn aggregate_monthly(&self, now: DateTime<Utc>) -> Result<RollupOutcome, StoreError> {
        let (start, end) = window::previous_month_window(now);

        let daily_rows = self.daily.fetch_window(start, end).await?;
        let rows = fold::merge_rows(start, &daily_rows);
        if rows.is_empty() {
            tracing::info!("monthly rollup: no daily rows for {start}");
        } else {
            self.monthly.insert(&rows).await?;
        }

        let cutoff = now
            .checked_sub_months(Months::new(self.settings.daily_retention_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.drain_expired(&*self.daily, cutoff).await?;

        let outcome = RollupOutcome {
            rows_written: rows.len() as u64,
            rows_deleted: deleted,
        };
        tracing::info!(
            "monthly rollup for {start}: {} daily rows -> {} rows, {} daily rows purged",
            daily_rows.len(),
            outcome.rows_written,
            outcome.rows_deleted,
        );
        Ok(outcome)
    }

    /// Delete expired rows in `delete_batch_size` rounds until a round comes
    /// back empty. Each round is its own commit, so a crash mid-loop leaves
    /// resumable partial progress.
    async fn drain_expired(
        &self,
        store: &dyn AggregateStore,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut deleted = 0;
        loop {
            let n = store
                .delete_older_than(cutoff, self.settings.delete_batch_size)
                .await?;
            if n == 0 {
                break;
            }
            deleted += n;
        }
        Ok(deleted)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateRow, RawImpressionEvent};
    use crate::store::memory::{MemoryAggregateStore, MemoryEventStore};
    use chrono::TimeZone;
    use uuid::Uuid;

    struct Fixture {
        events: Arc<MemoryEventStore>,
        hourly: Arc<MemoryAggregateStore>,
        daily: Arc<MemoryAggregateStore>,
        monthly: Arc<MemoryAggregateStore>,
        engine: RollupEngine,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(MemoryEventStore::new());
        let hourly = Arc::new(MemoryAggregateStore::new());
        let daily = Arc::new(MemoryAggregateStore::new());
        let monthly = Arc::new(MemoryAggregateStore::new());
        let engine = RollupEngine::new(
            events.clone(),
            hourly.clone(),
            daily.clone(),
            monthly.clone(),
            RollupSettings::default(),
        );
        Fixture {
            events,
            hourly,
            daily,
            monthly,
            engine,
        }
    }

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn event(article: &str, user: &str, at: DateTime<Utc>) -> RawImpressionEvent {
        RawImpressionEvent {
            impression_id: Uuid::new_v4(),
            organization_id: "org-a".into(),
            article_id: article.into(),
            channel_id: "web".into(),
            folder_id: "news".into(),
            author_id: "author-1".into(),
            culture: "en-US".into(),
            tags: String::new(),
            impression_time: at,
            user_agent: "Mozilla/5.0".into(),
            browser: "Firefox".into(),
            ip_address: "203.0.113.7".into(),
            referrer: "https://example.org".into(),
            user_id: user.into(),
            device_id: "d1".into(),
            os: "Linux".into(),
            country: "NO".into(),
            city: "Oslo".into(),
            language: "en".into(),
        }
    }

    fn hourly_row(article: &str, tick: DateTime<Utc>, total: u64) -> AggregateRow {
        AggregateRow {
            tick,
            organization_id: "org-a".into(),
            article_id: article.into(),
            channel_id: "web".into(),
            total_impressions: total,
            unique_users: total.min(2),
            average_impression_duration: 15.0,
            top_referrer: "https://example.org".into(),
            top_country: "NO".into(),
            top_city: "Oslo".into(),
        }
    }

    #[tokio::test]
    async fn test_hourly_rollup_buckets_by_dimensional_key() {
        let f = fixture();
        // Day D, hour 10: three views of X, two of Y.
        f.events.push(event("art-x", "u1", ts(2026, 3, 14, 10, 5, 0)));
        f.events.push(event("art-y", "u1", ts(2026, 3, 14, 10, 10, 0)));
        f.events.push(event("art-x", "u2", ts(2026, 3, 14, 10, 20, 0)));
        f.events.push(event("art-y", "u2", ts(2026, 3, 14, 10, 40, 0)));
        f.events.push(event("art-x", "u3", ts(2026, 3, 14, 10, 50, 0)));
        // Outside the window: previous hour.
        f.events.push(event("art-x", "u1", ts(2026, 3, 14, 9, 59, 59)));

        let outcome = f.engine.aggregate_hourly(ts(2026, 3, 14, 10, 59, 0)).await.unwrap();
        assert_eq!(outcome.rows_written, 2);

        let rows = f.hourly.rows();
        let x = rows.iter().find(|r| r.article_id == "art-x").unwrap();
        let y = rows.iter().find(|r| r.article_id == "art-y").unwrap();
        assert_eq!(x.total_impressions, 3);
        assert_eq!(y.total_impressions, 2);
        assert_eq!(x.tick, ts(2026, 3, 14, 10, 0, 0));
        assert_eq!(y.tick, ts(2026, 3, 14, 10, 0, 0));
    }

    #[tokio::test]
    async fn test_hourly_rollup_empty_window_still_purges() {
        let f = fixture();
        let now = ts(2026, 3, 14, 10, 30, 0);
        // Only an aged-out event, nothing in the current hour.
        f.events.push(event("art-x", "u1", now - Duration::days(8)));

        let outcome = f.engine.aggregate_hourly(now).await.unwrap();
        assert_eq!(outcome.rows_written, 0);
        assert_eq!(outcome.rows_deleted, 1);
        assert!(f.hourly.is_empty());
        assert!(f.events.is_empty());
    }

    #[tokio::test]
    async fn test_hourly_rollup_rerun_duplicates_rows() {
        // Insert-only semantics: a second run for the same hour adds a second
        // row per bucket. Pinned deliberately — there is no upsert path.
        let f = fixture();
        f.events.push(event("art-x", "u1", ts(2026, 3, 14, 10, 5, 0)));

        let now = ts(2026, 3, 14, 10, 59, 0);
        f.engine.aggregate_hourly(now).await.unwrap();
        f.engine.aggregate_hourly(now).await.unwrap();

        let rows = f.hourly.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], rows[1]);
    }

    #[tokio::test]
    async fn test_raw_retention_boundary_is_exclusive() {
        let f = fixture();
        let now = ts(2026, 3, 14, 10, 0, 0);
        // Exactly seven days old: retained. One second older: deleted.
        f.events.push(event("art-x", "u1", now - Duration::days(7)));
        f.events.push(event("art-x", "u2", now - Duration::days(7) - Duration::seconds(1)));

        let outcome = f.engine.aggregate_hourly(now).await.unwrap();
        assert_eq!(outcome.rows_deleted, 1);
        assert_eq!(f.events.len(), 1);
    }

    #[tokio::test]
    async fn test_daily_rollup_sums_previous_day() {
        let f = fixture();
        let day = ts(2026, 3, 13, 0, 0, 0);
        // Totals [3, 5, 0, 2] across four hours of day D.
        f.hourly.push(hourly_row("art-x", day + Duration::hours(1), 3));
        f.hourly.push(hourly_row("art-x", day + Duration::hours(9), 5));
        f.hourly.push(hourly_row("art-x", day + Duration::hours(14), 0));
        f.hourly.push(hourly_row("art-x", day + Duration::hours(23), 2));
        // Day D+1 must not leak into the window.
        f.hourly.push(hourly_row("art-x", day + Duration::days(1), 99));

        let outcome = f.engine.aggregate_daily(ts(2026, 3, 14, 0, 0, 30)).await.unwrap();
        assert_eq!(outcome.rows_written, 1);

        let rows = f.daily.rows();
        assert_eq!(rows[0].total_impressions, 10);
        assert_eq!(rows[0].tick, day);
    }

    #[tokio::test]
    async fn test_daily_rollup_purges_hourly_in_batches() {
        let f = fixture();
        let now = ts(2026, 3, 14, 0, 0, 30);
        // 2500 expired hourly rows (batch size 1000 -> three rounds) plus one
        // fresh row that must survive.
        let expired_base = now - Duration::days(15);
        for i in 0..2500 {
            f.hourly.push(hourly_row("art-x", expired_base - Duration::seconds(i), 1));
        }
        f.hourly.push(hourly_row("art-x", now - Duration::days(1), 1));

        let outcome = f.engine.aggregate_daily(now).await.unwrap();
        assert_eq!(outcome.rows_deleted, 2500);
        assert_eq!(f.hourly.len(), 1);
    }

    #[tokio::test]
    async fn test_monthly_rollup_covers_previous_calendar_month() {
        let f = fixture();
        // Daily rows spread across February 2026.
        f.daily.push(hourly_row("art-x", ts(2026, 2, 1, 0, 0, 0), 4));
        f.daily.push(hourly_row("art-x", ts(2026, 2, 28, 0, 0, 0), 6));
        // January must not leak in.
        f.daily.push(hourly_row("art-x", ts(2026, 1, 31, 0, 0, 0), 50));

        let outcome = f.engine.aggregate_monthly(ts(2026, 3, 1, 0, 1, 0)).await.unwrap();
        assert_eq!(outcome.rows_written, 1);

        let rows = f.monthly.rows();
        assert_eq!(rows[0].tick, ts(2026, 2, 1, 0, 0, 0));
        assert_eq!(rows[0].total_impressions, 10);
    }

    #[tokio::test]
    async fn test_monthly_rollup_purges_daily_after_a_year() {
        let f = fixture();
        let now = ts(2026, 3, 1, 0, 1, 0);
        f.daily.push(hourly_row("art-x", ts(2025, 2, 28, 0, 0, 0), 1));
        f.daily.push(hourly_row("art-x", ts(2025, 6, 1, 0, 0, 0), 1));

        let outcome = f.engine.aggregate_monthly(now).await.unwrap();
        assert_eq!(outcome.rows_deleted, 1);

        let remaining = f.daily.rows();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].tick, ts(2025, 6, 1, 0, 0, 0));
    }

    #[tokio::test]
    async fn test_monthly_tier_is_never_purged() {
        let f = fixture();
        f.monthly.push(hourly_row("art-x", ts(2019, 1, 1, 0, 0, 0), 1));

        f.engine.aggregate_monthly(ts(2026, 3, 1, 0, 1, 0)).await.unwrap();
        assert_eq!(f.monthly.len(), 1);
    }
}
