//! ClickHouse-backed stores for the raw event log and the three aggregate
//! tiers.
//!
//! Deletes go through `ALTER TABLE … DELETE` with `mutations_sync = 1` so a
//! cleanup round observes its own effect before the next round counts again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Client;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{AggregateRow, RawImpressionEvent, Tier};
use crate::store::{AggregateStore, EventStore};

#[derive(clickhouse::Row, serde::Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(clickhouse::Row, serde::Deserialize)]
struct BoundaryRow {
    boundary: u32,
}

/// Escape a string literal for inclusion in a ClickHouse SQL statement.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Render a timestamp as a millisecond-precision UTC literal.
fn sql_ts(ts: DateTime<Utc>) -> String {
    format!("toDateTime64('{}', 3, 'UTC')", ts.format("%Y-%m-%d %H:%M:%S%.3f"))
}

/// Render a tick as a second-precision UTC literal (tick columns are
/// DateTime, bucket boundaries never carry sub-second parts).
fn sql_tick(ts: DateTime<Utc>) -> String {
    format!("toDateTime('{}', 'UTC')", ts.format("%Y-%m-%d %H:%M:%S"))
}

// ═══════════════════════════════════════════════════════════════════
// Raw impression events
// ═══════════════════════════════════════════════════════════════════

pub struct ClickhouseEventStore {
    ch: Client,
}

impl ClickhouseEventStore {
    pub fn new(ch: Client) -> Self {
        Self { ch }
    }
}

#[derive(clickhouse::Row, serde::Deserialize)]
struct RawEventRow {
    impression_id: String,
    organization_id: String,
    article_id: String,
    channel_id: String,
    folder_id: String,
    author_id: String,
    culture: String,
    tags: String,
    impression_ms: i64,
    user_agent: String,
    browser: String,
    ip_address: String,
    referrer: String,
    user_id: String,
    device_id: String,
    os: String,
    country: String,
    city: String,
    language: String,
}

impl From<RawEventRow> for RawImpressionEvent {
    fn from(r: RawEventRow) -> Self {
        RawImpressionEvent {
            impression_id: Uuid::parse_str(&r.impression_id).unwrap_or(Uuid::nil()),
            organization_id: r.organization_id,
            article_id: r.article_id,
            channel_id: r.channel_id,
            folder_id: r.folder_id,
            author_id: r.author_id,
            culture: r.culture,
            tags: r.tags,
            impression_time: DateTime::from_timestamp_millis(r.impression_ms)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            user_agent: r.user_agent,
            browser: r.browser,
            ip_address: r.ip_address,
            referrer: r.referrer,
            user_id: r.user_id,
            device_id: r.device_id,
            os: r.os,
            country: r.country,
            city: r.city,
            language: r.language,
        }
    }
}

#[async_trait]
impl EventStore for ClickhouseEventStore {
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawImpressionEvent>, StoreError> {
        let sql = format!(
            "SELECT toString(impression_id) AS impression_id, organization_id, article_id, \
             channel_id, folder_id, author_id, culture, tags, \
             toUnixTimestamp64Milli(impression_time) AS impression_ms, user_agent, browser, \
             ip_address, referrer, user_id, device_id, os, country, city, language \
             FROM raw_impressions \
             WHERE impression_time >= {} AND impression_time < {} \
             ORDER BY impression_time",
            sql_ts(from),
            sql_ts(to),
        );

        let rows = self.ch.query(&sql).fetch_all::<RawEventRow>().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = sql_ts(cutoff);

        let count_sql = format!(
            "SELECT count() AS count FROM raw_impressions WHERE impression_time < {cutoff}"
        );
        let doomed = self.ch.query(&count_sql).fetch_one::<CountRow>().await?.count;
        if doomed == 0 {
            return Ok(0);
        }

        let sql = format!(
            "ALTER TABLE raw_impressions DELETE WHERE impression_time < {cutoff} \
             SETTINGS mutations_sync = 1"
        );
        tracing::debug!("raw event cleanup: {sql}");
        self.ch.query(&sql).execute().await?;

        Ok(doomed)
    }
}

// ═══════════════════════════════════════════════════════════════════
// Aggregate tiers
// ═══════════════════════════════════════════════════════════════════

pub struct ClickhouseAggregateStore {
    ch: Client,
    tier: Tier,
}

impl ClickhouseAggregateStore {
    pub fn new(ch: Client, tier: Tier) -> Self {
        Self { ch, tier }
    }
}

#[derive(clickhouse::Row, serde::Deserialize)]
struct AggRow {
    tick_secs: u32,
    organization_id: String,
    article_id: String,
    channel_id: String,
    total_impressions: u64,
    unique_users: u64,
    average_impression_duration: f64,
    top_referrer: String,
    top_country: String,
    top_city: String,
}

impl From<AggRow> for AggregateRow {
    fn from(r: AggRow) -> Self {
        AggregateRow {
            tick: DateTime::from_timestamp(r.tick_secs as i64, 0)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            organization_id: r.organization_id,
            article_id: r.article_id,
            channel_id: r.channel_id,
            total_impressions: r.total_impressions,
            unique_users: r.unique_users,
            average_impression_duration: r.average_impression_duration,
            top_referrer: r.top_referrer,
            top_country: r.top_country,
            top_city: r.top_city,
        }
    }
}

#[async_trait]
impl AggregateStore for ClickhouseAggregateStore {
    async fn insert(&self, rows: &[AggregateRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let values: Vec<String> = rows
            .iter()
            .map(|r| {
                format!(
                    "({}, '{}', '{}', '{}', {}, {}, {}, '{}', '{}', '{}')",
                    sql_tick(r.tick),
                    escape(&r.organization_id),
                    escape(&r.article_id),
                    escape(&r.channel_id),
                    r.total_impressions,
                    r.unique_users,
                    r.average_impression_duration,
                    escape(&r.top_referrer),
                    escape(&r.top_country),
                    escape(&r.top_city),
                )
            })
            .collect();

        let sql = format!(
            "INSERT INTO {} (tick, organization_id, article_id, channel_id, total_impressions, \
             unique_users, average_impression_duration, top_referrer, top_country, top_city) \
             VALUES {}",
            self.tier.table(),
            values.join(", "),
        );

        self.ch.query(&sql).execute().await?;
        Ok(())
    }

    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregateRow>, StoreError> {
        let sql = format!(
            "SELECT toUnixTimestamp(tick) AS tick_secs, organization_id, article_id, channel_id, \
             total_impressions, unique_users, average_impression_duration, top_referrer, \
             top_country, top_city \
             FROM {} WHERE tick >= {} AND tick < {} \
             ORDER BY tick, organization_id, channel_id, article_id",
            self.tier.table(),
            sql_tick(from),
            sql_tick(to),
        );

        let rows = self.ch.query(&sql).fetch_all::<AggRow>().await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Keyset-batched delete: the batch boundary is the tick of the `limit`-th
    /// oldest qualifying row, so one mutation never covers much more than
    /// `limit` rows. Ticks tying on the boundary can push a batch slightly
    /// over the nominal size.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<u64, StoreError> {
        let table = self.tier.table();
        let cutoff = sql_tick(cutoff);

        let count_sql = format!("SELECT count() AS count FROM {table} WHERE tick < {cutoff}");
        let total = self.ch.query(&count_sql).fetch_one::<CountRow>().await?.count;
        if total == 0 {
            return Ok(0);
        }

        if total <= limit {
            let sql = format!(
                "ALTER TABLE {table} DELETE WHERE tick < {cutoff} SETTINGS mutations_sync = 1"
            );
            tracing::debug!("{table} cleanup: {sql}");
            self.ch.query(&sql).execute().await?;
            return Ok(total);
        }

        let boundary_sql = format!(
            "SELECT toUnixTimestamp(tick) AS boundary FROM {table} WHERE tick < {cutoff} \
             ORDER BY tick LIMIT 1 OFFSET {}",
            limit - 1,
        );
        let boundary = match self.ch.query(&boundary_sql).fetch_optional::<BoundaryRow>().await? {
            Some(row) => row.boundary,
            // Raced with another delete; retry on the caller's next round.
            None => return Ok(0),
        };

        let batch_count_sql = format!(
            "SELECT count() AS count FROM {table} WHERE tick <= toDateTime({boundary}, 'UTC')"
        );
        let doomed = self.ch.query(&batch_count_sql).fetch_one::<CountRow>().await?.count;

        let sql = format!(
            "ALTER TABLE {table} DELETE WHERE tick <= toDateTime({boundary}, 'UTC') \
             SETTINGS mutations_sync = 1"
        );
        tracing::debug!("{table} cleanup batch: {sql}");
        self.ch.query(&sql).execute().await?;

        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape("O'Neill"), "O\\'Neill");
        assert_eq!(escape(r"a\b"), r"a\\b");
    }

    #[test]
    fn test_sql_timestamp_literals_are_utc() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 10, 0, 0).unwrap();
        assert_eq!(sql_ts(ts), "toDateTime64('2026-03-14 10:00:00.000', 3, 'UTC')");
        assert_eq!(sql_tick(ts), "toDateTime('2026-03-14 10:00:00', 'UTC')");
    }
}
