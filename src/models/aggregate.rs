use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dimensional identity of an aggregate bucket within one tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub organization_id: String,
    pub article_id: String,
    pub channel_id: String,
}

/// One time-bucketed statistics row. The same shape is stored at every tier;
/// only the bucket width and retention differ.
///
/// `(tick, organization_id, channel_id, article_id)` identifies a bucket.
/// There is no upsert path — re-aggregating a window inserts a second row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Bucket start, truncated to the tier's boundary.
    pub tick: DateTime<Utc>,
    pub organization_id: String,
    pub article_id: String,
    pub channel_id: String,
    pub total_impressions: u64,
    /// Distinct-user estimate. Exact at the hourly tier; merged tiers carry
    /// a best-effort estimate (see `rollup::fold::merge_rows`).
    pub unique_users: u64,
    /// Mean of the seconds-of-minute component of `impression_time`. Not a
    /// real duration — kept bit-compatible with historical rows.
    pub average_impression_duration: f64,
    pub top_referrer: String,
    pub top_country: String,
    pub top_city: String,
}

impl AggregateRow {
    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            organization_id: self.organization_id.clone(),
            article_id: self.article_id.clone(),
            channel_id: self.channel_id.clone(),
        }
    }
}

/// One granularity level of the rollup pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Hourly,
    Daily,
    Monthly,
}

impl Tier {
    /// ClickHouse table backing this tier.
    pub fn table(&self) -> &'static str {
        match self {
            Tier::Hourly => "hourly_aggregates",
            Tier::Daily => "daily_aggregates",
            Tier::Monthly => "monthly_aggregates",
        }
    }
}
