pub mod clickhouse;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{AggregateRow, RawImpressionEvent};

/// Read/purge access to the raw impression event log.
///
/// Events are written by the content-serving path; the rollup engine only
/// ever reads a window and deletes aged-out rows.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events with `impression_time` in `[from, to)`.
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawImpressionEvent>, StoreError>;

    /// Delete every event strictly older than `cutoff`. Returns rows removed.
    /// An event at exactly `cutoff` is retained.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// One tier's aggregate collection: bulk insert, range read, bounded delete.
///
/// Insert-only — there is no upsert, so re-aggregating a window adds a second
/// row per bucket.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Bulk-insert aggregate rows.
    async fn insert(&self, rows: &[AggregateRow]) -> Result<(), StoreError>;

    /// All rows with `tick` in `[from, to)`.
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregateRow>, StoreError>;

    /// Delete rows with `tick` strictly older than `cutoff`, oldest first,
    /// roughly `limit` rows per call. Returns rows removed; zero means no
    /// qualifying rows remain. A row at exactly `cutoff` is retained.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<u64, StoreError>;
}
