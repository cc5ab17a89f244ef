//! In-memory stores backing the test suite. Also usable for embedding the
//! engine without a ClickHouse instance behind it.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{AggregateRow, RawImpressionEvent};
use crate::store::{AggregateStore, EventStore};

#[derive(Default)]
pub struct MemoryEventStore {
    events: Mutex<Vec<RawImpressionEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: RawImpressionEvent) {
        self.events.lock().expect("event store lock").push(event);
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawImpressionEvent>, StoreError> {
        let events = lock(&self.events)?;
        Ok(events
            .iter()
            .filter(|e| e.impression_time >= from && e.impression_time < to)
            .cloned()
            .collect())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut events = lock(&self.events)?;
        let before = events.len();
        events.retain(|e| e.impression_time >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryAggregateStore {
    rows: Mutex<Vec<AggregateRow>>,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: AggregateRow) {
        self.rows.lock().expect("aggregate store lock").push(row);
    }

    pub fn rows(&self) -> Vec<AggregateRow> {
        self.rows.lock().expect("aggregate store lock").clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("aggregate store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn insert(&self, new_rows: &[AggregateRow]) -> Result<(), StoreError> {
        let mut rows = lock(&self.rows)?;
        rows.extend_from_slice(new_rows);
        Ok(())
    }

    async fn fetch_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregateRow>, StoreError> {
        let rows = lock(&self.rows)?;
        Ok(rows
            .iter()
            .filter(|r| r.tick >= from && r.tick < to)
            .cloned()
            .collect())
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: u64,
    ) -> Result<u64, StoreError> {
        let mut rows = lock(&self.rows)?;

        // Oldest first, at most `limit` per call.
        let mut qualifying: Vec<(DateTime<Utc>, usize)> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.tick < cutoff)
            .map(|(i, r)| (r.tick, i))
            .collect();
        qualifying.sort();
        qualifying.truncate(limit as usize);

        let mut doomed: Vec<usize> = qualifying.into_iter().map(|(_, i)| i).collect();
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for i in &doomed {
            rows.swap_remove(*i);
        }

        Ok(doomed.len() as u64)
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StoreError> {
    m.lock()
        .map_err(|_| StoreError::Backend("poisoned store lock".to_string()))
}
