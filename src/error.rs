/// Data-access failure surfaced to the invoking scheduler.
///
/// Rollup operations never retry internally; the next scheduled run processes
/// its own window regardless of an earlier failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("clickhouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}
