pub mod aggregate;
pub mod event;

pub use aggregate::{AggregateKey, AggregateRow, Tier};
pub use event::RawImpressionEvent;
