use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One raw article-view impression, written by the content-serving path.
///
/// Rows are immutable. The rollup engine is the only component that deletes
/// them, and only after the raw retention threshold has passed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImpressionEvent {
    pub impression_id: Uuid,
    pub organization_id: String,
    pub article_id: String,
    pub channel_id: String,
    pub folder_id: String,
    pub author_id: String,
    pub culture: String,
    pub tags: String,
    pub impression_time: DateTime<Utc>,
    pub user_agent: String,
    pub browser: String,
    pub ip_address: String,
    pub referrer: String,
    pub user_id: String,
    pub device_id: String,
    pub os: String,
    pub country: String,
    pub city: String,
    pub language: String,
}
