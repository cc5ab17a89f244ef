use serde::Deserialize;
use std::path::Path;

/// Top-level config loaded from `rollup.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RollupConfig {
    #[serde(default)]
    pub rollup: RollupSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollupSettings {
    /// Raw impressions older than this are purged after each hourly run.
    #[serde(default = "default_raw_retention_days")]
    pub raw_retention_days: i64,
    /// Hourly rows older than this are purged after each daily run.
    #[serde(default = "default_hourly_retention_days")]
    pub hourly_retention_days: i64,
    /// Daily rows older than this are purged after each monthly run.
    /// Monthly rows are kept forever.
    #[serde(default = "default_daily_retention_months")]
    pub daily_retention_months: u32,
    /// Rows per cleanup delete round-trip. Bounds mutation size when a large
    /// backlog expires at once.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: u64,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            raw_retention_days: default_raw_retention_days(),
            hourly_retention_days: default_hourly_retention_days(),
            daily_retention_months: default_daily_retention_months(),
            delete_batch_size: default_delete_batch_size(),
        }
    }
}

fn default_raw_retention_days() -> i64 {
    7
}

fn default_hourly_retention_days() -> i64 {
    14
}

fn default_daily_retention_months() -> u32 {
    12
}

fn default_delete_batch_size() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl RollupConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RollupConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RollupConfig::default();
        assert_eq!(config.rollup.raw_retention_days, 7);
        assert_eq!(config.rollup.hourly_retention_days, 14);
        assert_eq!(config.rollup.daily_retention_months, 12);
        assert_eq!(config.rollup.delete_batch_size, 1000);
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_remaining_defaults() {
        let config: RollupConfig = toml::from_str(
            r#"
            [rollup]
            delete_batch_size = 250

            [scheduler]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.rollup.delete_batch_size, 250);
        assert_eq!(config.rollup.raw_retention_days, 7);
        assert!(!config.scheduler.enabled);
    }
}
