//! One-shot rollup trigger for operational use: run a single tier's rollup
//! for an explicit reference time, e.g. to re-drive a window after a failed
//! scheduled run.
//!
//! Usage: run-rollup <hourly|daily|monthly> [rfc3339-reference-time]

use chrono::{DateTime, Utc};
use clickhouse::Client;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use folio_rollup::config::RollupConfig;
use folio_rollup::migrations;
use folio_rollup::models::Tier;
use folio_rollup::rollup::RollupEngine;
use folio_rollup::store::clickhouse::{ClickhouseAggregateStore, ClickhouseEventStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("folio_rollup=debug")),
        )
        .init();

    let tier = std::env::args().nth(1).unwrap_or_default();
    let reference = match std::env::args().nth(2) {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map_err(|e| anyhow::anyhow!("bad reference time '{s}': {e}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let clickhouse_url =
        std::env::var("CLICKHOUSE_URL").unwrap_or_else(|_| "http://localhost:8123".to_string());
    let clickhouse_db =
        std::env::var("CLICKHOUSE_DATABASE").unwrap_or_else(|_| "folio_analytics".to_string());
    let clickhouse_user =
        std::env::var("CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let clickhouse_password = std::env::var("CLICKHOUSE_PASSWORD").unwrap_or_default();

    let config_path =
        std::env::var("ROLLUP_CONFIG").unwrap_or_else(|_| "./rollup.toml".to_string());
    let config = RollupConfig::load(&config_path)?;

    migrations::run(&clickhouse_url, &clickhouse_user, &clickhouse_password).await?;

    let ch = Client::default()
        .with_url(&clickhouse_url)
        .with_database(&clickhouse_db)
        .with_user(&clickhouse_user)
        .with_password(&clickhouse_password);

    let engine = Arc::new(RollupEngine::new(
        Arc::new(ClickhouseEventStore::new(ch.clone())),
        Arc::new(ClickhouseAggregateStore::new(ch.clone(), Tier::Hourly)),
        Arc::new(ClickhouseAggregateStore::new(ch.clone(), Tier::Daily)),
        Arc::new(ClickhouseAggregateStore::new(ch, Tier::Monthly)),
        config.rollup.clone(),
    ));

    tracing::info!("run-rollup: {tier} rollup at reference time {reference}");
    let outcome = match tier.as_str() {
        "hourly" => engine.aggregate_hourly(reference).await?,
        "daily" => engine.aggregate_daily(reference).await?,
        "monthly" => engine.aggregate_monthly(reference).await?,
        _ => anyhow::bail!("usage: run-rollup <hourly|daily|monthly> [rfc3339-reference-time]"),
    };
    tracing::info!(
        "run-rollup complete: {} rows written, {} rows deleted",
        outcome.rows_written,
        outcome.rows_deleted,
    );

    Ok(())
}
