use clickhouse::Client;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use folio_rollup::config::RollupConfig;
use folio_rollup::migrations;
use folio_rollup::models::Tier;
use folio_rollup::rollup::RollupEngine;
use folio_rollup::scheduler;
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

    // Run migrations before creating the database-scoped client.
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

    scheduler::spawn_rollup_schedules(engine, &config.scheduler);

    tracing::info!("folio-rollup running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("folio-rollup shutting down");

    Ok(())
}
