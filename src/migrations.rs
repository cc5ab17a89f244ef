use clickhouse::Client;

/// Ordered list of DDL statements to ensure the analytics schema exists.
/// Every statement is idempotent (`IF NOT EXISTS`) so safe to run on every
/// startup.
///
/// None of the tables carries a TTL: the rollup engine owns deletion, so a
/// row is always folded into the next tier before it ages out.
const MIGRATIONS: &[&str] = &[
    // ── Database ──
    "CREATE DATABASE IF NOT EXISTS folio_analytics",

    // ── Raw impression events (written by the content-serving path) ──
    r"CREATE TABLE IF NOT EXISTS folio_analytics.raw_impressions
(
    impression_id      UUID,
    organization_id    LowCardinality(String),
    article_id         String,
    channel_id         LowCardinality(String),
    folder_id          String,
    author_id          String,
    culture            LowCardinality(String),
    tags               String CODEC(ZSTD(1)),
    impression_time    DateTime64(3, 'UTC') CODEC(Delta, ZSTD(1)),
    user_agent         String CODEC(ZSTD(1)),
    browser            LowCardinality(String),
    ip_address         String,
    referrer           String CODEC(ZSTD(1)),
    user_id            String,
    device_id          String,
    os                 LowCardinality(String),
    country            LowCardinality(String),
    city               String,
    language           LowCardinality(String),
    INDEX idx_org organization_id TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toDate(impression_time)
ORDER BY (impression_time, organization_id)
SETTINGS index_granularity = 8192",

    // ── Hourly aggregates ──
    r"CREATE TABLE IF NOT EXISTS folio_analytics.hourly_aggregates
(
    tick                         DateTime('UTC') CODEC(Delta, ZSTD(1)),
    organization_id              LowCardinality(String),
    article_id                   String,
    channel_id                   LowCardinality(String),
    total_impressions            UInt64,
    unique_users                 UInt64,
    average_impression_duration  Float64,
    top_referrer                 String,
    top_country                  LowCardinality(String),
    top_city                     String,
    INDEX idx_org organization_id TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(tick)
ORDER BY (tick, organization_id, channel_id, article_id)
SETTINGS index_granularity = 8192",

    // ── Daily aggregates ──
    r"CREATE TABLE IF NOT EXISTS folio_analytics.daily_aggregates
(
    tick                         DateTime('UTC') CODEC(Delta, ZSTD(1)),
    organization_id              LowCardinality(String),
    article_id                   String,
    channel_id                   LowCardinality(String),
    total_impressions            UInt64,
    unique_users                 UInt64,
    average_impression_duration  Float64,
    top_referrer                 String,
    top_country                  LowCardinality(String),
    top_city                     String,
    INDEX idx_org organization_id TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(tick)
ORDER BY (tick, organization_id, channel_id, article_id)
SETTINGS index_granularity = 8192",

    // ── Monthly aggregates (kept forever) ──
    r"CREATE TABLE IF NOT EXISTS folio_analytics.monthly_aggregates
(
    tick                         DateTime('UTC') CODEC(Delta, ZSTD(1)),
    organization_id              LowCardinality(String),
    article_id                   String,
    channel_id                   LowCardinality(String),
    total_impressions            UInt64,
    unique_users                 UInt64,
    average_impression_duration  Float64,
    top_referrer                 String,
    top_country                  LowCardinality(String),
    top_city                     String,
    INDEX idx_org organization_id TYPE bloom_filter(0.01) GRANULARITY 1
)
ENGINE = MergeTree
PARTITION BY toYYYYMM(tick)
ORDER BY (tick, organization_id, channel_id, article_id)
SETTINGS index_granularity = 8192",
];

/// Run all migrations against ClickHouse.
///
/// Connects **without** a default database so that `CREATE DATABASE` succeeds
/// even on a fresh instance.
pub async fn run(url: &str, user: &str, password: &str) -> anyhow::Result<()> {
    let client = Client::default()
        .with_url(url)
        .with_user(user)
        .with_password(password);

    tracing::info!("running clickhouse migrations ({} statements)", MIGRATIONS.len());

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let preview: String = sql.chars().take(80).collect();
        tracing::debug!("migration {}/{}: {}...", i + 1, MIGRATIONS.len(), preview);
        client.query(sql).execute().await.map_err(|e| {
            tracing::error!("migration {}/{} failed: {e}", i + 1, MIGRATIONS.len());
            e
        })?;
    }

    tracing::info!("clickhouse migrations complete");
    Ok(())
}
