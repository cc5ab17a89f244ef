//! Calendar-aligned triggers for the three rollup operations, in-process.
//!
//! Each tier gets its own task that sleeps to the next boundary, runs the
//! operation, and loops — a failed run is logged and the loop waits for the
//! next boundary (no catch-up for missed windows). A tier's runs cannot
//! overlap within one process because the loop awaits completion; running a
//! second service instance against the same database is unsupported.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::SchedulerSettings;
use crate::rollup::{window, RollupEngine};

/// Spawn the three rollup schedules as background tasks (fire-and-forget).
pub fn spawn_rollup_schedules(engine: Arc<RollupEngine>, settings: &SchedulerSettings) {
    if !settings.enabled {
        tracing::info!("rollup scheduler: disabled by config");
        return;
    }

    tokio::spawn(hourly_loop(engine.clone()));
    tokio::spawn(daily_loop(engine.clone()));
    tokio::spawn(monthly_loop(engine));

    tracing::info!("rollup scheduler: started (hourly, daily at 00:00, monthly on day 1)");
}

async fn hourly_loop(engine: Arc<RollupEngine>) {
    loop {
        sleep_until(window::next_hour(Utc::now())).await;
        // The operation truncates its reference time to the containing hour,
        // so pass a time inside the hour that just ended.
        let reference = Utc::now() - Duration::minutes(30);
        if let Err(e) = engine.aggregate_hourly(reference).await {
            tracing::error!("hourly rollup failed: {e}");
        }
    }
}

async fn daily_loop(engine: Arc<RollupEngine>) {
    loop {
        sleep_until(window::next_day(Utc::now())).await;
        if let Err(e) = engine.aggregate_daily(Utc::now()).await {
            tracing::error!("daily rollup failed: {e}");
        }
    }
}

async fn monthly_loop(engine: Arc<RollupEngine>) {
    loop {
        sleep_until(window::next_month(Utc::now())).await;
        if let Err(e) = engine.aggregate_monthly(Utc::now()).await {
            tracing::error!("monthly rollup failed: {e}");
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}
