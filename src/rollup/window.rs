use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Timelike, Utc};

// ═══════════════════════════════════════════════════════════════════
// Bucket truncation
// ═══════════════════════════════════════════════════════════════════

/// Truncate to the start of the hour containing `ts`.
pub fn hour_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), ts.hour(), 0, 0)
        .unwrap()
}

/// Truncate to 00:00 UTC of the day containing `ts`.
pub fn day_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), 0, 0, 0)
        .unwrap()
}

/// Truncate to 00:00 UTC on the first of the month containing `ts`.
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Aggregation windows
// ═══════════════════════════════════════════════════════════════════

/// The hour containing `now`: `[start_of_hour, start_of_hour + 1h)`.
pub fn hour_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = hour_start(now);
    (start, start + Duration::hours(1))
}

/// The calendar day before the one containing `now`.
pub fn previous_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = day_start(now);
    (end - Duration::days(1), end)
}

/// The calendar month before the one containing `now`.
pub fn previous_month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = month_start(now);
    let start = end.checked_sub_months(Months::new(1)).unwrap();
    (start, end)
}

// ═══════════════════════════════════════════════════════════════════
// Next scheduler boundaries
// ═══════════════════════════════════════════════════════════════════

/// First top-of-hour strictly after `now`.
pub fn next_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    hour_start(now) + Duration::hours(1)
}

/// First midnight (00:00 UTC) strictly after `now`.
pub fn next_day(now: DateTime<Utc>) -> DateTime<Utc> {
    day_start(now) + Duration::days(1)
}

/// First first-of-month midnight strictly after `now`.
pub fn next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    month_start(now).checked_add_months(Months::new(1)).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════
