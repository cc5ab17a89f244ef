use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Timelike, Utc};

use crate::models::{AggregateKey, AggregateRow, RawImpressionEvent};

// ═══════════════════════════════════════════════════════════════════
// Raw events → hourly aggregates
// ═══════════════════════════════════════════════════════════════════

/// Fold one window of raw impressions into aggregate rows, one per distinct
/// `(organization_id, article_id, channel_id)`, all stamped with `tick`.
///
/// Output order follows the first occurrence of each key in the input, which
/// also fixes the tie-break order for the top-value fields.
pub fn fold_events(tick: DateTime<Utc>, events: &[RawImpressionEvent]) -> Vec<AggregateRow> {
    group_by_key(events, |e| AggregateKey {
        organization_id: e.organization_id.clone(),
        article_id: e.article_id.clone(),
        channel_id: e.channel_id.clone(),
    })
    .into_iter()
    .map(|(key, members)| {
        let total = members.len() as u64;

        let unique_users = members
            .iter()
            .map(|e| e.user_id.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;

        // Seconds-of-minute proxy, kept bit-compatible with historical rows.
        let seconds_sum: f64 = members.iter().map(|e| e.impression_time.second() as f64).sum();
        let average_impression_duration = seconds_sum / members.len() as f64;

        AggregateRow {
            tick,
            organization_id: key.organization_id,
            article_id: key.article_id,
            channel_id: key.channel_id,
            total_impressions: total,
            unique_users,
            average_impression_duration,
            top_referrer: top_by_count(members.iter().map(|e| e.referrer.as_str())),
            top_country: top_by_count(members.iter().map(|e| e.country.as_str())),
            top_city: top_by_count(members.iter().map(|e| e.city.as_str())),
        }
    })
    .collect()
}

// ═══════════════════════════════════════════════════════════════════
// Finer tier → coarser tier
// ═══════════════════════════════════════════════════════════════════

/// Merge one window of finer-tier rows into coarser rows stamped with `tick`.
///
/// `total_impressions` sums exactly. `average_impression_duration` is the
/// impression-weighted mean of the source averages. The top-value fields pick
/// the value with the largest summed `total_impressions`. `unique_users`
/// expands each source count by its impression weight and distinct-counts the
/// expanded multiset — multiplicity collapses under distinct, so this is the
/// count of distinct per-source values. Best-effort estimate only.
pub fn merge_rows(tick: DateTime<Utc>, rows: &[AggregateRow]) -> Vec<AggregateRow> {
    group_by_key(rows, AggregateRow::key)
        .into_iter()
        .map(|(key, members)| {
            let total: u64 = members.iter().map(|r| r.total_impressions).sum();

            let unique_users = members
                .iter()
                .filter(|r| r.total_impressions > 0)
                .map(|r| r.unique_users)
                .collect::<HashSet<_>>()
                .len() as u64;

            let weighted_sum: f64 = members
                .iter()
                .map(|r| r.average_impression_duration * r.total_impressions as f64)
                .sum();
            let average_impression_duration = if total > 0 {
                weighted_sum / total as f64
            } else {
                0.0
            };

            AggregateRow {
                tick,
                organization_id: key.organization_id,
                article_id: key.article_id,
                channel_id: key.channel_id,
                total_impressions: total,
                unique_users,
                average_impression_duration,
                top_referrer: top_by_weight(
                    members.iter().map(|r| (r.top_referrer.as_str(), r.total_impressions)),
                ),
                top_country: top_by_weight(
                    members.iter().map(|r| (r.top_country.as_str(), r.total_impressions)),
                ),
                top_city: top_by_weight(
                    members.iter().map(|r| (r.top_city.as_str(), r.total_impressions)),
                ),
            }
        })
        .collect()
}

/// Group items by key, preserving the order keys are first encountered.
fn group_by_key<'a, T, F>(items: &'a [T], key_of: F) -> Vec<(AggregateKey, Vec<&'a T>)>
where
    F: Fn(&T) -> AggregateKey,
{
    let mut index: HashMap<AggregateKey, usize> = HashMap::new();
    let mut groups: Vec<(AggregateKey, Vec<&T>)> = Vec::new();

    for item in items {
        let key = key_of(item);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![item]));
            }
        }
    }

    groups
}

/// Most frequent value; ties go to the value seen first.
fn top_by_count<'a>(values: impl Iterator<Item = &'a str>) -> String {
    top_by_weight(values.map(|v| (v, 1)))
}

/// Value with the largest summed weight; ties go to the value seen first.
fn top_by_weight<'a>(weighted: impl Iterator<Item = (&'a str, u64)>) -> String {
    let mut totals: HashMap<&str, (u64, usize)> = HashMap::new();

    for (i, (value, weight)) in weighted.enumerate() {
        let entry = totals.entry(value).or_insert((0, i));
        entry.0 += weight;
    }

    totals
        .into_iter()
        .max_by(|&(_, (wa, ia)), &(_, (wb, ib))| wa.cmp(&wb).then(ib.cmp(&ia)))
        .map(|(value, _)| value.to_string())
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════
