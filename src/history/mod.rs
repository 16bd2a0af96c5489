//! Hourly history store (C5, §4.5): an append-only rolling buffer per
//! location, truncated to 25 hours so EPA's <=24h averaging windows always
//! have one buffer hour beyond them. The store is pluggable behind
//! [`HistoryStore`]; an in-memory backend is provided here for tests and the
//! demo path, and `db::postgres` implements the same trait against the
//! `hourly_history` table for production use.

use crate::models::{HourlyHistoryEntry, Pollutant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// §3: "the entry list is kept sorted by timestamp descending and truncated
/// to the last 25 hours".
pub const MAX_HISTORY_ENTRIES: usize = 25;

/// The contract every history backend implements (§4.5): a read returns an
/// ordered (descending) list with at most 25 elements; a write is idempotent
/// on repeated writes for the same hour (last write wins).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn read(&self, location_id: &str) -> Vec<HourlyHistoryEntry>;
    async fn write(&self, location_id: &str, entry: HourlyHistoryEntry);
}

/// Inserts `entry` into `entries` keyed by hour (last-write-wins), re-sorts
/// descending by timestamp, and truncates to [`MAX_HISTORY_ENTRIES`]. Shared
/// by every backend so the truncation/ordering invariant (§3/§8 property 5)
/// lives in exactly one place.
pub fn apply_write(entries: &mut Vec<HourlyHistoryEntry>, entry: HourlyHistoryEntry) {
    entries.retain(|e| e.hour_ts != entry.hour_ts);
    entries.push(entry);
    entries.sort_by(|a, b| b.hour_ts.cmp(&a.hour_ts));
    entries.truncate(MAX_HISTORY_ENTRIES);
}

/// Builds a history entry's pollutant map from a fused-concentration map
/// (convenience used by the scheduler after each fusion cycle).
pub fn entry_from_fused(
    hour_ts: DateTime<Utc>,
    fused: &HashMap<Pollutant, crate::models::FusedConcentration>,
) -> HourlyHistoryEntry {
    let pollutants = fused
        .iter()
        .map(|(pollutant, fc)| {
            let source = fc.sources_used.first().cloned().unwrap_or_default();
            (*pollutant, crate::models::HistoricalPollutantValue {
                value: fc.value,
                units: fc.units.to_string(),
                source,
                quality: crate::models::Quality::Good,
                bias_corrected: fc.bias_correction_applied,
            })
        })
        .collect();
    HourlyHistoryEntry { hour_ts, pollutants }
}

/// In-memory backend: one `Vec<HourlyHistoryEntry>` per location behind a
/// mutex (§5: "a single mutex around its in-memory view is sufficient given
/// the update rate", the same reasoning the priority index's in-memory view
/// relies on).
#[derive(Default)]
pub struct InMemoryHistoryStore {
    by_location: Mutex<HashMap<String, Vec<HourlyHistoryEntry>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn read(&self, location_id: &str) -> Vec<HourlyHistoryEntry> {
        self.by_location.lock().unwrap().get(location_id).cloned().unwrap_or_default()
    }

    async fn write(&self, location_id: &str, entry: HourlyHistoryEntry) {
        let mut guard = self.by_location.lock().unwrap();
        let entries = guard.entry(location_id.to_string()).or_default();
        apply_write(entries, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoricalPollutantValue;
    use chrono::Duration;

    fn entry(hour_ts: DateTime<Utc>) -> HourlyHistoryEntry {
        let mut pollutants = HashMap::new();
        pollutants.insert(Pollutant::Pm25, HistoricalPollutantValue {
            value: 10.0,
            units: "ug/m3".to_string(),
            source: "ground_a".to_string(),
            quality: crate::models::Quality::Good,
            bias_corrected: false,
        });
        HourlyHistoryEntry { hour_ts, pollutants }
    }

    /// Property 5 (§8): after any sequence of writes, history has <=25
    /// entries, strictly decreasing timestamps, no duplicate hour keys.
    #[tokio::test]
    async fn truncates_to_twenty_five_and_stays_sorted() {
        let store = InMemoryHistoryStore::new();
        let base = Utc::now();
        for i in 0..40 {
            store.write("loc", entry(base - Duration::hours(i))).await;
        }
        let history = store.read("loc").await;
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        for pair in history.windows(2) {
            assert!(pair[0].hour_ts > pair[1].hour_ts);
        }
    }

    /// §4.5/§8 property 6: idempotent on repeated writes for the same hour.
    #[tokio::test]
    async fn same_hour_write_is_last_write_wins() {
        let store = InMemoryHistoryStore::new();
        let hour = Utc::now();
        store.write("loc", entry(hour)).await;
        let mut second = entry(hour);
        second.pollutants.get_mut(&Pollutant::Pm25).unwrap().value = 99.0;
        store.write("loc", second).await;

        let history = store.read("loc").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pollutants[&Pollutant::Pm25].value, 99.0);
    }

    #[tokio::test]
    async fn unknown_location_returns_empty() {
        let store = InMemoryHistoryStore::new();
        assert!(store.read("nowhere").await.is_empty());
    }
}
