//! Location prioritiser (C8, §4.8), grounded in
//! `original_source/backend/processors/location_optimizer.py`'s
//! `SmartLocationOptimizer`: alert subscriptions and search telemetry
//! rolled into a single score, with `ShouldCollect` gating how often a
//! location is refreshed.
//!
//! The in-memory view here is read-mostly and updated only by user-facing
//! registration calls and `mark_collected` (§5: "a single mutex around its
//! in-memory view is sufficient given the update rate").

use crate::models::{haversine_km, location_id, PriorityEntry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// §4.8 `RegisterSearch`: "bump `user_demand_boost` up to +1.2".
const SEARCH_BOOST_CAP: f64 = 1.2;
/// §4.8 `RegisterAlert`: "bump boost +2.0".
const ALERT_BOOST: f64 = 2.0;
/// §4.8 `ShouldCollect`: "search_count >= 3" gate for search-only locations.
const SEARCH_ONLY_MIN_COUNT: i64 = 3;
/// Baseline collection interval in seconds for a location with zero alert
/// subscribers, grounded in `location_optimizer.py`'s `3600 // (1 +
/// alert_users)` and its `max(1800, ...)` floor.
const BASE_INTERVAL_SECONDS: i64 = 3600;
const MIN_ALERT_INTERVAL_SECONDS: i64 = 1800;

/// The priority index: alert subscriptions keyed by location, search
/// telemetry keyed by location, and the merged [`PriorityEntry`] view
/// derived from both (§3/§4.8).
#[derive(Default)]
pub struct PriorityIndex {
    entries: Mutex<HashMap<String, PriorityEntry>>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for<'a>(
        guard: &'a mut HashMap<String, PriorityEntry>,
        lat: f64,
        lon: f64,
        city: &str,
    ) -> &'a mut PriorityEntry {
        let id = location_id(lat, lon);
        guard.entry(id.clone()).or_insert_with(|| PriorityEntry {
            location_id: id,
            city: city.to_string(),
            latitude: lat,
            longitude: lon,
            priority_score: 0.0,
            last_collected: None,
            alert_user_count: 0,
            search_count: 0,
            user_demand_boost: 0.0,
        })
    }

    /// §4.8 `RegisterSearch(lat, lon, city)`: upsert the search counter and
    /// bump the demand boost, capped at +1.2.
    pub fn register_search(&self, lat: f64, lon: f64, city: &str) {
        let mut guard = self.entries.lock().unwrap();
        let entry = Self::entry_for(&mut guard, lat, lon, city);
        entry.search_count += 1;
        entry.user_demand_boost = (entry.user_demand_boost + 0.1).min(SEARCH_BOOST_CAP);
        entry.priority_score = entry.compute_score();
    }

    /// §4.8 `RegisterAlert(user, locations[], ...)`: pins every named
    /// location into the collection set and raises its boost to +2.0. The
    /// channel/threshold/preference payload is an external collaborator's
    /// concern (§1) -- only the location pin and score are modeled here.
    pub fn register_alert(&self, user_locations: &[(f64, f64, String)]) {
        let mut guard = self.entries.lock().unwrap();
        for (lat, lon, city) in user_locations {
            let entry = Self::entry_for(&mut guard, *lat, *lon, city);
            entry.alert_user_count += 1;
            entry.user_demand_boost = entry.user_demand_boost.max(ALERT_BOOST);
            entry.priority_score = entry.compute_score();
        }
    }

    /// §4.8 `PriorityLocations(limit)`: up to `limit` entries ordered by
    /// score descending.
    pub fn priority_locations(&self, limit: usize) -> Vec<PriorityEntry> {
        let guard = self.entries.lock().unwrap();
        let mut entries: Vec<PriorityEntry> = guard.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.priority_score
                .partial_cmp(&a.priority_score)
                .unwrap()
                .then_with(|| b.alert_user_count.cmp(&a.alert_user_count))
        });
        entries.truncate(limit);
        entries
    }

    /// §4.8 `ShouldCollect(location_id)`: true if any alert subscriber
    /// exists and enough time has elapsed since the last collection, scaled
    /// down as subscriber count rises; or if enough searches have
    /// accumulated and enough time has elapsed; false otherwise.
    pub fn should_collect(&self, location_id_key: &str, now: DateTime<Utc>) -> bool {
        let guard = self.entries.lock().unwrap();
        let Some(entry) = guard.get(location_id_key) else { return false };

        let elapsed_seconds = entry.last_collected.map(|t| (now - t).num_seconds()).unwrap_or(i64::MAX);

        if entry.alert_user_count > 0 {
            let interval = (BASE_INTERVAL_SECONDS / (1 + entry.alert_user_count)).max(MIN_ALERT_INTERVAL_SECONDS);
            return elapsed_seconds >= interval;
        }

        if entry.search_count >= SEARCH_ONLY_MIN_COUNT {
            return elapsed_seconds >= BASE_INTERVAL_SECONDS;
        }

        false
    }

    /// §4.8 `MarkCollected(location_id, quality)`.
    pub fn mark_collected(&self, location_id_key: &str, now: DateTime<Utc>) {
        let mut guard = self.entries.lock().unwrap();
        if let Some(entry) = guard.get_mut(location_id_key) {
            entry.last_collected = Some(now);
        }
    }

    /// §4.8 `FindNearest(lat, lon, radius_km)`: bounding-box pre-filter
    /// followed by Haversine refinement. Returns the closest pinned or
    /// searched location within the radius, if any.
    pub fn find_nearest(&self, lat: f64, lon: f64, radius_km: f64) -> Option<PriorityEntry> {
        let guard = self.entries.lock().unwrap();
        // Cheap bounding-box pre-filter: one degree of latitude is ~111km,
        // so widen the box generously before the exact Haversine check.
        let box_deg = (radius_km / 111.0) * 1.5;

        guard
            .values()
            .filter(|e| (e.latitude - lat).abs() <= box_deg && (e.longitude - lon).abs() <= box_deg)
            .map(|e| (haversine_km(lat, lon, e.latitude, e.longitude), e))
            .filter(|(distance, _)| *distance <= radius_km)
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
            .map(|(_, e)| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6 (§8): A carries the most alert subscribers, C fewer alerts plus
    /// some search volume, B only search volume -- priority order should
    /// come out A, C, B.
    #[test]
    fn s6_priority_order_matches_scenario() {
        let index = PriorityIndex::new();
        index.register_alert(&[(1.0, 1.0, "A".to_string()); 2]);
        for _ in 0..10 {
            index.register_search(2.0, 2.0, "C");
        }
        index.register_alert(&[(2.0, 2.0, "C".to_string())]);
        for _ in 0..40 {
            index.register_search(3.0, 3.0, "B");
        }

        let ranked = index.priority_locations(10);
        let cities: Vec<&str> = ranked.iter().map(|e| e.city.as_str()).collect();
        assert_eq!(cities, vec!["A", "C", "B"]);
    }

    #[test]
    fn should_collect_false_with_no_history() {
        let index = PriorityIndex::new();
        let id = location_id(10.0, 10.0);
        assert!(!index.should_collect(&id, Utc::now()));
    }

    #[test]
    fn should_collect_true_for_alert_location_past_interval() {
        let index = PriorityIndex::new();
        index.register_alert(&[(10.0, 10.0, "X".to_string())]);
        let id = location_id(10.0, 10.0);
        let now = Utc::now();
        index.mark_collected(&id, now - chrono::Duration::hours(2));
        assert!(index.should_collect(&id, now));
    }

    #[test]
    fn should_collect_false_for_search_only_below_threshold() {
        let index = PriorityIndex::new();
        index.register_search(20.0, 20.0, "Y");
        index.register_search(20.0, 20.0, "Y");
        let id = location_id(20.0, 20.0);
        assert!(!index.should_collect(&id, Utc::now()));
    }

    #[test]
    fn find_nearest_picks_closest_within_radius() {
        let index = PriorityIndex::new();
        index.register_search(40.7128, -74.0060, "New York");
        index.register_search(40.73, -73.99, "Near NYC");
        let found = index.find_nearest(40.71, -74.00, 50.0).unwrap();
        assert!(found.city == "New York" || found.city == "Near NYC");
    }

    #[test]
    fn find_nearest_returns_none_outside_radius() {
        let index = PriorityIndex::new();
        index.register_search(40.7128, -74.0060, "New York");
        assert!(index.find_nearest(0.0, 0.0, 10.0).is_none());
    }
}
