//! Scheduler (C9, §4.9): turns the priority index into actual collection
//! work. Each tick asks the priority index which locations are due, routes
//! North America locations through the satellite adapter (§4.2's TEMPO
//! coverage note), and runs the full per-location pipeline -- collect, fuse,
//! compute AQI, persist, mark collected -- sequentially so that no two
//! pipelines ever touch the same location's history/priority state at once.
//!
//! Grounded in `original_source/backend/collectors/smart_hourly_collector.py`'s
//! `run_once`/`run_forever` loop and `global_realtime_collector.py`'s
//! sequential per-location processing, built over `tokio::time::interval` +
//! `MissedTickBehavior::Skip` the way the teacher bounds its own polling loop.

use crate::adapters::SourceAdapter;
use crate::aqi;
use crate::collector;
use crate::config::BoundingBox;
use crate::db::{build_hourly_row, PersistenceSink};
use crate::error::{AppError, Result};
use crate::fusion;
use crate::history::{entry_from_fused, HistoryStore};
use crate::models::PriorityEntry;
use crate::priority::PriorityIndex;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// §4.9: bounds how many due locations one tick processes, so an overrunning
/// tick can't accumulate unbounded backlog before the next one is skipped.
pub const MAX_LOCATIONS_PER_TICK: usize = 50;
/// §4.9: hourly cadence, matching `smart_hourly_collector.py`'s name.
pub const TICK_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-tick counters (§4.9), logged after every run and surfaced by the
/// `serve` CLI command.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub locations_collected: u32,
    pub rows_stored: u32,
    pub daily_averages_created: u32,
    pub errors: u32,
    pub wall_time: Duration,
}

/// Orchestrates C2 (adapters) through C8 (priority) into one repeating loop.
pub struct Scheduler {
    base_adapters: Vec<Arc<dyn SourceAdapter>>,
    satellite_adapter: Arc<dyn SourceAdapter>,
    history: Arc<dyn HistoryStore>,
    priority: Arc<PriorityIndex>,
    persistence: Arc<dyn PersistenceSink>,
    na_bbox: BoundingBox,
    /// Guards against two concurrent pipelines touching the same location
    /// even though processing within a tick is itself sequential -- cheap
    /// insurance if a future change makes `tick` fan locations out (§8
    /// property 7).
    in_flight: Mutex<HashSet<String>>,
}

impl Scheduler {
    pub fn new(
        base_adapters: Vec<Arc<dyn SourceAdapter>>,
        satellite_adapter: Arc<dyn SourceAdapter>,
        history: Arc<dyn HistoryStore>,
        priority: Arc<PriorityIndex>,
        persistence: Arc<dyn PersistenceSink>,
        na_bbox: BoundingBox,
    ) -> Self {
        Self {
            base_adapters,
            satellite_adapter,
            history,
            priority,
            persistence,
            na_bbox,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one tick: asks the priority index which locations are due, then
    /// processes up to [`MAX_LOCATIONS_PER_TICK`] of them sequentially (§4.9).
    /// One location's failure is isolated -- it's counted and logged, never
    /// aborts the rest of the tick.
    pub async fn tick(&self) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();
        let now = Utc::now();

        let candidates = self.priority.priority_locations(MAX_LOCATIONS_PER_TICK * 4);
        let due: Vec<PriorityEntry> = candidates
            .into_iter()
            .filter(|entry| self.priority.should_collect(&entry.location_id, now))
            .take(MAX_LOCATIONS_PER_TICK)
            .collect();

        for entry in &due {
            match self.process_location(entry, now).await {
                Ok(stored) => {
                    report.locations_collected += 1;
                    if stored {
                        report.rows_stored += 1;
                    }
                },
                Err(e) => {
                    error!("scheduler: location {} failed: {}", entry.location_id, e);
                    report.errors += 1;
                },
            }
        }

        report.wall_time = start.elapsed();
        info!(
            locations_collected = report.locations_collected,
            rows_stored = report.rows_stored,
            errors = report.errors,
            wall_time_ms = report.wall_time.as_millis() as u64,
            "tick complete"
        );
        report
    }

    /// Runs the daily rollup (§4.7/§4.9): for every known location, reads its
    /// hourly rows for `date` and upserts the resulting daily trend. Returns
    /// a report with `daily_averages_created` set.
    pub async fn run_daily_rollup(&self, date: NaiveDate) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        for entry in self.priority.priority_locations(usize::MAX) {
            match self
                .persistence
                .rollup_day(&entry.city, entry.latitude, entry.longitude, &entry.location_id, date)
                .await
            {
                Ok(Some(trend)) => match self.persistence.upsert_daily_trend(&trend).await {
                    Ok(()) => report.daily_averages_created += 1,
                    Err(e) => {
                        error!("failed to persist daily trend for {}: {}", entry.city, e);
                        report.errors += 1;
                    },
                },
                Ok(None) => {},
                Err(e) => {
                    error!("rollup failed for {}: {}", entry.city, e);
                    report.errors += 1;
                },
            }
        }

        report.wall_time = start.elapsed();
        report
    }

    /// Runs forever on an hourly cadence; a tick that overruns the interval
    /// causes the next one to be skipped rather than queued (§4.9).
    pub async fn run_forever(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn process_location(&self, entry: &PriorityEntry, now: DateTime<Utc>) -> Result<bool> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(entry.location_id.clone()) {
                return Err(AppError::PersistenceConflict(format!(
                    "location {} is already being processed",
                    entry.location_id
                )));
            }
        }

        let result = self.run_pipeline(entry, now).await;
        self.in_flight.lock().unwrap().remove(&entry.location_id);
        result
    }

    /// C3 -> C4 -> C6 -> C7 -> `MarkCollected` for one location (§4.9).
    async fn run_pipeline(&self, entry: &PriorityEntry, now: DateTime<Utc>) -> Result<bool> {
        let mut adapters = self.base_adapters.clone();
        if self.na_bbox.contains(entry.latitude, entry.longitude) {
            adapters.push(Arc::clone(&self.satellite_adapter));
        }

        let observation = collector::collect(&adapters, entry.latitude, entry.longitude, now).await;
        let fused = fusion::fuse(&observation);
        if fused.is_empty() {
            warn!("no pollutant data fused for location {}", entry.location_id);
            self.priority.mark_collected(&entry.location_id, now);
            return Ok(false);
        }

        let history = self.history.read(&entry.location_id).await;
        let Some(aqi_result) = aqi::compute(&fused, &history, observation.weather.as_ref()) else {
            warn!("no EPA-scored pollutant for location {}", entry.location_id);
            self.priority.mark_collected(&entry.location_id, now);
            return Ok(false);
        };

        self.history.write(&entry.location_id, entry_from_fused(now, &fused)).await;

        let row = build_hourly_row(
            &entry.city,
            entry.latitude,
            entry.longitude,
            &entry.location_id,
            now,
            &aqi_result,
            &fused,
            observation.weather.as_ref(),
        );
        self.persistence.upsert_hourly(&row).await?;

        self.priority.mark_collected(&entry.location_id, now);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NA_BBOX;
    use crate::history::InMemoryHistoryStore;
    use crate::models::{AdapterOutput, ComprehensiveAqiHourlyRow, Pollutant, Quality, RawPollutantMeasurement, Unit};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAdapter {
        pollutant: Pollutant,
        value: f64,
        units: Unit,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source_id(&self) -> &'static str {
            "ground_a"
        }

        async fn fetch(&self, _lat: f64, _lon: f64, now: DateTime<Utc>) -> AdapterOutput {
            let mut measurements = HashMap::new();
            measurements.insert(self.pollutant, RawPollutantMeasurement {
                pollutant: self.pollutant,
                value: self.value,
                units: self.units,
                source_tag: "ground_a".to_string(),
                quality: Quality::Good,
                uncertainty_hint: None,
                observed_at: now,
            });
            AdapterOutput { measurements, weather: None, diagnostics: Default::default() }
        }
    }

    struct EmptyAdapter;
    #[async_trait]
    impl SourceAdapter for EmptyAdapter {
        fn source_id(&self) -> &'static str {
            "satellite"
        }

        async fn fetch(&self, _lat: f64, _lon: f64, _now: DateTime<Utc>) -> AdapterOutput {
            AdapterOutput::default()
        }
    }

    #[derive(Default)]
    struct MockPersistence {
        upserts: AtomicUsize,
    }

    #[async_trait]
    impl PersistenceSink for MockPersistence {
        async fn upsert_hourly(&self, _row: &ComprehensiveAqiHourlyRow) -> Result<()> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn upsert_daily_trend(&self, _row: &crate::models::DailyTrendRow) -> Result<()> {
            Ok(())
        }

        async fn rollup_day(
            &self,
            _city: &str,
            _latitude: f64,
            _longitude: f64,
            _location_id: &str,
            _date: NaiveDate,
        ) -> Result<Option<crate::models::DailyTrendRow>> {
            Ok(None)
        }
    }

    fn scheduler(persistence: Arc<MockPersistence>) -> Scheduler {
        Scheduler::new(
            vec![Arc::new(StubAdapter { pollutant: Pollutant::Pm25, value: 20.0, units: Unit::MicrogramsPerCubicMeter })],
            Arc::new(EmptyAdapter),
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(PriorityIndex::new()),
            persistence,
            DEFAULT_NA_BBOX,
        )
    }

    #[tokio::test]
    async fn pipeline_stores_a_row_for_a_collectable_location() {
        let persistence = Arc::new(MockPersistence::default());
        let sched = scheduler(Arc::clone(&persistence));
        sched.priority.register_alert(&[(40.7128, -74.0060, "New York".to_string())]);

        let entry = sched.priority.priority_locations(1).into_iter().next().unwrap();
        let stored = sched.run_pipeline(&entry, Utc::now()).await.unwrap();

        assert!(stored);
        assert_eq!(persistence.upserts.load(Ordering::SeqCst), 1);
    }

    /// §8 property 7: no two concurrent pipelines share a location_id.
    #[tokio::test]
    async fn in_flight_guard_rejects_reentrant_processing() {
        let persistence = Arc::new(MockPersistence::default());
        let sched = scheduler(persistence);
        sched.priority.register_alert(&[(10.0, 10.0, "X".to_string())]);
        let entry = sched.priority.priority_locations(1).into_iter().next().unwrap();

        sched.in_flight.lock().unwrap().insert(entry.location_id.clone());
        let result = sched.process_location(&entry, Utc::now()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn satellite_adapter_only_used_inside_na_bbox() {
        let persistence = Arc::new(MockPersistence::default());
        let sched = scheduler(persistence);

        sched.priority.register_alert(&[(51.5074, -0.1278, "London".to_string())]);
        let entry = sched.priority.priority_locations(1).into_iter().next().unwrap();
        assert!(!sched.na_bbox.contains(entry.latitude, entry.longitude));

        let stored = sched.run_pipeline(&entry, Utc::now()).await.unwrap();
        assert!(stored); // ground adapter alone is still enough to produce a row
    }
}
