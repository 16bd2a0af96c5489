//! Concurrent collector (C3, §4.3): fans every registered source adapter out
//! in parallel for one (lat, lon), bounds each adapter call with a soft
//! per-adapter timeout and the whole fan-out with a hard deadline, and merges
//! whatever comes back into a single [`MergedObservation`].
//!
//! Grounded in `examples/tworjaga-Cherenkov/crates/cherenkov-ingest/src/pipeline.rs`'s
//! `tokio::time::timeout` + `futures::future::join_all` fan-out idiom, reused
//! here over the five source adapters instead of Cherenkov's detector feeds.

use crate::adapters::SourceAdapter;
use crate::models::{MergedObservation, SourceDiagnostics};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// §4.3: "each adapter call is bounded by a 30s soft timeout".
pub const PER_ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);
/// §4.3: "the fan-out as a whole is bounded by a 60s hard deadline".
pub const TOTAL_DEADLINE: Duration = Duration::from_secs(60);

/// Runs every adapter in `adapters` concurrently for `(lat, lon)` and folds
/// the results into a [`MergedObservation`]. A per-adapter timeout is
/// isolated to that adapter's diagnostics -- one slow or dead source never
/// blocks or fails the others (§4.3, §6).
pub async fn collect(adapters: &[Arc<dyn SourceAdapter>], lat: f64, lon: f64, now: DateTime<Utc>) -> MergedObservation {
    let futures = adapters.iter().cloned().map(|adapter| async move {
        let source_id = adapter.source_id();
        match tokio::time::timeout(PER_ADAPTER_TIMEOUT, adapter.fetch(lat, lon, now)).await {
            Ok(output) => (source_id, output),
            Err(_) => {
                let mut diagnostics = SourceDiagnostics::default();
                diagnostics.latency_ms = PER_ADAPTER_TIMEOUT.as_millis() as u64;
                diagnostics.errors.push(format!("{source_id} timed out after {PER_ADAPTER_TIMEOUT:?}"));
                (source_id, crate::models::AdapterOutput { diagnostics, ..Default::default() })
            },
        }
    });

    let outputs = match tokio::time::timeout(TOTAL_DEADLINE, futures::future::join_all(futures)).await {
        Ok(outputs) => outputs,
        Err(_) => {
            // The hard deadline tripped before every adapter settled. There is
            // no partial-result channel from `join_all` on timeout, so the
            // cycle comes back empty except for a diagnostic note; the next
            // scheduler tick retries the location.
            let mut observation = MergedObservation { timestamp: now, ..Default::default() };
            let mut diagnostics = SourceDiagnostics::default();
            diagnostics.errors.push(format!("collection cycle exceeded {TOTAL_DEADLINE:?} hard deadline"));
            observation.diagnostics.insert("collector".to_string(), diagnostics);
            return observation;
        },
    };

    let mut observation = MergedObservation { timestamp: now, ..Default::default() };
    for (source_id, output) in outputs {
        if !output.measurements.is_empty() {
            observation.sources.insert(source_id.to_string(), output.measurements);
        }
        if output.weather.is_some() && observation.weather.is_none() {
            observation.weather = output.weather;
        }
        observation.diagnostics.insert(source_id.to_string(), output.diagnostics);
    }
    observation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdapterOutput, Pollutant, Quality, RawPollutantMeasurement, Unit};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FastAdapter;
    #[async_trait]
    impl SourceAdapter for FastAdapter {
        fn source_id(&self) -> &'static str {
            "ground_a"
        }

        async fn fetch(&self, _lat: f64, _lon: f64, now: DateTime<Utc>) -> AdapterOutput {
            let mut measurements = HashMap::new();
            measurements.insert(Pollutant::Pm25, RawPollutantMeasurement {
                pollutant: Pollutant::Pm25,
                value: 10.0,
                units: Unit::MicrogramsPerCubicMeter,
                source_tag: "ground_a".to_string(),
                quality: Quality::Good,
                uncertainty_hint: None,
                observed_at: now,
            });
            AdapterOutput { measurements, weather: None, diagnostics: Default::default() }
        }
    }

    struct SlowAdapter;
    #[async_trait]
    impl SourceAdapter for SlowAdapter {
        fn source_id(&self) -> &'static str {
            "satellite"
        }

        async fn fetch(&self, _lat: f64, _lon: f64, _now: DateTime<Utc>) -> AdapterOutput {
            tokio::time::sleep(Duration::from_secs(120)).await;
            AdapterOutput::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_timed_out_adapter_does_not_block_the_others() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(FastAdapter), Arc::new(SlowAdapter)];
        let now = Utc::now();
        let handle = tokio::spawn(async move { collect(&adapters, 40.0, -74.0, now).await });

        tokio::time::advance(Duration::from_secs(31)).await;
        let observation = handle.await.unwrap();

        assert!(observation.sources.contains_key("ground_a"));
        assert!(!observation.sources.contains_key("satellite"));
        assert!(observation.diagnostics["satellite"].errors.iter().any(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn empty_adapter_list_returns_empty_observation() {
        let adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        let observation = collect(&adapters, 0.0, 0.0, Utc::now()).await;
        assert!(observation.sources.is_empty());
    }
}
