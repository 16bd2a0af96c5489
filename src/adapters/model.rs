//! Atmospheric-model adapter (§4.2): one HTTP request per pollutant against
//! the GEOS-CF chemistry forecast API, fanned out through a bounded pool of
//! 5 concurrent requests, plus a sibling meteorology request for the five
//! weather fields the model surfaces (§6).

use super::{SourceAdapter, SOURCE_MODEL};
use crate::models::{AdapterOutput, Pollutant, Quality, RawPollutantMeasurement, SourceDiagnostics, Unit, WeatherContext};
use crate::retry::with_backoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// §4.3: "a bounded worker pool of 5" for the model adapter's per-pollutant calls.
const MAX_CONCURRENT_REQUESTS: usize = 5;

/// Seven GEOS-CF aerosol species summed into total PM2.5 (§4.2, grounded in
/// `global_realtime_collector.py`'s `pm25_components` list). At least 5 of
/// the 7 must be present for the sum to be accepted.
const PM25_COMPONENTS: [&str; 7] = [
    "PM25bc_RH35_GCC",
    "PM25du_RH35_GCC",
    "PM25ni_RH35_GCC",
    "PM25oc_RH35_GCC",
    "PM25ss_RH35_GCC",
    "PM25su_RH35_GCC",
    "PM25soa_RH35_GCC",
];
const PM25_MIN_COMPONENTS: usize = 5;

struct Species {
    /// GEOS-CF chemistry endpoint path segment.
    endpoint: &'static str,
    pollutant: Pollutant,
    /// Units the raw value arrives in; `None` means the species needs
    /// per-component handling (PM2.5).
    native_unit: Option<Unit>,
}

const SPECIES: [Species; 5] = [
    Species { endpoint: "no2", pollutant: Pollutant::No2, native_unit: Some(Unit::Ppb) },
    Species { endpoint: "o3", pollutant: Pollutant::O3, native_unit: Some(Unit::Ppb) },
    Species { endpoint: "co", pollutant: Pollutant::Co, native_unit: None }, // ppbv -> ppm, handled specially
    Species { endpoint: "so2", pollutant: Pollutant::So2, native_unit: Some(Unit::Ppb) },
    Species { endpoint: "pm25", pollutant: Pollutant::Pm25, native_unit: None },
];

const MET_PARAMS: [&str; 5] = ["T2M", "TPREC", "CLDTT", "U10M", "V10M"];

#[derive(Debug, Deserialize)]
struct ChemistryResponse {
    time: Vec<String>,
    values: HashMap<String, Vec<Option<f64>>>,
}

pub struct ModelAdapter {
    client: Client,
    base_url: String,
}

impl ModelAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn url_for(&self, species: &str, lat: f64, lon: f64) -> String {
        format!("{}/{}/{:.1}x{:.1}/latest/", self.base_url, species, lat, lon)
    }

    async fn fetch_json(&self, url: &str) -> Result<ChemistryResponse, String> {
        with_backoff(3, Duration::from_millis(200), || async {
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| e.to_string())?
                .json::<ChemistryResponse>()
                .await
                .map_err(|e| e.to_string())
        })
        .await
    }

    /// Finds the index whose ISO8601 timestamp is closest to `now` in UTC (§4.2).
    fn closest_index(times: &[String], now: DateTime<Utc>) -> Option<usize> {
        times
            .iter()
            .enumerate()
            .filter_map(|(i, t)| DateTime::parse_from_rfc3339(t).ok().map(|dt| (i, dt.with_timezone(&Utc))))
            .min_by_key(|(_, dt)| (*dt - now).num_seconds().abs())
            .map(|(i, _)| i)
    }

    async fn fetch_simple_species(
        &self,
        species: &Species,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
    ) -> Result<RawPollutantMeasurement, String> {
        let url = self.url_for(species.endpoint, lat, lon);
        let resp = self.fetch_json(&url).await?;
        let idx = Self::closest_index(&resp.time, now).ok_or("empty time series")?;
        let series = resp.values.get(species.endpoint).ok_or("missing species in response")?;
        let raw = series.get(idx).copied().flatten().ok_or("null value at closest index")?;

        // CO arrives as ppbv and is converted to ppm by the adapter (§4.2).
        let (value, units) = if species.pollutant == Pollutant::Co {
            (raw / 1000.0, Unit::Ppm)
        } else {
            (raw, species.native_unit.unwrap_or(Unit::Ppb))
        };

        Ok(RawPollutantMeasurement {
            pollutant: species.pollutant,
            value,
            units,
            source_tag: SOURCE_MODEL.to_string(),
            quality: Quality::Good,
            uncertainty_hint: None,
            observed_at: now,
        })
    }

    async fn fetch_pm25(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Result<RawPollutantMeasurement, String> {
        let url = self.url_for("pm25", lat, lon);
        let resp = self.fetch_json(&url).await?;
        let idx = Self::closest_index(&resp.time, now).ok_or("empty time series")?;

        let mut total = 0.0;
        let mut found = 0usize;
        for component in PM25_COMPONENTS {
            if let Some(series) = resp.values.get(component) {
                if let Some(Some(v)) = series.get(idx) {
                    total += v;
                    found += 1;
                }
            }
        }
        if found < PM25_MIN_COMPONENTS {
            return Err(format!("only {found}/{} PM2.5 components present", PM25_COMPONENTS.len()));
        }

        Ok(RawPollutantMeasurement {
            pollutant: Pollutant::Pm25,
            value: total,
            units: Unit::MicrogramsPerCubicMeter,
            source_tag: SOURCE_MODEL.to_string(),
            quality: Quality::Good,
            uncertainty_hint: None,
            observed_at: now,
        })
    }

    async fn fetch_weather(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Option<WeatherContext> {
        let mut responses = HashMap::new();
        for param in MET_PARAMS {
            let url = self.url_for(param, lat, lon);
            if let Ok(resp) = self.fetch_json(&url).await {
                if let Some(idx) = Self::closest_index(&resp.time, now) {
                    if let Some(series) = resp.values.get(param) {
                        if let Some(Some(v)) = series.get(idx) {
                            responses.insert(param, *v);
                        }
                    }
                }
            }
        }
        if responses.is_empty() {
            return None;
        }
        Some(WeatherContext {
            temperature_c: responses.get("T2M").map(|k| k - 273.15),
            humidity_pct: None,
            pressure_hpa: None,
            wind_speed_ms: match (responses.get("U10M"), responses.get("V10M")) {
                (Some(u), Some(v)) => Some((u * u + v * v).sqrt()),
                _ => None,
            },
            wind_direction_deg: match (responses.get("U10M"), responses.get("V10M")) {
                (Some(u), Some(v)) => Some(v.atan2(*u).to_degrees()),
                _ => None,
            },
            weather_code: None,
        })
    }
}

#[async_trait]
impl SourceAdapter for ModelAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_MODEL
    }

    async fn fetch(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> AdapterOutput {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
        let mut diagnostics = SourceDiagnostics::default();

        let species_futures = SPECIES.iter().map(|species| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = if species.pollutant == Pollutant::Pm25 {
                    self.fetch_pm25(lat, lon, now).await
                } else {
                    self.fetch_simple_species(species, lat, lon, now).await
                };
                (species.pollutant, result)
            }
        });
        let species_results = futures::future::join_all(species_futures).await;

        let mut measurements = HashMap::new();
        for (pollutant, result) in species_results {
            diagnostics.attempts += 1;
            match result {
                Ok(m) => {
                    measurements.insert(pollutant, m);
                },
                Err(reason) => {
                    diagnostics.errors.push(format!("{pollutant}: {reason}"));
                },
            }
        }

        // Weather fetch runs concurrently with nothing left in the species
        // pool to contend with, matching the original's "second request" (§4.2).
        let weather = self.fetch_weather(lat, lon, now).await;

        diagnostics.latency_ms = started.elapsed().as_millis() as u64;
        AdapterOutput { measurements, weather, diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_index_picks_nearest_timestamp() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let times = vec![
            "2024-06-01T10:00:00Z".to_string(),
            "2024-06-01T12:30:00Z".to_string(),
            "2024-06-01T13:00:00Z".to_string(),
        ];
        assert_eq!(ModelAdapter::closest_index(&times, now), Some(1));
    }

    #[test]
    fn closest_index_empty_series_is_none() {
        assert_eq!(ModelAdapter::closest_index(&[], Utc::now()), None);
    }
}
