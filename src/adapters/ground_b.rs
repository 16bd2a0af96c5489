//! Ground-station adapter B (§4.2): a global aggregator (WAQI-shaped API).
//! Performs a nine-point grid search (center + 4 cardinals + 4 diagonals at
//! +-0.5 degrees) in parallel, dedupes by station identifier, and for each
//! pollutant keeps the measurement with the smallest `(age_hours, distance)`
//! tuple. Also surfaces humidity/temperature/pressure/wind when available.

use super::{SourceAdapter, SOURCE_GROUND_B};
use crate::epa::aqi_to_concentration;
use crate::models::{AdapterOutput, Pollutant, Quality, RawPollutantMeasurement, SourceDiagnostics, WeatherContext};
use crate::retry::with_backoff;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// §4.3: "a bounded worker pool of 4" for the ground-aggregator grid search.
const MAX_CONCURRENT_REQUESTS: usize = 4;

/// §4.2: "a nine-point grid search around the target (center + 4 cardinals +
/// 4 diagonals at +-0.5 degrees)".
const SEARCH_RADIUS_DEG: f64 = 0.5;
const GRID_OFFSETS: [(f64, f64); 9] = [
    (0.0, 0.0),
    (SEARCH_RADIUS_DEG, 0.0),
    (-SEARCH_RADIUS_DEG, 0.0),
    (0.0, SEARCH_RADIUS_DEG),
    (0.0, -SEARCH_RADIUS_DEG),
    (SEARCH_RADIUS_DEG, SEARCH_RADIUS_DEG),
    (SEARCH_RADIUS_DEG, -SEARCH_RADIUS_DEG),
    (-SEARCH_RADIUS_DEG, SEARCH_RADIUS_DEG),
    (-SEARCH_RADIUS_DEG, -SEARCH_RADIUS_DEG),
];

#[derive(Debug, Deserialize)]
struct WaqiEnvelope {
    status: String,
    data: Option<WaqiData>,
}

#[derive(Debug, Deserialize)]
struct WaqiData {
    idx: i64,
    city: WaqiCity,
    time: WaqiTime,
    iaqi: HashMap<String, WaqiIaqiValue>,
}

#[derive(Debug, Deserialize)]
struct WaqiCity {
    geo: (f64, f64),
}

#[derive(Debug, Deserialize)]
struct WaqiTime {
    v: i64, // unix seconds
}

#[derive(Debug, Deserialize)]
struct WaqiIaqiValue {
    v: f64,
}

fn iaqi_key_to_pollutant(key: &str) -> Option<Pollutant> {
    match key {
        "pm25" => Some(Pollutant::Pm25),
        "pm10" => Some(Pollutant::Pm10),
        "o3" => Some(Pollutant::O3),
        "no2" => Some(Pollutant::No2),
        "so2" => Some(Pollutant::So2),
        "co" => Some(Pollutant::Co),
        _ => None,
    }
}

struct StationReading {
    station_id: i64,
    distance_km: f64,
    age_hours: f64,
    pollutants: HashMap<Pollutant, f64>,
    weather: WeatherContext,
}

pub struct GroundBAdapter {
    client: Client,
    token: String,
}

impl GroundBAdapter {
    pub fn new(client: Client, token: impl Into<String>) -> Self {
        Self { client, token: token.into() }
    }

    async fn query_grid_point(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Option<StationReading> {
        let url = format!("https://api.waqi.info/feed/geo:{lat};{lon}/");
        let envelope: WaqiEnvelope = with_backoff(3, Duration::from_millis(200), || async {
            self.client
                .get(&url)
                .query(&[("token", self.token.as_str())])
                .send()
                .await
                .map_err(|e| e.to_string())?
                .json::<WaqiEnvelope>()
                .await
                .map_err(|e| e.to_string())
        })
        .await
        .ok()?;
        if envelope.status != "ok" {
            return None;
        }
        let data = envelope.data?;

        let distance_km = crate::models::haversine_km(lat, lon, data.city.geo.0, data.city.geo.1);
        let observed_at = Utc.timestamp_opt(data.time.v, 0).single().unwrap_or(now);
        let age_hours = (now - observed_at).num_minutes() as f64 / 60.0;

        let mut pollutants = HashMap::new();
        for (key, value) in &data.iaqi {
            if let Some(pollutant) = iaqi_key_to_pollutant(key) {
                pollutants.insert(pollutant, value.v);
            }
        }

        let weather = WeatherContext {
            temperature_c: data.iaqi.get("t").map(|v| v.v),
            humidity_pct: data.iaqi.get("h").map(|v| v.v),
            pressure_hpa: data.iaqi.get("p").map(|v| v.v),
            wind_speed_ms: data.iaqi.get("w").map(|v| v.v),
            wind_direction_deg: None,
            weather_code: None,
        };

        Some(StationReading { station_id: data.idx, distance_km, age_hours: age_hours.max(0.0), pollutants, weather })
    }
}

#[async_trait]
impl SourceAdapter for GroundBAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_GROUND_B
    }

    async fn fetch(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> AdapterOutput {
        let started = Instant::now();
        let mut diagnostics = SourceDiagnostics::default();

        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
        let grid_futures = GRID_OFFSETS.iter().map(|(dlat, dlon)| {
            let semaphore = Arc::clone(&semaphore);
            let (lat, lon) = (lat + dlat, lon + dlon);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.query_grid_point(lat, lon, now).await
            }
        });
        diagnostics.attempts += GRID_OFFSETS.len() as u32;
        let grid_results: Vec<_> = futures::future::join_all(grid_futures).await.into_iter().flatten().collect();

        // Dedupe by station identifier -- the same station can be the
        // nearest point from more than one grid offset (§4.2).
        let mut by_station: HashMap<i64, StationReading> = HashMap::new();
        for reading in grid_results {
            by_station.entry(reading.station_id).or_insert(reading);
        }

        if by_station.is_empty() {
            diagnostics.errors.push("empty grid search".to_string());
            diagnostics.latency_ms = started.elapsed().as_millis() as u64;
            return AdapterOutput { measurements: HashMap::new(), weather: None, diagnostics };
        }

        // §4.2: "keeps the measurement with the smallest (age_hours, distance) tuple".
        let mut best: HashMap<Pollutant, (f64, f64, f64)> = HashMap::new(); // -> (age, distance, value)
        for reading in by_station.values() {
            for (&pollutant, &value) in &reading.pollutants {
                let key = (reading.age_hours, reading.distance_km);
                best.entry(pollutant)
                    .and_modify(|(age, dist, v)| {
                        if (reading.age_hours, reading.distance_km) < (*age, *dist) {
                            *age = key.0;
                            *dist = key.1;
                            *v = value;
                        }
                    })
                    .or_insert((key.0, key.1, value));
            }
        }

        let mut measurements = HashMap::new();
        for (pollutant, (_, _, aqi_value)) in best {
            match aqi_to_concentration(pollutant, aqi_value.max(0.0) as u32) {
                Ok(concentration) => {
                    measurements.insert(pollutant, RawPollutantMeasurement {
                        pollutant,
                        value: concentration,
                        units: pollutant.canonical_unit(),
                        source_tag: SOURCE_GROUND_B.to_string(),
                        quality: Quality::Good,
                        uncertainty_hint: None,
                        observed_at: now,
                    });
                },
                Err(e) => diagnostics.errors.push(e.to_string()),
            }
        }

        // Weather context from whichever station is nearest overall (§4.2:
        // "the persistence layer uses them when the model adapter omits them").
        let weather = by_station
            .values()
            .min_by(|a, b| a.distance_km.partial_cmp(&b.distance_km).unwrap())
            .map(|r| r.weather.clone());

        diagnostics.latency_ms = started.elapsed().as_millis() as u64;
        AdapterOutput { measurements, weather, diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_offsets_cover_nine_points_including_center() {
        assert_eq!(GRID_OFFSETS.len(), 9);
        assert!(GRID_OFFSETS.contains(&(0.0, 0.0)));
        assert!(GRID_OFFSETS.contains(&(0.5, 0.5)));
        assert!(GRID_OFFSETS.contains(&(-0.5, -0.5)));
    }

    #[test]
    fn iaqi_key_mapping_covers_epa_pollutants() {
        assert_eq!(iaqi_key_to_pollutant("pm25"), Some(Pollutant::Pm25));
        assert_eq!(iaqi_key_to_pollutant("co"), Some(Pollutant::Co));
        assert_eq!(iaqi_key_to_pollutant("unknown"), None);
    }
}
