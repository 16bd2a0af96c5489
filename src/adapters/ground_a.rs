//! Ground-station adapter A (§4.2): a US-biased AQI network (AirNow-shaped
//! API). Starts from a 4-mile search radius and expands geometrically,
//! checking batches of four radii in parallel until any station returns
//! data. Stations report AQI, not concentration, so the inverse breakpoint
//! table converts each reading back to a concentration for fusion.

use super::{SourceAdapter, SOURCE_GROUND_A};
use crate::epa::aqi_to_concentration;
use crate::models::{AdapterOutput, Pollutant, Quality, RawPollutantMeasurement, SourceDiagnostics};
use crate::retry::with_backoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// §4.2: "geometrically (4, 5, 6, …, 50)"; §4.3: "checking several radii in
/// parallel batches of four".
const SEARCH_DISTANCES_MILES: [u32; 47] = {
    let mut distances = [0u32; 47];
    let mut i = 0;
    while i < 47 {
        distances[i] = 4 + i as u32;
        i += 1;
    }
    distances
};
const BATCH_SIZE: usize = 4;

#[derive(Debug, Deserialize)]
struct AirNowStation {
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
    #[serde(rename = "ParameterName")]
    parameter_name: String,
    #[serde(rename = "AQI")]
    aqi: i32,
}

fn parameter_to_pollutant(name: &str) -> Option<Pollutant> {
    match name.to_ascii_uppercase().as_str() {
        "PM2.5" | "PM25" => Some(Pollutant::Pm25),
        "PM10" => Some(Pollutant::Pm10),
        "O3" | "OZONE" => Some(Pollutant::O3),
        "NO2" => Some(Pollutant::No2),
        "SO2" => Some(Pollutant::So2),
        "CO" => Some(Pollutant::Co),
        _ => None,
    }
}

pub struct GroundAAdapter {
    client: Client,
    api_key: String,
}

impl GroundAAdapter {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into() }
    }

    async fn query_distance(&self, lat: f64, lon: f64, distance: u32) -> Vec<AirNowStation> {
        let url = "https://www.airnowapi.org/aq/observation/latLong/current/";
        let result = with_backoff(3, Duration::from_millis(200), || async {
            self.client
                .get(url)
                .query(&[
                    ("format", "application/json".to_string()),
                    ("latitude", lat.to_string()),
                    ("longitude", lon.to_string()),
                    ("distance", distance.to_string()),
                    ("API_KEY", self.api_key.clone()),
                ])
                .send()
                .await
                .map_err(|e| e.to_string())?
                .json::<Vec<AirNowStation>>()
                .await
                .map_err(|e| e.to_string())
        })
        .await;

        result.unwrap_or_default()
    }
}

#[async_trait]
impl SourceAdapter for GroundAAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_GROUND_A
    }

    async fn fetch(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> AdapterOutput {
        let started = Instant::now();
        let mut diagnostics = SourceDiagnostics::default();
        let mut stations: Vec<AirNowStation> = Vec::new();

        'search: for chunk in SEARCH_DISTANCES_MILES.chunks(BATCH_SIZE) {
            let batch_futures = chunk.iter().map(|&distance| {
                diagnostics.attempts += 1;
                self.query_distance(lat, lon, distance)
            });
            let batch_results = futures::future::join_all(batch_futures).await;
            for result in batch_results {
                if !result.is_empty() {
                    stations.extend(result);
                }
            }
            if !stations.is_empty() {
                break 'search;
            }
        }

        if stations.is_empty() {
            diagnostics.errors.push(format!("no stations found up to {} miles", SEARCH_DISTANCES_MILES.last().unwrap()));
            diagnostics.latency_ms = started.elapsed().as_millis() as u64;
            return AdapterOutput { measurements: HashMap::new(), weather: None, diagnostics };
        }

        // §4.2: "the closest station per pollutant wins".
        let mut closest: HashMap<Pollutant, (f64, &AirNowStation)> = HashMap::new();
        for station in &stations {
            let Some(pollutant) = parameter_to_pollutant(&station.parameter_name) else { continue };
            let distance_km = crate::models::haversine_km(lat, lon, station.latitude, station.longitude);
            closest
                .entry(pollutant)
                .and_modify(|(best_distance, best_station)| {
                    if distance_km < *best_distance {
                        *best_distance = distance_km;
                        *best_station = station;
                    }
                })
                .or_insert((distance_km, station));
        }

        let mut measurements = HashMap::new();
        for (pollutant, (_, station)) in closest {
            match aqi_to_concentration(pollutant, station.aqi.max(0) as u32) {
                Ok(concentration) => {
                    measurements.insert(pollutant, RawPollutantMeasurement {
                        pollutant,
                        value: concentration,
                        units: pollutant.canonical_unit(),
                        source_tag: SOURCE_GROUND_A.to_string(),
                        quality: Quality::Good,
                        uncertainty_hint: None,
                        observed_at: now,
                    });
                },
                Err(e) => diagnostics.errors.push(e.to_string()),
            }
        }

        diagnostics.latency_ms = started.elapsed().as_millis() as u64;
        AdapterOutput { measurements, weather: None, diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_mapping_handles_pm25_variants() {
        assert_eq!(parameter_to_pollutant("PM2.5"), Some(Pollutant::Pm25));
        assert_eq!(parameter_to_pollutant("PM25"), Some(Pollutant::Pm25));
        assert_eq!(parameter_to_pollutant("OZONE"), Some(Pollutant::O3));
        assert_eq!(parameter_to_pollutant("bogus"), None);
    }

    #[test]
    fn search_distances_start_at_four_and_end_at_fifty() {
        assert_eq!(SEARCH_DISTANCES_MILES[0], 4);
        assert_eq!(*SEARCH_DISTANCES_MILES.last().unwrap(), 50);
        assert_eq!(SEARCH_DISTANCES_MILES.len(), 47);
    }
}
