//! Weather adapter (§4.2/§6): the global-collector weather path against the
//! Open-Meteo GFS endpoint. Reports no pollutants; fusion ignores this
//! adapter entirely, but the persistence layer falls back to it when the
//! model adapter's meteorology sibling request came up empty (§4.2).

use super::{SourceAdapter, SOURCE_WEATHER};
use crate::models::{AdapterOutput, SourceDiagnostics, WeatherContext};
use crate::retry::with_backoff;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    current: OpenMeteoCurrent,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoCurrent {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    windspeed_10m: Option<f64>,
    winddirection_10m: Option<f64>,
    weather_code: Option<i32>,
}

pub struct WeatherAdapter {
    client: Client,
    base_url: String,
}

impl WeatherAdapter {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }
}

#[async_trait]
impl SourceAdapter for WeatherAdapter {
    fn source_id(&self) -> &'static str {
        SOURCE_WEATHER
    }

    async fn fetch(&self, lat: f64, lon: f64, _now: DateTime<Utc>) -> AdapterOutput {
        let started = Instant::now();
        let mut diagnostics = SourceDiagnostics::default();
        diagnostics.attempts += 1;

        let result = with_backoff(3, Duration::from_millis(200), || async {
            self.client
                .get(&self.base_url)
                .query(&[
                    ("latitude", lat.to_string()),
                    ("longitude", lon.to_string()),
                    (
                        "current",
                        "temperature_2m,relative_humidity_2m,windspeed_10m,winddirection_10m,weather_code".to_string(),
                    ),
                ])
                .send()
                .await
                .map_err(|e| e.to_string())?
                .json::<OpenMeteoResponse>()
                .await
                .map_err(|e| e.to_string())
        })
        .await;

        let weather = match result {
            Ok(parsed) => Some(WeatherContext {
                temperature_c: parsed.current.temperature_2m,
                humidity_pct: parsed.current.relative_humidity_2m,
                pressure_hpa: None,
                wind_speed_ms: parsed.current.windspeed_10m,
                wind_direction_deg: parsed.current.winddirection_10m,
                weather_code: parsed.current.weather_code,
            }),
            Err(e) => {
                diagnostics.errors.push(format!("request error: {e}"));
                None
            },
        };

        diagnostics.latency_ms = started.elapsed().as_millis() as u64;
        AdapterOutput { measurements: Default::default(), weather, diagnostics }
    }
}
