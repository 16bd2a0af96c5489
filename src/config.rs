//! Process-wide configuration loaded once at start-up from environment variables.
//!
//! Mirrors the teacher's `dotenv` + `std::env::var` pattern (see the original
//! `cli/commands.rs`), but centralizes every variable behind a single
//! `Config::from_env` so the scheduler, the CLI, and the adapters share one
//! source of truth instead of reaching for `env::var` ad hoc. Bearer tokens and
//! API keys loaded here are treated as process-wide immutables (§5).

use crate::error::{AppError, Result};

/// North America bounding box used by the scheduler (§4.9) to decide whether a
/// location's collection goes through the satellite adapter.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}

/// Rough North America bounds used by the original pipeline's hourly collector:
/// 20-70 degrees north, -170 to -50 degrees (west negative).
pub const DEFAULT_NA_BBOX: BoundingBox = BoundingBox {
    lat_min: 20.0,
    lat_max: 70.0,
    lon_min: -170.0,
    lon_max: -50.0,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub airnow_api_key: String,
    pub waqi_token: String,
    pub earthdata_bearer_token: String,
    pub tempo_s3_bucket: String,
    pub model_api_base: String,
    pub weather_api_base: String,
    pub na_bbox: BoundingBox,
}

impl Config {
    /// Loads configuration from the environment, failing fast with
    /// `AppError::ConfigurationFatal` when a required variable is absent. Only
    /// this error kind is allowed to propagate all the way to process exit (§7).
    pub fn from_env() -> Result<Self> {
        // Best-effort .env loading, same as the teacher's main/commands setup.
        let _ = dotenv::dotenv();

        let database_url = required_env("DATABASE_URL")?;
        let airnow_api_key = required_env("AIRNOW_API_KEY")?;
        let waqi_token = required_env("WAQI_TOKEN")?;
        let earthdata_bearer_token = required_env("EARTHDATA_BEARER_TOKEN")?;
        let tempo_s3_bucket = std::env::var("TEMPO_S3_BUCKET")
            .unwrap_or_else(|_| "asdc-prod-protected".to_string());
        let model_api_base = std::env::var("MODEL_API_BASE")
            .unwrap_or_else(|_| "https://fluid.nccs.nasa.gov/cfapi/fcast/chm/v1".to_string());
        let weather_api_base = std::env::var("WEATHER_API_BASE")
            .unwrap_or_else(|_| "https://api.open-meteo.com/v1/gfs".to_string());
        let na_bbox = parse_na_bbox(std::env::var("NA_BBOX").ok());

        Ok(Self {
            database_url,
            airnow_api_key,
            waqi_token,
            earthdata_bearer_token,
            tempo_s3_bucket,
            model_api_base,
            weather_api_base,
            na_bbox,
        })
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        AppError::ConfigurationFatal(format!("missing required environment variable {key}"))
    })
}

/// Parses `"lat_min,lat_max,lon_min,lon_max"`, falling back to the default box
/// on absence or malformed input.
fn parse_na_bbox(raw: Option<String>) -> BoundingBox {
    let Some(raw) = raw else {
        return DEFAULT_NA_BBOX;
    };
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return DEFAULT_NA_BBOX;
    }
    let parsed: Option<Vec<f64>> = parts.iter().map(|p| p.parse::<f64>().ok()).collect();
    match parsed {
        Some(v) => BoundingBox {
            lat_min: v[0],
            lat_max: v[1],
            lon_min: v[2],
            lon_max: v[3],
        },
        None => DEFAULT_NA_BBOX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn na_bbox_contains_nyc() {
        assert!(DEFAULT_NA_BBOX.contains(40.7128, -74.0060));
    }

    #[test]
    fn na_bbox_excludes_london() {
        assert!(!DEFAULT_NA_BBOX.contains(51.5074, -0.1278));
    }

    #[test]
    fn parse_na_bbox_falls_back_on_garbage() {
        let bbox = parse_na_bbox(Some("not,a,bbox".to_string()));
        assert_eq!(bbox.lat_min, DEFAULT_NA_BBOX.lat_min);
    }
}
