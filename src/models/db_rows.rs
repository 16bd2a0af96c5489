//! Flat row types persisted by the persistence layer (C7), mirroring
//! `comprehensive_aqi_hourly` and `daily_aqi_trends` exactly (§3/§4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One EPA pollutant's triple as stored per row: fused concentration, its
/// per-pollutant AQI, and whether bias correction was applied upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollutantColumn {
    pub concentration: Option<f64>,
    pub aqi: Option<i32>,
    pub bias_corrected: bool,
}

/// `comprehensive_aqi_hourly` row. Unique key `(city, timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveAqiHourlyRow {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_id: String,
    pub timestamp: DateTime<Utc>,
    pub overall_aqi: i32,
    pub category: String,
    pub dominant_pollutant: String,
    pub health_message: String,
    pub pm25: PollutantColumn,
    pub pm10: PollutantColumn,
    pub o3: PollutantColumn,
    pub no2: PollutantColumn,
    pub so2: PollutantColumn,
    pub co: PollutantColumn,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub why_today: String,
    /// Structured provenance (per-pollutant sources/weights), persisted as JSON
    /// rather than the source's Python-repr text blob (design note, §9).
    pub data_sources: serde_json::Value,
}

/// `daily_aqi_trends` row. Unique key `(city, date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyTrendRow {
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub location_id: String,
    pub date: chrono::NaiveDate,
    pub avg_overall_aqi: f64,
    pub avg_pm25: Option<f64>,
    pub avg_pm25_aqi: Option<f64>,
    pub avg_pm10: Option<f64>,
    pub avg_pm10_aqi: Option<f64>,
    pub avg_o3: Option<f64>,
    pub avg_o3_aqi: Option<f64>,
    pub avg_no2: Option<f64>,
    pub avg_no2_aqi: Option<f64>,
    pub avg_so2: Option<f64>,
    pub avg_so2_aqi: Option<f64>,
    pub avg_co: Option<f64>,
    pub avg_co_aqi: Option<f64>,
    pub avg_temperature_c: Option<f64>,
    pub avg_humidity_pct: Option<f64>,
    pub dominant_pollutant: String,
    pub category: String,
    /// `hourly_points_used / 24`.
    pub completeness: f64,
}
