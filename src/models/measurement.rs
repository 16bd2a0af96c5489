//! Per-source raw measurements, diagnostics, fused concentrations, and weather context.

use super::pollutant::{Pollutant, Quality, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single pollutant reading from one source, before fusion. Created by an
/// adapter, consumed by the fusion engine in the same collection cycle, and
/// never persisted raw (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPollutantMeasurement {
    pub pollutant: Pollutant,
    pub value: f64,
    pub units: Unit,
    pub source_tag: String,
    pub quality: Quality,
    pub uncertainty_hint: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Diagnostics an adapter records for every call, win or lose. Adapters never
/// throw across their boundary (§6) -- every failure becomes an entry here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub latency_ms: u64,
    pub attempts: u32,
    pub filter_reasons: Vec<String>,
    pub errors: Vec<String>,
}

impl SourceDiagnostics {
    pub fn merge(&mut self, other: SourceDiagnostics) {
        self.latency_ms += other.latency_ms;
        self.attempts += other.attempts;
        self.filter_reasons.extend(other.filter_reasons);
        self.errors.extend(other.errors);
    }
}

/// The five meteorology fields surfaced by the model adapter and the global
/// ground aggregator, consumed by the persistence layer and the "why today"
/// explainer. Fusion ignores these entirely (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherContext {
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub weather_code: Option<i32>,
}

/// One source adapter's full output for a single collection cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOutput {
    pub measurements: HashMap<Pollutant, RawPollutantMeasurement>,
    pub weather: Option<WeatherContext>,
    pub diagnostics: SourceDiagnostics,
}

/// The merged result of fanning every adapter out for one (lat, lon): per-source
/// maps of pollutant measurements, plus weather and diagnostics (§4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedObservation {
    pub timestamp: DateTime<Utc>,
    pub sources: HashMap<String, HashMap<Pollutant, RawPollutantMeasurement>>,
    pub weather: Option<WeatherContext>,
    pub diagnostics: HashMap<String, SourceDiagnostics>,
}

/// A single pollutant's fused, bias-corrected, weight-averaged concentration.
///
/// Invariant: `weights_used` values sum to exactly 1.0; any floating-point
/// residual after renormalisation is absorbed into the source with the
/// largest weight (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedConcentration {
    pub pollutant: Pollutant,
    pub value: f64,
    pub units: Unit,
    pub sources_used: Vec<String>,
    pub weights_used: HashMap<String, f64>,
    pub bias_correction_applied: bool,
    pub confidence: f64,
}
