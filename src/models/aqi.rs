//! AQI calculator output types (C6): per-pollutant results plus the overall rollup.

use super::pollutant::Pollutant;
use serde::{Deserialize, Serialize};

/// The EPA averaging window a pollutant's AQI was computed over (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragingPeriod {
    OneHour,
    EightHour,
    TwentyFourHour,
}

impl AveragingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AveragingPeriod::OneHour => "1h",
            AveragingPeriod::EightHour => "8h",
            AveragingPeriod::TwentyFourHour => "24h",
        }
    }
}

/// Which breakpoint row (or overflow marker) produced an AQI value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BreakpointUsed {
    Row { conc_lo: f64, conc_hi: f64, aqi_lo: u32, aqi_hi: u32 },
    AboveScale,
}

/// One pollutant's AQI result: the averaged concentration that fed the
/// breakpoint interpolation, plus the breakpoint row and completeness of the
/// history window used to build it (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollutantAqi {
    pub pollutant: Pollutant,
    pub current_hour_value: f64,
    pub averaged_value: f64,
    pub averaging_period: AveragingPeriod,
    pub aqi_int: u32,
    pub category: AqiCategory,
    pub breakpoint_used: BreakpointUsed,
    pub data_points_used: usize,
    pub insufficient_for_epa: bool,
}

/// EPA category bands, carried with a display color (§1/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: u32) -> Self {
        match aqi {
            0..=50 => AqiCategory::Good,
            51..=100 => AqiCategory::Moderate,
            101..=150 => AqiCategory::UnhealthyForSensitive,
            151..=200 => AqiCategory::Unhealthy,
            201..=300 => AqiCategory::VeryUnhealthy,
            _ => AqiCategory::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Hex color used by the front-end (EPA's standard palette).
    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::Good => "#00e400",
            AqiCategory::Moderate => "#ffff00",
            AqiCategory::UnhealthyForSensitive => "#ff7e00",
            AqiCategory::Unhealthy => "#ff0000",
            AqiCategory::VeryUnhealthy => "#8f3f97",
            AqiCategory::Hazardous => "#7e0023",
        }
    }
}

/// The overall AQI result for one location/hour: the dominant pollutant's row
/// plus every per-pollutant breakdown, and the free-text "why today" summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiResult {
    pub aqi: u32,
    pub dominant_pollutant: Pollutant,
    pub category: AqiCategory,
    pub health_message: String,
    pub why_today: String,
    pub per_pollutant: Vec<PollutantAqi>,
}

impl AqiCategory {
    /// Canned health guidance per category, matching the EPA's public messaging.
    pub fn health_message(&self) -> &'static str {
        match self {
            AqiCategory::Good => {
                "Air quality is satisfactory, and air pollution poses little or no risk."
            },
            AqiCategory::Moderate => {
                "Air quality is acceptable. However, there may be a risk for some people, particularly those unusually sensitive to air pollution."
            },
            AqiCategory::UnhealthyForSensitive => {
                "Members of sensitive groups may experience health effects. The general public is less likely to be affected."
            },
            AqiCategory::Unhealthy => {
                "Some members of the general public may experience health effects; sensitive groups may experience more serious effects."
            },
            AqiCategory::VeryUnhealthy => {
                "Health alert: the risk of health effects is increased for everyone."
            },
            AqiCategory::Hazardous => {
                "Health warning of emergency conditions: everyone is more likely to be affected."
            },
        }
    }
}
