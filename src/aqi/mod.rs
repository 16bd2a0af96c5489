//! AQI calculator (C6, §4.6): applies the EPA averaging window per
//! pollutant, interpolates AQI from the breakpoint tables in [`crate::epa`],
//! and picks the dominant pollutant. Also generates the free-text "why
//! today" explanation (supplemental feature grounded in
//! `original_source/backend/processors/why_today_explainer.py`, dropped by
//! the distillation's table-only description of `AqiResult` but named
//! explicitly in spec.md §4.6's prose).

use crate::epa;
use crate::models::{
    AqiCategory, AqiResult, AveragingPeriod, FusedConcentration, HourlyHistoryEntry, Pollutant, PollutantAqi,
    WeatherContext,
};
use std::collections::HashMap;

/// Tie-break order when two pollutants produce the same overall AQI (§4.6).
const DOMINANCE_ORDER: [Pollutant; 6] =
    [Pollutant::Pm25, Pollutant::O3, Pollutant::Pm10, Pollutant::No2, Pollutant::So2, Pollutant::Co];

/// Builds the averaging window's input series for one pollutant: the current
/// hour's fused value prepended to as much history as is available, newest
/// first (§4.6 table).
fn window_values(pollutant: Pollutant, current: f64, history: &[HourlyHistoryEntry], window_size: usize) -> Vec<f64> {
    let mut values = vec![current];
    for entry in history.iter().take(window_size.saturating_sub(1)) {
        if let Some(v) = entry.pollutants.get(&pollutant) {
            values.push(v.value);
        }
    }
    values
}

/// Computes one pollutant's AQI result, falling back to the 1-hour value and
/// marking `insufficient_for_epa` when the averaging window's completeness
/// rule isn't met (§4.6).
pub fn compute_pollutant_aqi(
    pollutant: Pollutant,
    current_value: f64,
    history: &[HourlyHistoryEntry],
) -> Option<PollutantAqi> {
    if epa::breakpoints(pollutant).is_none() {
        return None; // HCHO: science-only, no EPA AQI (§3)
    }

    let (period, window_size, min_points) = epa::averaging_window(pollutant);
    let series = window_values(pollutant, current_value, history, window_size);
    let data_points_used = series.len();
    let complete = data_points_used >= min_points;

    let (averaged_value, averaging_period, insufficient_for_epa) = if complete {
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        (mean, period, false)
    } else {
        (current_value, AveragingPeriod::OneHour, period != AveragingPeriod::OneHour)
    };

    let (aqi_int, breakpoint_used) = epa::concentration_to_aqi(pollutant, averaged_value).ok()?;

    Some(PollutantAqi {
        pollutant,
        current_hour_value: current_value,
        averaged_value,
        averaging_period,
        aqi_int,
        category: epa::category_for(aqi_int),
        breakpoint_used,
        data_points_used,
        insufficient_for_epa,
    })
}

/// Computes the overall [`AqiResult`] from a fused-concentration map and the
/// location's hourly history (§4.6). Returns `None` if no pollutant in the
/// fused map has an EPA breakpoint table (i.e. only HCHO was fused).
pub fn compute(
    fused: &HashMap<Pollutant, FusedConcentration>,
    history: &[HourlyHistoryEntry],
    weather: Option<&WeatherContext>,
) -> Option<AqiResult> {
    let mut per_pollutant: Vec<PollutantAqi> = fused
        .iter()
        .filter_map(|(pollutant, fc)| compute_pollutant_aqi(*pollutant, fc.value, history))
        .collect();
    if per_pollutant.is_empty() {
        return None;
    }
    // `Iterator::max_by_key` returns the *last* maximal element on a tie, so
    // sort with the highest-dominance pollutant last -- that way a tie
    // resolves to the PM25 > O3 > PM10 > NO2 > SO2 > CO order (§4.6).
    per_pollutant.sort_by(|a, b| {
        let order = |p: Pollutant| DOMINANCE_ORDER.iter().position(|d| *d == p).unwrap_or(usize::MAX);
        order(b.pollutant).cmp(&order(a.pollutant))
    });

    // §4.6: dominant pollutant is the per-pollutant AQI argmax; ties break by
    // the ordering just applied above.
    let dominant = per_pollutant
        .iter()
        .max_by_key(|p| p.aqi_int)
        .expect("non-empty per_pollutant")
        .clone();

    let why_today = why_today(&dominant, weather);

    Some(AqiResult {
        aqi: dominant.aqi_int,
        dominant_pollutant: dominant.pollutant,
        category: dominant.category,
        health_message: dominant.category.health_message().to_string(),
        why_today,
        per_pollutant,
    })
}

/// Rule-based "why today" explanation over the dominant pollutant and
/// weather context (§4.6, grounded in `why_today_explainer.py`): high T +
/// dominant O3 -> photochemistry, low wind -> stagnation, high humidity + PM
/// dominance -> secondary aerosol formation.
fn why_today(dominant: &PollutantAqi, weather: Option<&WeatherContext>) -> String {
    let mut reasons = Vec::new();

    match dominant.pollutant {
        Pollutant::O3 => {
            if let Some(w) = weather {
                if w.temperature_c.map(|t| t > 30.0).unwrap_or(false) {
                    reasons.push(
                        "Warm temperatures are accelerating photochemical ozone formation".to_string(),
                    );
                }
            }
        },
        Pollutant::Pm25 | Pollutant::Pm10 => {
            if let Some(w) = weather {
                if w.humidity_pct.map(|h| h > 70.0).unwrap_or(false) {
                    reasons.push("High humidity is promoting secondary aerosol formation".to_string());
                }
            }
        },
        _ => {},
    }

    if let Some(w) = weather {
        if w.wind_speed_ms.map(|s| s < 2.0).unwrap_or(false) {
            reasons.push("Light winds are allowing pollutants to stagnate near the surface".to_string());
        }
    }

    if reasons.is_empty() {
        format!(
            "{} is today's dominant pollutant, driving an overall AQI of {} ({}).",
            dominant.pollutant,
            dominant.aqi_int,
            dominant.category.label()
        )
    } else {
        format!(
            "{} is today's dominant pollutant (AQI {}, {}). {}.",
            dominant.pollutant,
            dominant.aqi_int,
            dominant.category.label(),
            reasons.join("; ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoricalPollutantValue, Quality, Unit};
    use chrono::{Duration, Utc};
    use std::collections::HashMap as Map;

    fn history_with_constant(pollutant: Pollutant, value: f64, hours: usize) -> Vec<HourlyHistoryEntry> {
        let base = Utc::now();
        (0..hours)
            .map(|i| {
                let mut pollutants = Map::new();
                pollutants.insert(pollutant, HistoricalPollutantValue {
                    value,
                    units: "ug/m3".to_string(),
                    source: "ground_a".to_string(),
                    quality: Quality::Good,
                    bias_corrected: false,
                });
                HourlyHistoryEntry { hour_ts: base - Duration::hours(i as i64 + 1), pollutants }
            })
            .collect()
    }

    fn fused(pollutant: Pollutant, value: f64, units: Unit) -> FusedConcentration {
        FusedConcentration {
            pollutant,
            value,
            units,
            sources_used: vec!["ground_a".to_string()],
            weights_used: [("ground_a".to_string(), 1.0)].into_iter().collect(),
            bias_correction_applied: false,
            confidence: 0.8,
        }
    }

    /// S3 (§8): 24 consecutive hourly writes of PM2.5=9.0 average to 9.0, AQI 50.
    #[test]
    fn s3_full_epa_window_averages_to_input() {
        let history = history_with_constant(Pollutant::Pm25, 9.0, 23);
        let result = compute_pollutant_aqi(Pollutant::Pm25, 9.0, &history).unwrap();
        assert!(!result.insufficient_for_epa);
        assert_eq!(result.data_points_used, 24);
        assert!((result.averaged_value - 9.0).abs() < 1e-9);
        assert_eq!(result.aqi_int, 50);
    }

    /// S3 (continued): dropping to 17 points (below the 18-point completeness
    /// rule) falls back to the current-hour value and flags insufficiency.
    #[test]
    fn s3_sparse_window_falls_back_to_current_hour() {
        let history = history_with_constant(Pollutant::Pm25, 9.0, 16);
        let result = compute_pollutant_aqi(Pollutant::Pm25, 40.0, &history).unwrap();
        assert!(result.insufficient_for_epa);
        assert_eq!(result.averaging_period, AveragingPeriod::OneHour);
        assert!((result.averaged_value - 40.0).abs() < 1e-9);
    }

    /// S5 (§8): PM2.5 averaged 600 caps at AQI 500, Hazardous, above_scale.
    #[test]
    fn s5_overflow_caps_at_500() {
        let history = history_with_constant(Pollutant::Pm25, 600.0, 23);
        let result = compute_pollutant_aqi(Pollutant::Pm25, 600.0, &history).unwrap();
        assert_eq!(result.aqi_int, 500);
        assert_eq!(result.category, AqiCategory::Hazardous);
    }

    /// Property 4 (§8): overall AQI equals the per-pollutant argmax and
    /// dominant equals that argmax.
    #[test]
    fn dominant_pollutant_equals_argmax() {
        let mut fused_map = Map::new();
        fused_map.insert(Pollutant::Pm25, fused(Pollutant::Pm25, 9.0, Unit::MicrogramsPerCubicMeter));
        fused_map.insert(Pollutant::No2, fused(Pollutant::No2, 500.0, Unit::Ppb));
        let history = Vec::new();
        let result = compute(&fused_map, &history, None).unwrap();
        assert_eq!(result.dominant_pollutant, Pollutant::No2);
        let max_per_pollutant = result.per_pollutant.iter().map(|p| p.aqi_int).max().unwrap();
        assert_eq!(result.aqi, max_per_pollutant);
    }

    #[test]
    fn ties_break_in_dominance_order() {
        // Both PM2.5 and CO land in a breakpoint row producing AQI 50.
        let mut fused_map = Map::new();
        fused_map.insert(Pollutant::Pm25, fused(Pollutant::Pm25, 9.0, Unit::MicrogramsPerCubicMeter));
        fused_map.insert(Pollutant::Co, fused(Pollutant::Co, 4.4, Unit::Ppm));
        let result = compute(&fused_map, &[], None).unwrap();
        assert_eq!(result.dominant_pollutant, Pollutant::Pm25);
    }

    #[test]
    fn why_today_mentions_ozone_heat() {
        let dominant = compute_pollutant_aqi(Pollutant::O3, 0.090, &[]).unwrap();
        let weather = WeatherContext { temperature_c: Some(35.0), ..Default::default() };
        let text = why_today(&dominant, Some(&weather));
        assert!(text.contains("photochemical") || text.contains("Ozone") || text.contains("O3"));
    }

    #[test]
    fn hcho_has_no_aqi() {
        assert!(compute_pollutant_aqi(Pollutant::Hcho, 5.0, &[]).is_none());
    }
}
