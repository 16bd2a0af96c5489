//! Fusion engine (C4, §4.4): per-pollutant bias correction, weighted
//! averaging by source trust, and confidence scoring, grounded in
//! `original_source/backend/processors/fusion_bias_corrector.py`'s
//! `ProductionFusionEngine` (weights, bias table) generalized to the
//! typed [`MergedObservation`] produced by the collector.

use crate::adapters::{SOURCE_GROUND_A, SOURCE_GROUND_B, SOURCE_MODEL, SOURCE_SATELLITE};
use crate::epa::convert;
use crate::models::{FusedConcentration, MergedObservation, Pollutant, RawPollutantMeasurement, Quality};
use std::collections::HashMap;

/// Nominal trust weights (§4.4 step 1), taken verbatim from
/// `fusion_bias_corrector.py`'s `self.weights`.
fn trust_weight(source_id: &str) -> f64 {
    match source_id {
        SOURCE_GROUND_A => 0.50,
        SOURCE_GROUND_B => 0.30,
        SOURCE_SATELLITE => 0.15,
        SOURCE_MODEL => 0.05,
        _ => 0.0,
    }
}

fn is_ground_source(source_id: &str) -> bool {
    source_id == SOURCE_GROUND_A || source_id == SOURCE_GROUND_B
}

/// A linear bias-correction `corrected = slope * raw + intercept` fitted on a
/// specific source (§4.4 step 3). Values taken verbatim from
/// `fusion_bias_corrector.py`'s `self.bias_corrections`.
struct BiasCorrection {
    pollutant: Pollutant,
    source_id: &'static str,
    slope: f64,
    intercept: f64,
}

const BIAS_TABLE: [BiasCorrection; 4] = [
    BiasCorrection { pollutant: Pollutant::No2, source_id: SOURCE_SATELLITE, slope: 0.92, intercept: 2.1 },
    BiasCorrection { pollutant: Pollutant::No2, source_id: SOURCE_MODEL, slope: 0.85, intercept: 3.8 },
    BiasCorrection { pollutant: Pollutant::O3, source_id: SOURCE_MODEL, slope: 0.95, intercept: -1.2 },
    BiasCorrection { pollutant: Pollutant::Pm25, source_id: SOURCE_MODEL, slope: 0.78, intercept: 5.2 },
];
/// HCHO's tempo_vs_ground correction is kept separate from the const table
/// above because HCHO has no EPA breakpoint table and is handled identically
/// otherwise; listed here for completeness of the grounding ledger.
const HCHO_BIAS: BiasCorrection =
    BiasCorrection { pollutant: Pollutant::Hcho, source_id: SOURCE_SATELLITE, slope: 0.88, intercept: 1.5 };

fn bias_for(pollutant: Pollutant, source_id: &str) -> Option<&'static BiasCorrection> {
    BIAS_TABLE
        .iter()
        .chain(std::iter::once(&HCHO_BIAS))
        .find(|b| b.pollutant == pollutant && b.source_id == source_id)
}

/// Plausible-range sanity check (§4.4 step 2). Returns `true` when `value`
/// (already in the pollutant's canonical unit) is implausible and should
/// have its source weight penalized before renormalisation.
fn is_implausible(pollutant: Pollutant, value: f64) -> bool {
    match pollutant {
        Pollutant::Pm25 => !(0.0..=300.0).contains(&value),
        Pollutant::Pm10 => !(0.0..=600.0).contains(&value),
        Pollutant::No2 | Pollutant::So2 | Pollutant::Hcho => !(0.0..=400.0).contains(&value),
        Pollutant::O3 => !(0.0..=0.400).contains(&value), // 400 ppb in canonical ppm
        Pollutant::Co => value < 0.0 || value > 50.0,
    }
}

/// Sanity-penalty multiplier applied to an implausible source's weight
/// before renormalisation (§4.4 step 2: "multiply that source's weight by
/// 0.1-0.2"). A flat 0.15 is used; see `DESIGN.md` for the choice.
const SANITY_PENALTY: f64 = 0.15;

/// Fuses every pollutant present in at least one source of a merged
/// observation into a [`FusedConcentration`] (§4.4). Pollutants reported by
/// zero sources are absent from the result map.
pub fn fuse(observation: &MergedObservation) -> HashMap<Pollutant, FusedConcentration> {
    let mut by_pollutant: HashMap<Pollutant, Vec<(&str, &RawPollutantMeasurement)>> = HashMap::new();
    for (source_id, measurements) in &observation.sources {
        for (pollutant, measurement) in measurements {
            if measurement.quality == Quality::Filtered {
                continue; // never promoted downstream (§4.2/§7)
            }
            by_pollutant.entry(*pollutant).or_default().push((source_id.as_str(), measurement));
        }
    }

    let mut result = HashMap::new();
    for (pollutant, sources) in by_pollutant {
        if let Some(fused) = fuse_one(pollutant, &sources) {
            result.insert(pollutant, fused);
        }
    }
    result
}

fn fuse_one(pollutant: Pollutant, sources: &[(&str, &RawPollutantMeasurement)]) -> Option<FusedConcentration> {
    let canonical_unit = pollutant.canonical_unit();

    // §4.4 step 4: convert every input to the pollutant's canonical unit first.
    let mut converted: HashMap<String, f64> = HashMap::new();
    for (source_id, measurement) in sources {
        if let Ok(value) = convert(pollutant, measurement.value, measurement.units, canonical_unit, None, None) {
            converted.insert(source_id.to_string(), value);
        }
    }
    if converted.is_empty() {
        return None;
    }

    let has_ground = converted.keys().any(|s| is_ground_source(s));

    // §4.4 step 1: nominal weights for the sources that actually reported.
    let mut weights: HashMap<String, f64> = converted.keys().map(|s| (s.clone(), trust_weight(s))).collect();

    // §4.4 step 2: sanity penalty on implausible values, applied before renormalisation.
    for (source_id, value) in &converted {
        if is_implausible(pollutant, *value) {
            if let Some(w) = weights.get_mut(source_id) {
                *w *= SANITY_PENALTY;
            }
        }
    }

    // §4.4 step 3: bias-correct model/satellite sources when the calibrated
    // pairing (that source alongside a ground reference) is present.
    let mut bias_applied = false;
    let mut corrected = converted.clone();
    for (source_id, value) in converted.iter() {
        if !has_ground {
            continue;
        }
        if let Some(correction) = bias_for(pollutant, source_id) {
            corrected.insert(source_id.clone(), value * correction.slope + correction.intercept);
            bias_applied = true;
        }
    }

    // §4.4 step 1 (cont.): renormalise so weights sum to exactly 1.0, residual
    // absorbed by the largest weight.
    let total_weight: f64 = weights.values().sum();
    if total_weight <= 0.0 {
        return None;
    }
    for w in weights.values_mut() {
        *w /= total_weight;
    }
    let residual = 1.0 - weights.values().sum::<f64>();
    if let Some((_, largest)) = weights.iter_mut().max_by(|a, b| a.1.partial_cmp(b.1).unwrap()) {
        *largest += residual;
    }

    // §4.4 step 4: weighted average.
    let fused_value: f64 = corrected.iter().map(|(source_id, value)| value * weights.get(source_id).copied().unwrap_or(0.0)).sum();
    let fused_value = if fused_value < 0.0 {
        corrected.values().cloned().filter(|v| *v > 0.0).fold(f64::INFINITY, f64::min).max(0.0)
    } else {
        fused_value
    };
    let fused_value = if fused_value.is_infinite() { 0.0 } else { fused_value };

    // §4.4 step 5: confidence, capped at 0.9. The denominator is the total
    // number of source adapters the pipeline defines (ground-A, ground-B,
    // satellite, model), not how many happened to report this pollutant.
    const ALL_SOURCES_COUNT: f64 = 4.0;
    let confidence = (0.6 + 0.2 * (converted.len() as f64 / ALL_SOURCES_COUNT) + if bias_applied { 0.1 } else { 0.0 }).min(0.9);

    let mut sources_used: Vec<String> = weights.keys().cloned().collect();
    sources_used.sort();

    Some(FusedConcentration {
        pollutant,
        value: fused_value,
        units: canonical_unit,
        sources_used,
        weights_used: weights,
        bias_correction_applied: bias_applied,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quality, RawPollutantMeasurement, SourceDiagnostics, Unit};
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn measurement(pollutant: Pollutant, value: f64, units: Unit, source: &str) -> RawPollutantMeasurement {
        RawPollutantMeasurement {
            pollutant,
            value,
            units,
            source_tag: source.to_string(),
            quality: Quality::Good,
            uncertainty_hint: None,
            observed_at: Utc::now(),
        }
    }

    fn observation(entries: Vec<(&str, Pollutant, f64, Unit)>) -> MergedObservation {
        let mut sources: Map<String, Map<Pollutant, RawPollutantMeasurement>> = Map::new();
        let mut diagnostics = Map::new();
        for (source, pollutant, value, units) in entries {
            sources.entry(source.to_string()).or_default().insert(pollutant, measurement(pollutant, value, units, source));
            diagnostics.entry(source.to_string()).or_insert_with(SourceDiagnostics::default);
        }
        MergedObservation { timestamp: Utc::now(), sources, weather: None, diagnostics }
    }

    /// Property 3 (§8): weights always sum to exactly 1.0.
    #[test]
    fn weight_conservation_holds() {
        let obs = observation(vec![
            (SOURCE_GROUND_A, Pollutant::Pm25, 23.9, Unit::MicrogramsPerCubicMeter),
            (SOURCE_GROUND_B, Pollutant::Pm25, 14.1, Unit::MicrogramsPerCubicMeter),
            (SOURCE_MODEL, Pollutant::Pm25, 18.7, Unit::MicrogramsPerCubicMeter),
        ]);
        let fused = fuse(&obs);
        let pm25 = fused.get(&Pollutant::Pm25).unwrap();
        let sum: f64 = pm25.weights_used.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    /// S1 (§8): NYC happy path fuses ground-A/ground-B/model PM2.5 readings,
    /// applying bias correction to the model input since a ground reference
    /// is present, and lands between the lowest and highest contributing
    /// reading after renormalised weighting.
    #[test]
    fn s1_nyc_pm25_fusion() {
        let obs = observation(vec![
            (SOURCE_GROUND_A, Pollutant::Pm25, 23.9, Unit::MicrogramsPerCubicMeter),
            (SOURCE_GROUND_B, Pollutant::Pm25, 14.1, Unit::MicrogramsPerCubicMeter),
            (SOURCE_MODEL, Pollutant::Pm25, 18.7, Unit::MicrogramsPerCubicMeter),
        ]);
        let fused = fuse(&obs);
        let pm25 = fused.get(&Pollutant::Pm25).unwrap();
        assert!(pm25.bias_correction_applied);
        let sum: f64 = pm25.weights_used.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(pm25.value > 14.0 && pm25.value < 24.0, "got {}", pm25.value);
    }

    /// S4 (§8): ground-only fusion uses ground-A alone at weight 1.0.
    #[test]
    fn s4_ground_only_fusion() {
        let obs = observation(vec![(SOURCE_GROUND_A, Pollutant::Pm25, 23.9, Unit::MicrogramsPerCubicMeter)]);
        let fused = fuse(&obs);
        let pm25 = fused.get(&Pollutant::Pm25).unwrap();
        assert_eq!(pm25.weights_used.len(), 1);
        assert!((pm25.weights_used[SOURCE_GROUND_A] - 1.0).abs() < 1e-9);
        assert!(!pm25.bias_correction_applied);
    }

    #[test]
    fn implausible_value_is_penalized_before_averaging() {
        let obs = observation(vec![
            (SOURCE_GROUND_A, Pollutant::Pm25, 20.0, Unit::MicrogramsPerCubicMeter),
            (SOURCE_MODEL, Pollutant::Pm25, 9000.0, Unit::MicrogramsPerCubicMeter),
        ]);
        let fused = fuse(&obs);
        let pm25 = fused.get(&Pollutant::Pm25).unwrap();
        // The implausible model reading's weight should end up far smaller
        // than ground-A's after the sanity penalty.
        assert!(pm25.weights_used[SOURCE_GROUND_A] > pm25.weights_used[SOURCE_MODEL]);
    }

    #[test]
    fn negative_average_clips_to_smallest_positive_input() {
        let obs = observation(vec![(SOURCE_MODEL, Pollutant::O3, -0.01, Unit::Ppm)]);
        let fused = fuse(&obs);
        let o3 = fused.get(&Pollutant::O3).unwrap();
        assert!(o3.value >= 0.0);
    }

    #[test]
    fn filtered_measurements_are_excluded() {
        let mut sources: Map<String, Map<Pollutant, RawPollutantMeasurement>> = Map::new();
        let mut m = measurement(Pollutant::No2, 5.0, Unit::Ppb, SOURCE_SATELLITE);
        m.quality = Quality::Filtered;
        sources.entry(SOURCE_SATELLITE.to_string()).or_default().insert(Pollutant::No2, m);
        let obs = MergedObservation { timestamp: Utc::now(), sources, weather: None, diagnostics: Map::new() };
        let fused = fuse(&obs);
        assert!(fused.get(&Pollutant::No2).is_none());
    }
}
