//! Static EPA breakpoint tables, molar masses, and unit conversions (C1).
//!
//! Pure functions only: no I/O, no shared state. Every conversion outside the
//! table named here fails with `AppError::UnitUnsupported` rather than passing
//! the input through unchanged (§4.1).

use crate::error::{AppError, Result};
use crate::models::{AqiCategory, AveragingPeriod, BreakpointUsed, Pollutant, Unit};

/// Ideal gas constant, L*atm / (mol*K).
const GAS_CONSTANT: f64 = 0.082057;
/// Fallback conditions used when a source provides no local temperature/pressure (§4.1).
pub const STANDARD_TEMPERATURE_K: f64 = 298.15; // 25 C
pub const STANDARD_PRESSURE_ATM: f64 = 1.0;

/// Converts a ppb concentration to micrograms per cubic meter via the ideal
/// gas law, `C(ug/m3) = ppb * M * P / (R * T)`, falling back to 25C/1atm when
/// local conditions are not supplied (§4.1).
pub fn ppb_to_ugm3(ppb: f64, molar_mass_g_per_mol: f64, temp_k: Option<f64>, pressure_atm: Option<f64>) -> f64 {
    let t = temp_k.unwrap_or(STANDARD_TEMPERATURE_K);
    let p = pressure_atm.unwrap_or(STANDARD_PRESSURE_ATM);
    ppb * molar_mass_g_per_mol * p / (GAS_CONSTANT * t)
}

/// Inverse of [`ppb_to_ugm3`].
pub fn ugm3_to_ppb(ugm3: f64, molar_mass_g_per_mol: f64, temp_k: Option<f64>, pressure_atm: Option<f64>) -> f64 {
    let t = temp_k.unwrap_or(STANDARD_TEMPERATURE_K);
    let p = pressure_atm.unwrap_or(STANDARD_PRESSURE_ATM);
    ugm3 * GAS_CONSTANT * t / (molar_mass_g_per_mol * p)
}

/// Converts a value from `from` to `to` for the given pollutant, using the
/// ideal-gas-law routes for ppb<->ug/m3 and a straight x1000 for ppb<->ppm.
/// Any unsupported pairing (e.g. a PM pollutant requested in ppb, or
/// `molecules/cm2` without a caller-supplied column-density conversion)
/// returns `AppError::UnitUnsupported`.
pub fn convert(
    pollutant: Pollutant,
    value: f64,
    from: Unit,
    to: Unit,
    temp_k: Option<f64>,
    pressure_atm: Option<f64>,
) -> Result<f64> {
    if from == to {
        return Ok(value);
    }
    let unsupported = || AppError::UnitUnsupported {
        pollutant: pollutant.to_string(),
        unit: format!("{from}->{to}"),
    };

    match (from, to) {
        (Unit::Ppb, Unit::Ppm) => Ok(value / 1000.0),
        (Unit::Ppm, Unit::Ppb) => Ok(value * 1000.0),
        (Unit::Ppb, Unit::MicrogramsPerCubicMeter) => {
            let m = pollutant.molar_mass_g_per_mol().ok_or_else(unsupported)?;
            Ok(ppb_to_ugm3(value, m, temp_k, pressure_atm))
        },
        (Unit::MicrogramsPerCubicMeter, Unit::Ppb) => {
            let m = pollutant.molar_mass_g_per_mol().ok_or_else(unsupported)?;
            Ok(ugm3_to_ppb(value, m, temp_k, pressure_atm))
        },
        (Unit::Ppm, Unit::MicrogramsPerCubicMeter) => {
            let m = pollutant.molar_mass_g_per_mol().ok_or_else(unsupported)?;
            Ok(ppb_to_ugm3(value * 1000.0, m, temp_k, pressure_atm))
        },
        (Unit::MicrogramsPerCubicMeter, Unit::Ppm) => {
            let m = pollutant.molar_mass_g_per_mol().ok_or_else(unsupported)?;
            Ok(ugm3_to_ppb(value, m, temp_k, pressure_atm) / 1000.0)
        },
        _ => Err(unsupported()),
    }
}

/// One EPA breakpoint row: a concentration range mapped to an AQI range.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoint {
    pub conc_lo: f64,
    pub conc_hi: f64,
    pub aqi_lo: u32,
    pub aqi_hi: u32,
}

/// Returns the breakpoint table a pollutant is interpolated against, and the
/// averaging window that table implicitly assumes (§4.6 table).
///
/// The PM2.5 table adopts the 2024 EPA revision's Good/Moderate boundary of
/// 9.0 ug/m3 rather than the older 12.0 ug/m3 boundary, resolving the Open
/// Question in spec.md §9 (see `DESIGN.md`).
pub fn breakpoints(pollutant: Pollutant) -> Option<&'static [Breakpoint]> {
    const fn bp(conc_lo: f64, conc_hi: f64, aqi_lo: u32, aqi_hi: u32) -> Breakpoint {
        Breakpoint { conc_lo, conc_hi, aqi_lo, aqi_hi }
    }

    match pollutant {
        Pollutant::Pm25 => Some(&[
            bp(0.0, 9.0, 0, 50),
            bp(9.1, 35.4, 51, 100),
            bp(35.5, 55.4, 101, 150),
            bp(55.5, 125.4, 151, 200),
            bp(125.5, 225.4, 201, 300),
            bp(225.5, 325.4, 301, 500),
        ]),
        Pollutant::Pm10 => Some(&[
            bp(0.0, 54.0, 0, 50),
            bp(55.0, 154.0, 51, 100),
            bp(155.0, 254.0, 101, 150),
            bp(255.0, 354.0, 151, 200),
            bp(355.0, 424.0, 201, 300),
            bp(425.0, 504.0, 301, 400),
            bp(505.0, 604.0, 401, 500),
        ]),
        Pollutant::O3 => Some(&[
            // 8-hour table (§4.6 uses the 8h rolling window for O3).
            bp(0.000, 0.054, 0, 50),
            bp(0.055, 0.070, 51, 100),
            bp(0.071, 0.085, 101, 150),
            bp(0.086, 0.105, 151, 200),
            bp(0.106, 0.200, 201, 300),
        ]),
        Pollutant::Co => Some(&[
            bp(0.0, 4.4, 0, 50),
            bp(4.5, 9.4, 51, 100),
            bp(9.5, 12.4, 101, 150),
            bp(12.5, 15.4, 151, 200),
            bp(15.5, 30.4, 201, 300),
            bp(30.5, 40.4, 301, 400),
            bp(40.5, 50.4, 401, 500),
        ]),
        Pollutant::No2 => Some(&[
            // 1-hour table (§4.6 uses the current-hour value for NO2).
            bp(0.0, 53.0, 0, 50),
            bp(54.0, 100.0, 51, 100),
            bp(101.0, 360.0, 101, 150),
            bp(361.0, 649.0, 151, 200),
            bp(650.0, 1249.0, 201, 300),
            bp(1250.0, 1649.0, 301, 400),
            bp(1650.0, 2049.0, 401, 500),
        ]),
        Pollutant::So2 => Some(&[
            // 1-hour table (§4.6); above 185 ppb callers fall back to the
            // 24-hour table in the real NAAQS, but this pipeline's 1h window
            // for SO2 means we cap remaining concentrations at the top band.
            bp(0.0, 35.0, 0, 50),
            bp(36.0, 75.0, 51, 100),
            bp(76.0, 185.0, 101, 150),
            bp(186.0, 304.0, 151, 200),
            bp(305.0, 604.0, 201, 300),
            bp(605.0, 804.0, 301, 400),
            bp(805.0, 1004.0, 401, 500),
        ]),
        Pollutant::Hcho => None, // science-only, no EPA AQI table (§3)
    }
}

/// Interpolates a concentration into an AQI via the piecewise-linear EPA
/// formula (§4.6): `AQI = (I_hi-I_lo)/(BP_hi-BP_lo) * (C-BP_lo) + I_lo`,
/// rounded to the nearest integer. Concentrations above the top breakpoint
/// map to AQI 500 ("Hazardous"); values below the bottom breakpoint clamp to
/// it (fusion already clips negatives upstream).
pub fn concentration_to_aqi(pollutant: Pollutant, concentration: f64) -> Result<(u32, BreakpointUsed)> {
    let table = breakpoints(pollutant).ok_or_else(|| AppError::UnitUnsupported {
        pollutant: pollutant.to_string(),
        unit: "no EPA breakpoint table".to_string(),
    })?;

    if concentration <= table[0].conc_lo {
        let row = table[0];
        return Ok((row.aqi_lo, BreakpointUsed::Row {
            conc_lo: row.conc_lo,
            conc_hi: row.conc_hi,
            aqi_lo: row.aqi_lo,
            aqi_hi: row.aqi_hi,
        }));
    }

    for row in table {
        if concentration >= row.conc_lo && concentration <= row.conc_hi {
            let aqi = (row.aqi_hi as f64 - row.aqi_lo as f64) / (row.conc_hi - row.conc_lo)
                * (concentration - row.conc_lo)
                + row.aqi_lo as f64;
            return Ok((aqi.round() as u32, BreakpointUsed::Row {
                conc_lo: row.conc_lo,
                conc_hi: row.conc_hi,
                aqi_lo: row.aqi_lo,
                aqi_hi: row.aqi_hi,
            }));
        }
    }

    Ok((500, BreakpointUsed::AboveScale))
}

/// Inverse breakpoint lookup: given a reported AQI, returns the concentration
/// at the midpoint of its breakpoint segment's linear interpolation. Used by
/// ground-station adapters that only return AQI, never a raw concentration
/// (§4.1/§4.2).
pub fn aqi_to_concentration(pollutant: Pollutant, aqi: u32) -> Result<f64> {
    let table = breakpoints(pollutant).ok_or_else(|| AppError::UnitUnsupported {
        pollutant: pollutant.to_string(),
        unit: "no EPA breakpoint table".to_string(),
    })?;

    if aqi >= 500 {
        return Ok(table.last().unwrap().conc_hi);
    }

    for row in table {
        if aqi >= row.aqi_lo && aqi <= row.aqi_hi {
            let conc = (row.conc_hi - row.conc_lo) / (row.aqi_hi as f64 - row.aqi_lo as f64)
                * (aqi as f64 - row.aqi_lo as f64)
                + row.conc_lo;
            return Ok(conc);
        }
    }

    Ok(table.last().unwrap().conc_hi)
}

pub fn category_for(aqi: u32) -> AqiCategory {
    AqiCategory::from_aqi(aqi)
}

/// Which rolling window a pollutant's AQI is built over, and the completeness
/// rule for that window (§4.6 table).
pub fn averaging_window(pollutant: Pollutant) -> (AveragingPeriod, usize, usize) {
    match pollutant {
        Pollutant::O3 | Pollutant::Co => (AveragingPeriod::EightHour, 8, 6),
        Pollutant::Pm25 | Pollutant::Pm10 => (AveragingPeriod::TwentyFourHour, 24, 18),
        Pollutant::No2 | Pollutant::So2 => (AveragingPeriod::OneHour, 1, 1),
        Pollutant::Hcho => (AveragingPeriod::OneHour, 1, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 1 (§8): ppb -> ug/m3 -> ppb round-trips within 1e-6 relative.
    #[test]
    fn unit_round_trip_no2() {
        let original = 12.5;
        let m = Pollutant::No2.molar_mass_g_per_mol().unwrap();
        let ugm3 = ppb_to_ugm3(original, m, None, None);
        let back = ugm3_to_ppb(ugm3, m, None, None);
        assert!((back - original).abs() / original < 1e-6);
    }

    #[test]
    fn unit_round_trip_with_local_conditions() {
        let original = 40.0;
        let m = Pollutant::So2.molar_mass_g_per_mol().unwrap();
        let t = Some(310.0);
        let p = Some(0.95);
        let ugm3 = ppb_to_ugm3(original, m, t, p);
        let back = ugm3_to_ppb(ugm3, m, t, p);
        assert!((back - original).abs() / original < 1e-6);
    }

    #[test]
    fn unsupported_unit_for_pm_is_rejected() {
        let result = convert(Pollutant::Pm25, 10.0, Unit::MicrogramsPerCubicMeter, Unit::Ppb, None, None);
        assert!(matches!(result, Err(AppError::UnitUnsupported { .. })));
    }

    /// Property 2 (§8): piecewise AQI is non-decreasing and continuous across
    /// breakpoint boundaries.
    #[test]
    fn breakpoint_monotonic_and_continuous_pm25() {
        let table = breakpoints(Pollutant::Pm25).unwrap();
        let mut prev_aqi = 0u32;
        for row in table {
            let (aqi_at_lo, _) = concentration_to_aqi(Pollutant::Pm25, row.conc_lo).unwrap();
            let (aqi_at_hi, _) = concentration_to_aqi(Pollutant::Pm25, row.conc_hi).unwrap();
            assert!(aqi_at_lo >= prev_aqi);
            assert!(aqi_at_hi >= aqi_at_lo);
            prev_aqi = aqi_at_hi;
        }
    }

    #[test]
    fn pm25_good_moderate_boundary_is_nine() {
        let (aqi, _) = concentration_to_aqi(Pollutant::Pm25, 9.0).unwrap();
        assert_eq!(aqi, 50);
        let (aqi2, _) = concentration_to_aqi(Pollutant::Pm25, 9.1).unwrap();
        assert_eq!(aqi2, 51);
    }

    /// S5 (§8): PM2.5 averaged 600 ug/m3 caps at AQI 500, Hazardous, above_scale.
    #[test]
    fn overflow_caps_at_500() {
        let (aqi, bp) = concentration_to_aqi(Pollutant::Pm25, 600.0).unwrap();
        assert_eq!(aqi, 500);
        assert!(matches!(bp, BreakpointUsed::AboveScale));
        assert_eq!(category_for(aqi), AqiCategory::Hazardous);
    }

    #[test]
    fn inverse_breakpoint_round_trips_pm25() {
        let conc = aqi_to_concentration(Pollutant::Pm25, 78).unwrap();
        let (aqi, _) = concentration_to_aqi(Pollutant::Pm25, conc).unwrap();
        assert_eq!(aqi, 78);
    }
}
