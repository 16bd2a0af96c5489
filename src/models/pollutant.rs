//! The pollutant enum and the units every measured value is tagged with.
//!
//! No value leaves a source adapter without units (§3); the unit of the stored
//! "concentration" field is fixed per pollutant via [`Pollutant::canonical_unit`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven pollutants the pipeline ingests. `Hcho` is science-only: it has no
/// EPA AQI breakpoint table, so the AQI calculator fuses and stores its
/// concentration but never scores it (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
    Hcho,
}

impl Pollutant {
    pub const EPA_POLLUTANTS: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::O3,
        Pollutant::Pm10,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM25",
            Pollutant::Pm10 => "PM10",
            Pollutant::O3 => "O3",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
            Pollutant::Hcho => "HCHO",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().replace('.', "").as_str() {
            "PM25" => Some(Pollutant::Pm25),
            "PM10" => Some(Pollutant::Pm10),
            "O3" | "OZONE" => Some(Pollutant::O3),
            "NO2" => Some(Pollutant::No2),
            "SO2" => Some(Pollutant::So2),
            "CO" => Some(Pollutant::Co),
            "HCHO" => Some(Pollutant::Hcho),
            _ => None,
        }
    }

    /// The canonical unit this pollutant is stored and averaged in (§6 table).
    pub fn canonical_unit(&self) -> Unit {
        match self {
            Pollutant::Pm25 | Pollutant::Pm10 => Unit::MicrogramsPerCubicMeter,
            Pollutant::O3 | Pollutant::Co => Unit::Ppm,
            Pollutant::No2 | Pollutant::So2 | Pollutant::Hcho => Unit::Ppb,
        }
    }

    /// Molar mass in g/mol, used for the ideal-gas-law ppb<->ug/m3 conversion.
    /// Pollutants without a defined molar mass (PM, which is already mass-based)
    /// return `None`.
    pub fn molar_mass_g_per_mol(&self) -> Option<f64> {
        match self {
            Pollutant::No2 => Some(46.0055),
            Pollutant::So2 => Some(64.066),
            Pollutant::Co => Some(28.010),
            Pollutant::O3 => Some(47.9982),
            Pollutant::Hcho => Some(30.026),
            Pollutant::Pm25 | Pollutant::Pm10 => None,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Units a measurement can be reported in. Any conversion outside this table
/// fails with `AppError::UnitUnsupported` rather than silently passing the
/// input through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Ppb,
    Ppm,
    MicrogramsPerCubicMeter,
    MoleculesPerCm2,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Ppb => "ppb",
            Unit::Ppm => "ppm",
            Unit::MicrogramsPerCubicMeter => "\u{3bc}g/m\u{b3}",
            Unit::MoleculesPerCm2 => "molecules/cm2",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality tag a measurement carries through the pipeline (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    NasaCompliant,
    Good,
    Moderate,
    Insufficient,
    Filtered,
}
