//! Defines the data structures shared across the pipeline: locations, pollutants,
//! raw per-source measurements, fused concentrations, hourly history entries, AQI
//! results, and the rows persisted to Postgres.
//!
//! Dynamic-dictionary lookups like the original `data["pollutants"]["PM25"]["value"]`
//! are replaced throughout with the tagged records below and the `Pollutant` enum.

mod aqi;
mod db_rows;
mod history;
mod location;
mod measurement;
mod pollutant;
mod priority;

pub use aqi::*;
pub use db_rows::*;
pub use history::*;
pub use location::*;
pub use measurement::*;
pub use pollutant::*;
pub use priority::*;
