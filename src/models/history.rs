//! Hourly history entries, the rolling per-location buffer EPA averaging reads from.

use super::pollutant::{Pollutant, Quality};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One pollutant's value as recorded in an hour of history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPollutantValue {
    pub value: f64,
    pub units: String,
    pub source: String,
    pub quality: Quality,
    pub bias_corrected: bool,
}

/// One location's snapshot for one hour. The hourly history store (C5) keeps
/// at most 25 of these per location, sorted by `hour_ts` descending, so the
/// EPA 1h/8h/24h averaging windows always have a buffer hour beyond 24h (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyHistoryEntry {
    pub hour_ts: DateTime<Utc>,
    pub pollutants: HashMap<Pollutant, HistoricalPollutantValue>,
}
