//! The priority index's candidate-location record (C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One location tracked by the priority index: alert subscriptions plus search
/// telemetry rolled up into a single ranking score (§3/§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub location_id: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub priority_score: f64,
    pub last_collected: Option<DateTime<Utc>>,
    pub alert_user_count: i64,
    pub search_count: i64,
    pub user_demand_boost: f64,
}

impl PriorityEntry {
    /// `3*alert_count + 0.1*search_count + user_demand_boost` (§3).
    pub fn compute_score(&self) -> f64 {
        3.0 * self.alert_user_count as f64 + 0.1 * self.search_count as f64 + self.user_demand_boost
    }
}
