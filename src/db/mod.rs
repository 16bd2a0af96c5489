//! Persistence layer (C7): PostgreSQL interactions via the `postgres` submodule.
//!
//! [`PersistenceSink`] abstracts the two upsert operations and the daily
//! rollup query behind a trait, the same dependency-injection shape
//! `crate::history::HistoryStore` uses, so the scheduler can be driven by a
//! mock in tests instead of a live database (§9 design note).

mod postgres;

pub use postgres::*;

use crate::error::Result;
use crate::models::{ComprehensiveAqiHourlyRow, DailyTrendRow};
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn upsert_hourly(&self, row: &ComprehensiveAqiHourlyRow) -> Result<()>;
    async fn upsert_daily_trend(&self, row: &DailyTrendRow) -> Result<()>;
    async fn rollup_day(
        &self,
        city: &str,
        latitude: f64,
        longitude: f64,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyTrendRow>>;
}

#[async_trait]
impl PersistenceSink for Database {
    async fn upsert_hourly(&self, row: &ComprehensiveAqiHourlyRow) -> Result<()> {
        Database::upsert_hourly(self, row).await
    }

    async fn upsert_daily_trend(&self, row: &DailyTrendRow) -> Result<()> {
        Database::upsert_daily_trend(self, row).await
    }

    async fn rollup_day(
        &self,
        city: &str,
        latitude: f64,
        longitude: f64,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyTrendRow>> {
        Database::rollup_day(self, city, latitude, longitude, location_id, date).await
    }
}
