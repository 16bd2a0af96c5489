//! Persistence layer (C7, §4.7) backed by PostgreSQL via `sqlx`.
//!
//! Two owned tables: `comprehensive_aqi_hourly` (unique key `(city, timestamp)`)
//! and `daily_aqi_trends` (unique key `(city, date)`). Also implements
//! [`HistoryStore`] against a third table, `hourly_history`, so the hourly
//! history buffer (C5) survives process restarts in production while tests
//! use the in-memory backend in `crate::history`.
//!
//! Schema creation is idempotent (`IF NOT EXISTS`), matching the teacher's
//! `Database::init_schema` pattern in spirit: one pool, one struct, plain
//! `sqlx::query`/`query_as` calls bound positionally rather than the `query!`
//! compile-time macro (no `DATABASE_URL` is assumed at build time).

use crate::error::{AppError, Result};
use crate::history::{HistoryStore, MAX_HISTORY_ENTRIES};
use crate::models::{
    AqiCategory, ComprehensiveAqiHourlyRow, DailyTrendRow, HistoricalPollutantValue, HourlyHistoryEntry, Pollutant,
    PollutantColumn, Quality,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};
use std::collections::HashMap;
use tracing::{error, info};

/// The database connection pool and every query the pipeline issues against it.
pub struct Database {
    pool: Pool<Postgres>,
}

/// Collapses `""`, `"null"`, `"NULL"`, and NaN to SQL NULL rather than
/// persisting them as text or a poisoned float (§4.7: "the persistence layer
/// owns no business logic beyond type coercion and safe null handling").
fn to_sql_null_f64(value: Option<f64>) -> Option<f64> {
    value.filter(|v| !v.is_nan())
}

fn to_sql_null_str(value: &str) -> Option<&str> {
    match value.trim() {
        "" | "null" | "NULL" => None,
        other => Some(other),
    }
}

impl Database {
    /// Establishes the connection pool (teacher's `PgPoolOptions` pattern,
    /// `max_connections(10)`).
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await.map_err(|e| {
            error!("Failed to connect to database: {}", e);
            AppError::Db(e.into())
        })?;
        info!("Connected to database successfully");
        Ok(Self { pool })
    }

    /// Creates every table and index this crate owns, `IF NOT EXISTS` (§4.7).
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema (if necessary)...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hourly_history (
                location_id TEXT NOT NULL,
                hour_ts TIMESTAMPTZ NOT NULL,
                pollutants JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (location_id, hour_ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create hourly_history table: {}", e);
            AppError::Db(e.into())
        })?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_hourly_history_location ON hourly_history(location_id, hour_ts DESC)"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Db(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comprehensive_aqi_hourly (
                id BIGSERIAL PRIMARY KEY,
                city TEXT NOT NULL,
                latitude DOUBLE PRECISION NOT NULL,
                longitude DOUBLE PRECISION NOT NULL,
                location_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                overall_aqi INT NOT NULL,
                category TEXT NOT NULL,
                dominant_pollutant TEXT NOT NULL,
                health_message TEXT NOT NULL,
                pm25_concentration DOUBLE PRECISION,
                pm25_aqi INT,
                pm25_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                pm10_concentration DOUBLE PRECISION,
                pm10_aqi INT,
                pm10_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                o3_concentration DOUBLE PRECISION,
                o3_aqi INT,
                o3_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                no2_concentration DOUBLE PRECISION,
                no2_aqi INT,
                no2_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                so2_concentration DOUBLE PRECISION,
                so2_aqi INT,
                so2_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                co_concentration DOUBLE PRECISION,
                co_aqi INT,
                co_bias_corrected BOOLEAN NOT NULL DEFAULT FALSE,
                temperature_c DOUBLE PRECISION,
                humidity_pct DOUBLE PRECISION,
                pressure_hpa DOUBLE PRECISION,
                wind_speed_ms DOUBLE PRECISION,
                wind_direction_deg DOUBLE PRECISION,
                why_today TEXT NOT NULL,
                data_sources JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (city, timestamp)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create comprehensive_aqi_hourly table: {}", e);
            AppError::Db(e.into())
        })?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_aqi_hourly_lat_lon_ts ON comprehensive_aqi_hourly(latitude, longitude, timestamp)"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Db(e.into()))?;
        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_aqi_hourly_overall_aqi ON comprehensive_aqi_hourly(overall_aqi)"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Db(e.into()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_aqi_trends (
                id BIGSERIAL PRIMARY KEY,
                city TEXT NOT NULL,
                latitude DOUBLE PRECISION NOT NULL,
                longitude DOUBLE PRECISION NOT NULL,
                location_id TEXT NOT NULL,
                date DATE NOT NULL,
                avg_overall_aqi DOUBLE PRECISION NOT NULL,
                avg_pm25 DOUBLE PRECISION,
                avg_pm25_aqi DOUBLE PRECISION,
                avg_pm10 DOUBLE PRECISION,
                avg_pm10_aqi DOUBLE PRECISION,
                avg_o3 DOUBLE PRECISION,
                avg_o3_aqi DOUBLE PRECISION,
                avg_no2 DOUBLE PRECISION,
                avg_no2_aqi DOUBLE PRECISION,
                avg_so2 DOUBLE PRECISION,
                avg_so2_aqi DOUBLE PRECISION,
                avg_co DOUBLE PRECISION,
                avg_co_aqi DOUBLE PRECISION,
                avg_temperature_c DOUBLE PRECISION,
                avg_humidity_pct DOUBLE PRECISION,
                dominant_pollutant TEXT NOT NULL,
                category TEXT NOT NULL,
                completeness DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (city, date)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create daily_aqi_trends table: {}", e);
            AppError::Db(e.into())
        })?;

        info!("Database schema initialized successfully");
        Ok(())
    }

    /// Upserts one `comprehensive_aqi_hourly` row, truncating `timestamp` to
    /// the hour per §4.7 ("only the hour precision matters"). Last write wins
    /// on `(city, timestamp)` conflict, satisfying §8 property 6 (persistence
    /// idempotence).
    pub async fn upsert_hourly(&self, row: &ComprehensiveAqiHourlyRow) -> Result<()> {
        let hour_ts = truncate_to_hour(row.timestamp);

        sqlx::query(
            r#"
            INSERT INTO comprehensive_aqi_hourly (
                city, latitude, longitude, location_id, timestamp,
                overall_aqi, category, dominant_pollutant, health_message,
                pm25_concentration, pm25_aqi, pm25_bias_corrected,
                pm10_concentration, pm10_aqi, pm10_bias_corrected,
                o3_concentration, o3_aqi, o3_bias_corrected,
                no2_concentration, no2_aqi, no2_bias_corrected,
                so2_concentration, so2_aqi, so2_bias_corrected,
                co_concentration, co_aqi, co_bias_corrected,
                temperature_c, humidity_pct, pressure_hpa, wind_speed_ms, wind_direction_deg,
                why_today, data_sources
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9,
                $10, $11, $12,
                $13, $14, $15,
                $16, $17, $18,
                $19, $20, $21,
                $22, $23, $24,
                $25, $26, $27,
                $28, $29, $30, $31, $32,
                $33, $34
            )
            ON CONFLICT (city, timestamp) DO UPDATE SET
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                location_id = EXCLUDED.location_id,
                overall_aqi = EXCLUDED.overall_aqi,
                category = EXCLUDED.category,
                dominant_pollutant = EXCLUDED.dominant_pollutant,
                health_message = EXCLUDED.health_message,
                pm25_concentration = EXCLUDED.pm25_concentration,
                pm25_aqi = EXCLUDED.pm25_aqi,
                pm25_bias_corrected = EXCLUDED.pm25_bias_corrected,
                pm10_concentration = EXCLUDED.pm10_concentration,
                pm10_aqi = EXCLUDED.pm10_aqi,
                pm10_bias_corrected = EXCLUDED.pm10_bias_corrected,
                o3_concentration = EXCLUDED.o3_concentration,
                o3_aqi = EXCLUDED.o3_aqi,
                o3_bias_corrected = EXCLUDED.o3_bias_corrected,
                no2_concentration = EXCLUDED.no2_concentration,
                no2_aqi = EXCLUDED.no2_aqi,
                no2_bias_corrected = EXCLUDED.no2_bias_corrected,
                so2_concentration = EXCLUDED.so2_concentration,
                so2_aqi = EXCLUDED.so2_aqi,
                so2_bias_corrected = EXCLUDED.so2_bias_corrected,
                co_concentration = EXCLUDED.co_concentration,
                co_aqi = EXCLUDED.co_aqi,
                co_bias_corrected = EXCLUDED.co_bias_corrected,
                temperature_c = EXCLUDED.temperature_c,
                humidity_pct = EXCLUDED.humidity_pct,
                pressure_hpa = EXCLUDED.pressure_hpa,
                wind_speed_ms = EXCLUDED.wind_speed_ms,
                wind_direction_deg = EXCLUDED.wind_direction_deg,
                why_today = EXCLUDED.why_today,
                data_sources = EXCLUDED.data_sources
            "#,
        )
        .bind(to_sql_null_str(&row.city))
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(&row.location_id)
        .bind(hour_ts)
        .bind(row.overall_aqi)
        .bind(to_sql_null_str(&row.category))
        .bind(to_sql_null_str(&row.dominant_pollutant))
        .bind(to_sql_null_str(&row.health_message))
        .bind(to_sql_null_f64(row.pm25.concentration))
        .bind(row.pm25.aqi)
        .bind(row.pm25.bias_corrected)
        .bind(to_sql_null_f64(row.pm10.concentration))
        .bind(row.pm10.aqi)
        .bind(row.pm10.bias_corrected)
        .bind(to_sql_null_f64(row.o3.concentration))
        .bind(row.o3.aqi)
        .bind(row.o3.bias_corrected)
        .bind(to_sql_null_f64(row.no2.concentration))
        .bind(row.no2.aqi)
        .bind(row.no2.bias_corrected)
        .bind(to_sql_null_f64(row.so2.concentration))
        .bind(row.so2.aqi)
        .bind(row.so2.bias_corrected)
        .bind(to_sql_null_f64(row.co.concentration))
        .bind(row.co.aqi)
        .bind(row.co.bias_corrected)
        .bind(to_sql_null_f64(row.temperature_c))
        .bind(to_sql_null_f64(row.humidity_pct))
        .bind(to_sql_null_f64(row.pressure_hpa))
        .bind(to_sql_null_f64(row.wind_speed_ms))
        .bind(to_sql_null_f64(row.wind_direction_deg))
        .bind(to_sql_null_str(&row.why_today))
        .bind(&row.data_sources)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to upsert comprehensive_aqi_hourly row for {}: {}", row.city, e);
            AppError::PersistenceConflict(e.to_string())
        })?;

        Ok(())
    }

    /// Upserts one `daily_aqi_trends` row (§4.7).
    pub async fn upsert_daily_trend(&self, row: &DailyTrendRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_aqi_trends (
                city, latitude, longitude, location_id, date,
                avg_overall_aqi, avg_pm25, avg_pm25_aqi, avg_pm10, avg_pm10_aqi,
                avg_o3, avg_o3_aqi, avg_no2, avg_no2_aqi, avg_so2, avg_so2_aqi,
                avg_co, avg_co_aqi, avg_temperature_c, avg_humidity_pct,
                dominant_pollutant, category, completeness
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20,
                $21, $22, $23
            )
            ON CONFLICT (city, date) DO UPDATE SET
                avg_overall_aqi = EXCLUDED.avg_overall_aqi,
                avg_pm25 = EXCLUDED.avg_pm25,
                avg_pm25_aqi = EXCLUDED.avg_pm25_aqi,
                avg_pm10 = EXCLUDED.avg_pm10,
                avg_pm10_aqi = EXCLUDED.avg_pm10_aqi,
                avg_o3 = EXCLUDED.avg_o3,
                avg_o3_aqi = EXCLUDED.avg_o3_aqi,
                avg_no2 = EXCLUDED.avg_no2,
                avg_no2_aqi = EXCLUDED.avg_no2_aqi,
                avg_so2 = EXCLUDED.avg_so2,
                avg_so2_aqi = EXCLUDED.avg_so2_aqi,
                avg_co = EXCLUDED.avg_co,
                avg_co_aqi = EXCLUDED.avg_co_aqi,
                avg_temperature_c = EXCLUDED.avg_temperature_c,
                avg_humidity_pct = EXCLUDED.avg_humidity_pct,
                dominant_pollutant = EXCLUDED.dominant_pollutant,
                category = EXCLUDED.category,
                completeness = EXCLUDED.completeness
            "#,
        )
        .bind(to_sql_null_str(&row.city))
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(&row.location_id)
        .bind(row.date)
        .bind(row.avg_overall_aqi)
        .bind(to_sql_null_f64(row.avg_pm25))
        .bind(to_sql_null_f64(row.avg_pm25_aqi))
        .bind(to_sql_null_f64(row.avg_pm10))
        .bind(to_sql_null_f64(row.avg_pm10_aqi))
        .bind(to_sql_null_f64(row.avg_o3))
        .bind(to_sql_null_f64(row.avg_o3_aqi))
        .bind(to_sql_null_f64(row.avg_no2))
        .bind(to_sql_null_f64(row.avg_no2_aqi))
        .bind(to_sql_null_f64(row.avg_so2))
        .bind(to_sql_null_f64(row.avg_so2_aqi))
        .bind(to_sql_null_f64(row.avg_co))
        .bind(to_sql_null_f64(row.avg_co_aqi))
        .bind(to_sql_null_f64(row.avg_temperature_c))
        .bind(to_sql_null_f64(row.avg_humidity_pct))
        .bind(to_sql_null_str(&row.dominant_pollutant))
        .bind(to_sql_null_str(&row.category))
        .bind(row.completeness)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to upsert daily_aqi_trends row for {}: {}", row.city, e);
            AppError::PersistenceConflict(e.to_string())
        })?;

        Ok(())
    }

    /// Rolls up every `comprehensive_aqi_hourly` row for `(city, date)` into a
    /// [`DailyTrendRow`]: averages the numeric columns, picks the most
    /// frequent dominant pollutant, and derives the category from the
    /// averaged AQI (§4.7, grounded in `original_source/backend/processors/
    /// trend_processor.py`). Returns `None` if no hourly rows exist for the day.
    pub async fn rollup_day(
        &self,
        city: &str,
        latitude: f64,
        longitude: f64,
        location_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyTrendRow>> {
        let rows = sqlx::query(
            r#"
            SELECT overall_aqi, dominant_pollutant,
                   pm25_concentration, pm25_aqi, pm10_concentration, pm10_aqi,
                   o3_concentration, o3_aqi, no2_concentration, no2_aqi,
                   so2_concentration, so2_aqi, co_concentration, co_aqi,
                   temperature_c, humidity_pct
            FROM comprehensive_aqi_hourly
            WHERE city = $1 AND timestamp::date = $2
            "#,
        )
        .bind(city)
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to read hourly rows for rollup of {} on {}: {}", city, date, e);
            AppError::Db(e.into())
        })?;

        if rows.is_empty() {
            return Ok(None);
        }

        let count = rows.len() as f64;
        let mut sum_overall = 0.0;
        let mut dominant_counts: HashMap<String, usize> = HashMap::new();
        let mut avg_pm25 = Averager::default();
        let mut avg_pm25_aqi = Averager::default();
        let mut avg_pm10 = Averager::default();
        let mut avg_pm10_aqi = Averager::default();
        let mut avg_o3 = Averager::default();
        let mut avg_o3_aqi = Averager::default();
        let mut avg_no2 = Averager::default();
        let mut avg_no2_aqi = Averager::default();
        let mut avg_so2 = Averager::default();
        let mut avg_so2_aqi = Averager::default();
        let mut avg_co = Averager::default();
        let mut avg_co_aqi = Averager::default();
        let mut avg_temp = Averager::default();
        let mut avg_humidity = Averager::default();

        for row in &rows {
            let overall_aqi: i32 = row.get("overall_aqi");
            sum_overall += overall_aqi as f64;
            let dominant: String = row.get("dominant_pollutant");
            *dominant_counts.entry(dominant).or_insert(0) += 1;

            avg_pm25.push(row.get("pm25_concentration"));
            avg_pm25_aqi.push(row.get::<Option<i32>, _>("pm25_aqi").map(|v| v as f64));
            avg_pm10.push(row.get("pm10_concentration"));
            avg_pm10_aqi.push(row.get::<Option<i32>, _>("pm10_aqi").map(|v| v as f64));
            avg_o3.push(row.get("o3_concentration"));
            avg_o3_aqi.push(row.get::<Option<i32>, _>("o3_aqi").map(|v| v as f64));
            avg_no2.push(row.get("no2_concentration"));
            avg_no2_aqi.push(row.get::<Option<i32>, _>("no2_aqi").map(|v| v as f64));
            avg_so2.push(row.get("so2_concentration"));
            avg_so2_aqi.push(row.get::<Option<i32>, _>("so2_aqi").map(|v| v as f64));
            avg_co.push(row.get("co_concentration"));
            avg_co_aqi.push(row.get::<Option<i32>, _>("co_aqi").map(|v| v as f64));
            avg_temp.push(row.get("temperature_c"));
            avg_humidity.push(row.get("humidity_pct"));
        }

        let avg_overall_aqi = sum_overall / count;
        let dominant_pollutant = dominant_counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .map(|(pollutant, _)| pollutant)
            .unwrap_or_default();
        let category = AqiCategory::from_aqi(avg_overall_aqi.round() as u32).label().to_string();

        Ok(Some(DailyTrendRow {
            city: city.to_string(),
            latitude,
            longitude,
            location_id: location_id.to_string(),
            date,
            avg_overall_aqi,
            avg_pm25: avg_pm25.mean(),
            avg_pm25_aqi: avg_pm25_aqi.mean(),
            avg_pm10: avg_pm10.mean(),
            avg_pm10_aqi: avg_pm10_aqi.mean(),
            avg_o3: avg_o3.mean(),
            avg_o3_aqi: avg_o3_aqi.mean(),
            avg_no2: avg_no2.mean(),
            avg_no2_aqi: avg_no2_aqi.mean(),
            avg_so2: avg_so2.mean(),
            avg_so2_aqi: avg_so2_aqi.mean(),
            avg_co: avg_co.mean(),
            avg_co_aqi: avg_co_aqi.mean(),
            avg_temperature_c: avg_temp.mean(),
            avg_humidity_pct: avg_humidity.mean(),
            dominant_pollutant,
            category,
            completeness: count / 24.0,
        }))
    }
}

/// Truncates a timestamp to the top of its hour (§4.7: "only the hour
/// precision matters; the timestamp is always truncated to the hour").
fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0).and_then(|t| t.with_second(0)).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

/// Accumulates an `Option<f64>` stream into a mean, skipping `None`s.
#[derive(Default)]
struct Averager {
    sum: f64,
    count: usize,
}

impl Averager {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            if !v.is_nan() {
                self.sum += v;
                self.count += 1;
            }
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Postgres-backed implementation of the hourly history store (C5, §4.5),
/// used by the scheduler in production; `InMemoryHistoryStore` (in
/// `crate::history`) backs tests and the demo path instead.
#[async_trait]
impl HistoryStore for Database {
    async fn read(&self, location_id: &str) -> Vec<HourlyHistoryEntry> {
        let rows = sqlx::query(
            r#"SELECT hour_ts, pollutants FROM hourly_history WHERE location_id = $1 ORDER BY hour_ts DESC LIMIT $2"#,
        )
        .bind(location_id)
        .bind(MAX_HISTORY_ENTRIES as i64)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to read hourly_history for {}: {}", location_id, e);
            Vec::new()
        });

        rows.into_iter()
            .filter_map(|row| {
                let hour_ts: DateTime<Utc> = row.try_get("hour_ts").ok()?;
                let raw: serde_json::Value = row.try_get("pollutants").ok()?;
                let pollutants: HashMap<Pollutant, HistoricalPollutantValue> = serde_json::from_value(raw).ok()?;
                Some(HourlyHistoryEntry { hour_ts, pollutants })
            })
            .collect()
    }

    async fn write(&self, location_id: &str, entry: HourlyHistoryEntry) {
        let payload = match serde_json::to_value(&entry.pollutants) {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to serialize hourly history entry for {}: {}", location_id, e);
                return;
            },
        };

        let result = sqlx::query(
            r#"
            INSERT INTO hourly_history (location_id, hour_ts, pollutants)
            VALUES ($1, $2, $3)
            ON CONFLICT (location_id, hour_ts) DO UPDATE SET pollutants = EXCLUDED.pollutants
            "#,
        )
        .bind(location_id)
        .bind(entry.hour_ts)
        .bind(payload)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!("Failed to write hourly_history for {}: {}", location_id, e);
            return;
        }

        // Keep only the most recent MAX_HISTORY_ENTRIES rows for this
        // location -- the row-level equivalent of `apply_write`'s truncation
        // in the in-memory backend (§3/§8 property 5).
        let prune = sqlx::query(
            r#"
            DELETE FROM hourly_history
            WHERE location_id = $1 AND hour_ts NOT IN (
                SELECT hour_ts FROM hourly_history WHERE location_id = $1 ORDER BY hour_ts DESC LIMIT $2
            )
            "#,
        )
        .bind(location_id)
        .bind(MAX_HISTORY_ENTRIES as i64)
        .execute(&self.pool)
        .await;

        if let Err(e) = prune {
            error!("Failed to prune hourly_history for {}: {}", location_id, e);
        }
    }
}

/// Builds a [`ComprehensiveAqiHourlyRow`] from a fused/AQI result pair plus
/// provenance (convenience used by the scheduler after each pipeline run).
pub fn build_hourly_row(
    city: &str,
    latitude: f64,
    longitude: f64,
    location_id: &str,
    timestamp: DateTime<Utc>,
    aqi: &crate::models::AqiResult,
    fused: &HashMap<Pollutant, crate::models::FusedConcentration>,
    weather: Option<&crate::models::WeatherContext>,
) -> ComprehensiveAqiHourlyRow {
    let column = |pollutant: Pollutant| -> PollutantColumn {
        let fc = fused.get(&pollutant);
        let per_pollutant_aqi = aqi.per_pollutant.iter().find(|p| p.pollutant == pollutant);
        PollutantColumn {
            concentration: fc.map(|f| f.value),
            aqi: per_pollutant_aqi.map(|p| p.aqi_int as i32),
            bias_corrected: fc.map(|f| f.bias_correction_applied).unwrap_or(false),
        }
    };

    let data_sources: serde_json::Value = serde_json::json!(fused
        .iter()
        .map(|(pollutant, fc)| {
            (pollutant.to_string(), serde_json::json!({
                "sources_used": fc.sources_used,
                "weights_used": fc.weights_used,
                "bias_correction_applied": fc.bias_correction_applied,
                "confidence": fc.confidence,
            }))
        })
        .collect::<HashMap<_, _>>());

    ComprehensiveAqiHourlyRow {
        city: city.to_string(),
        latitude,
        longitude,
        location_id: location_id.to_string(),
        timestamp,
        overall_aqi: aqi.aqi as i32,
        category: aqi.category.label().to_string(),
        dominant_pollutant: aqi.dominant_pollutant.to_string(),
        health_message: aqi.health_message.clone(),
        pm25: column(Pollutant::Pm25),
        pm10: column(Pollutant::Pm10),
        o3: column(Pollutant::O3),
        no2: column(Pollutant::No2),
        so2: column(Pollutant::So2),
        co: column(Pollutant::Co),
        temperature_c: weather.and_then(|w| w.temperature_c),
        humidity_pct: weather.and_then(|w| w.humidity_pct),
        pressure_hpa: weather.and_then(|w| w.pressure_hpa),
        wind_speed_ms: weather.and_then(|w| w.wind_speed_ms),
        wind_direction_deg: weather.and_then(|w| w.wind_direction_deg),
        why_today: aqi.why_today.clone(),
        data_sources,
    }
}

#[cfg(test)]
#[cfg(feature = "integration-tests")]
mod tests {
    use super::*;
    use crate::models::Location;
    use chrono::{Duration, TimeZone};
    use sqlx::PgPool;

    fn sample_row(city: &str, timestamp: DateTime<Utc>, aqi: i32) -> ComprehensiveAqiHourlyRow {
        let loc = Location::new(40.7128, -74.0060, city);
        ComprehensiveAqiHourlyRow {
            city: city.to_string(),
            latitude: loc.latitude,
            longitude: loc.longitude,
            location_id: loc.id(),
            timestamp,
            overall_aqi: aqi,
            category: AqiCategory::from_aqi(aqi as u32).label().to_string(),
            dominant_pollutant: Pollutant::Pm25.to_string(),
            health_message: "test".to_string(),
            pm25: PollutantColumn { concentration: Some(20.0), aqi: Some(aqi), bias_corrected: true },
            pm10: PollutantColumn::default(),
            o3: PollutantColumn::default(),
            no2: PollutantColumn::default(),
            so2: PollutantColumn::default(),
            co: PollutantColumn::default(),
            temperature_c: Some(22.0),
            humidity_pct: Some(55.0),
            pressure_hpa: None,
            wind_speed_ms: None,
            wind_direction_deg: None,
            why_today: "PM2.5 is today's dominant pollutant.".to_string(),
            data_sources: serde_json::json!({}),
        }
    }

    #[sqlx::test]
    async fn test_init_schema_creates_all_tables(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        for table in ["hourly_history", "comprehensive_aqi_hourly", "daily_aqi_trends"] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)",
            )
            .bind(table)
            .fetch_one(&db.pool)
            .await?;
            assert!(exists, "{table} should exist after init_schema");
        }
        Ok(())
    }

    /// §8 property 6: persistence idempotence -- running the pipeline twice
    /// for the same (location, hour) leaves exactly one row, with the second
    /// run's values.
    #[sqlx::test]
    async fn test_upsert_hourly_is_idempotent(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 14, 0, 0).unwrap();
        db.upsert_hourly(&sample_row("New York", ts, 61)).await?;
        db.upsert_hourly(&sample_row("New York", ts, 75)).await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comprehensive_aqi_hourly WHERE city = 'New York'")
            .fetch_one(&db.pool)
            .await?;
        assert_eq!(count, 1);

        let stored_aqi: i32 = sqlx::query_scalar("SELECT overall_aqi FROM comprehensive_aqi_hourly WHERE city = 'New York'")
            .fetch_one(&db.pool)
            .await?;
        assert_eq!(stored_aqi, 75);
        Ok(())
    }

    #[sqlx::test]
    async fn test_upsert_hourly_truncates_to_hour(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 14, 47, 12).unwrap();
        db.upsert_hourly(&sample_row("Boston", ts, 40)).await?;

        let stored: DateTime<Utc> = sqlx::query_scalar("SELECT timestamp FROM comprehensive_aqi_hourly WHERE city = 'Boston'")
            .fetch_one(&db.pool)
            .await?;
        assert_eq!(stored.minute(), 0);
        assert_eq!(stored.second(), 0);
        Ok(())
    }

    #[sqlx::test]
    async fn test_history_store_round_trips_via_postgres(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        let mut pollutants = HashMap::new();
        pollutants.insert(Pollutant::Pm25, HistoricalPollutantValue {
            value: 12.0,
            units: "ug/m3".to_string(),
            source: "ground_a".to_string(),
            quality: Quality::Good,
            bias_corrected: false,
        });
        let entry = HourlyHistoryEntry { hour_ts: Utc::now(), pollutants };

        db.write("40.7128_-74.0060", entry).await;
        let history = db.read("40.7128_-74.0060").await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pollutants[&Pollutant::Pm25].value, 12.0);
        Ok(())
    }

    #[sqlx::test]
    async fn test_history_store_prunes_beyond_25(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        let base = Utc::now();
        for i in 0..40 {
            let mut pollutants = HashMap::new();
            pollutants.insert(Pollutant::Pm25, HistoricalPollutantValue {
                value: i as f64,
                units: "ug/m3".to_string(),
                source: "ground_a".to_string(),
                quality: Quality::Good,
                bias_corrected: false,
            });
            db.write("loc", HourlyHistoryEntry { hour_ts: base - Duration::hours(i), pollutants }).await;
        }

        let history = db.read("loc").await;
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
        Ok(())
    }

    #[sqlx::test]
    async fn test_rollup_day_averages_hourly_rows(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;

        let date = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        for hour in 0..24 {
            let ts = date + Duration::hours(hour);
            db.upsert_hourly(&sample_row("New York", ts, 50 + hour as i32)).await?;
        }

        let rollup = db.rollup_day("New York", 40.7128, -74.0060, "40.7128_-74.0060", date.date_naive()).await?.unwrap();
        assert_eq!(rollup.completeness, 1.0);
        assert!((rollup.avg_overall_aqi - 61.5).abs() < 1e-6);
        Ok(())
    }

    #[sqlx::test]
    async fn test_rollup_day_returns_none_when_empty(pool: PgPool) -> Result<()> {
        let db = Database { pool };
        db.init_schema().await?;
        let rollup = db.rollup_day("Nowhere", 0.0, 0.0, "0.0000_0.0000", Utc::now().date_naive()).await?;
        assert!(rollup.is_none());
        Ok(())
    }

    #[test]
    fn null_coercion_collapses_sentinels() {
        assert_eq!(to_sql_null_str(""), None);
        assert_eq!(to_sql_null_str("null"), None);
        assert_eq!(to_sql_null_str("NULL"), None);
        assert_eq!(to_sql_null_str("PM25"), Some("PM25"));
        assert_eq!(to_sql_null_f64(Some(f64::NAN)), None);
        assert_eq!(to_sql_null_f64(Some(1.5)), Some(1.5));
        assert_eq!(to_sql_null_f64(None), None);
    }
}
