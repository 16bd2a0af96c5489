//! Satellite tile adapter (§4.2): nearest-pixel selection plus NASA-compliant
//! quality filtering over a gridded NO2/HCHO/O3 tile, against an injectable
//! [`BlobStore`] rather than a hard-coded S3 client (§9 design note).

use super::blobstore::BlobStore;
use super::{SourceAdapter, SOURCE_SATELLITE};
use crate::models::{AdapterOutput, Pollutant, Quality, RawPollutantMeasurement, SourceDiagnostics, Unit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;

/// Column-density-to-surface-ppb proxy factors (§4.2). These are the pipeline's
/// stated approximation, not a physically exact column-to-surface inversion.
/// NO2 and HCHO columns arrive as raw molecules/cm2 on the order of 1e15-1e16;
/// the published factors (3.5, 2.8) are meant to scale a column expressed in
/// units of 1e16 molecules/cm2, matching §8 scenario S1's worked example
/// (column 2.5e15 -> 0.875 ppb: (2.5e15 / 1e16) * 3.5 = 0.875).
const NO2_COLUMN_TO_PPB: f64 = 3.5;
const HCHO_COLUMN_TO_PPB: f64 = 2.8;
const COLUMN_DENSITY_SCALE: f64 = 1e-16;
/// Rough Dobson-Unit-to-surface-ppb proxy for total-column O3 (§4.2: "a
/// DU-to-ppb factor for total O3"); the source text names no concrete value,
/// so this crate documents its own choice here rather than in `epa`. Dobson
/// Units are already on the O(100-500) scale the raw granule value carries,
/// so no `COLUMN_DENSITY_SCALE` applies -- only NO2/HCHO arrive as raw
/// molecules/cm2 column densities.
const O3_DU_TO_PPB: f64 = 0.85;

const CLOUD_FRACTION_MAX: f64 = 0.2;

struct GasProduct {
    gas: &'static str,
    pollutant: Pollutant,
    column_to_ppb: f64,
    /// Multiplied against the raw granule value before `column_to_ppb` is
    /// applied; `COLUMN_DENSITY_SCALE` for molecules/cm2 products, 1.0 for
    /// Dobson-Unit O3.
    raw_scale: f64,
}

const PRODUCTS: [GasProduct; 3] = [
    GasProduct { gas: "NO2", pollutant: Pollutant::No2, column_to_ppb: NO2_COLUMN_TO_PPB, raw_scale: COLUMN_DENSITY_SCALE },
    GasProduct { gas: "HCHO", pollutant: Pollutant::Hcho, column_to_ppb: HCHO_COLUMN_TO_PPB, raw_scale: COLUMN_DENSITY_SCALE },
    GasProduct { gas: "O3", pollutant: Pollutant::O3, column_to_ppb: O3_DU_TO_PPB, raw_scale: 1.0 },
];

pub struct SatelliteAdapter<B: BlobStore> {
    blob_store: B,
}

impl<B: BlobStore> SatelliteAdapter<B> {
    pub fn new(blob_store: B) -> Self {
        Self { blob_store }
    }

    /// Reads the single nearest pixel for one gas product and applies the
    /// NASA-compliant quality filters (§4.2): quality flag must be 0, cloud
    /// fraction < 0.2, value must be non-fill, non-NaN, positive.
    async fn fetch_one(
        &self,
        product: &GasProduct,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
    ) -> Result<RawPollutantMeasurement, String> {
        let granule = self
            .blob_store
            .latest_granule(product.gas, now.date_naive())
            .await
            .ok_or_else(|| format!("no granule available for {}", product.gas))?;

        let (row, col) = granule.nearest_pixel(lat, lon);
        let flag = granule.quality_flag[[row, col]];
        let cloud = granule.cloud_fraction[[row, col]];
        let raw_value = granule.value[[row, col]];

        if flag != 0 {
            return Err(format!("quality_flag={flag} at nearest pixel"));
        }
        if cloud >= CLOUD_FRACTION_MAX {
            return Err(format!("cloud_fraction={cloud:.2} exceeds {CLOUD_FRACTION_MAX}"));
        }
        if raw_value.is_nan() || (raw_value - granule.fill_value).abs() < f64::EPSILON || raw_value <= 0.0 {
            return Err(format!("non-usable value {raw_value} (fill={})", granule.fill_value));
        }

        let ppb = raw_value * product.raw_scale * product.column_to_ppb;
        Ok(RawPollutantMeasurement {
            pollutant: product.pollutant,
            value: ppb,
            units: Unit::Ppb,
            source_tag: SOURCE_SATELLITE.to_string(),
            quality: Quality::NasaCompliant,
            uncertainty_hint: None,
            observed_at: now,
        })
    }
}

#[async_trait]
impl<B: BlobStore> SourceAdapter for SatelliteAdapter<B> {
    fn source_id(&self) -> &'static str {
        SOURCE_SATELLITE
    }

    async fn fetch(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> AdapterOutput {
        let mut measurements = HashMap::new();
        let mut diagnostics = SourceDiagnostics::default();
        let started = Instant::now();

        for product in &PRODUCTS {
            diagnostics.attempts += 1;
            match self.fetch_one(product, lat, lon, now).await {
                Ok(measurement) => {
                    measurements.insert(product.pollutant, measurement);
                },
                Err(reason) => {
                    // Filtered pixels are preserved for auditing with
                    // quality=filtered, never promoted downstream (§4.2/§7).
                    diagnostics.filter_reasons.push(format!("{}: {reason}", product.gas));
                    measurements.insert(product.pollutant, RawPollutantMeasurement {
                        pollutant: product.pollutant,
                        value: 0.0,
                        units: Unit::Ppb,
                        source_tag: SOURCE_SATELLITE.to_string(),
                        quality: Quality::Filtered,
                        uncertainty_hint: None,
                        observed_at: now,
                    });
                },
            }
        }

        diagnostics.latency_ms = started.elapsed().as_millis() as u64;
        AdapterOutput { measurements, weather: None, diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::blobstore::{InMemoryBlobStore, SatelliteGranule};
    use ndarray::array;

    fn clean_granule() -> SatelliteGranule {
        SatelliteGranule {
            latitude_axis: vec![40.7],
            longitude_axis: vec![-74.0],
            value: array![[2.5e15]],
            quality_flag: array![[0]],
            cloud_fraction: array![[0.05]],
            fill_value: -999.0,
        }
    }

    fn cloudy_granule() -> SatelliteGranule {
        let mut g = clean_granule();
        g.cloud_fraction = array![[0.45]];
        g
    }

    /// S1 (§8): NO2 column 2.5e15 -> 0.875 ppb.
    #[tokio::test]
    async fn accepts_clean_pixel() {
        let store = InMemoryBlobStore::new().with_granule("NO2", clean_granule());
        let adapter = SatelliteAdapter::new(store);
        let out = adapter.fetch(40.7128, -74.0060, Utc::now()).await;
        let no2 = out.measurements.get(&Pollutant::No2).unwrap();
        assert_eq!(no2.quality, Quality::NasaCompliant);
        assert!((no2.value - 0.875).abs() < 1e-9, "got {}", no2.value);
    }

    /// S2 (§8): cloudy pixel (cloud fraction 0.45) is dropped with QualityFiltered.
    #[tokio::test]
    async fn filters_cloudy_pixel() {
        let store = InMemoryBlobStore::new().with_granule("NO2", cloudy_granule());
        let adapter = SatelliteAdapter::new(store);
        let out = adapter.fetch(40.7128, -74.0060, Utc::now()).await;
        let no2 = out.measurements.get(&Pollutant::No2).unwrap();
        assert_eq!(no2.quality, Quality::Filtered);
        assert!(!out.diagnostics.filter_reasons.is_empty());
    }

    #[tokio::test]
    async fn missing_granule_is_filtered_not_panicking() {
        let store = InMemoryBlobStore::new();
        let adapter = SatelliteAdapter::new(store);
        let out = adapter.fetch(40.7128, -74.0060, Utc::now()).await;
        assert_eq!(out.measurements.len(), 3);
        assert!(out.measurements.values().all(|m| m.quality == Quality::Filtered));
    }
}
