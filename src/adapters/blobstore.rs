//! Object-store abstraction the satellite adapter reads gridded tiles through.
//!
//! Grounded in the teacher's dependency-injection style (`Database` passed by
//! value rather than reached for globally, §9 design note) generalized to an
//! async trait so tests can supply an in-memory fixture instead of real
//! EarthData S3 credentials (§4.2/§6).

use async_trait::async_trait;
use ndarray::Array2;

/// One gridded satellite tile's relevant variables, already materialized as a
/// "lazy hyperslab" read would leave them: 1-D lat/lon axes plus 2-D value,
/// quality-flag, and cloud-fraction arrays on the same grid (§4.2).
#[derive(Debug, Clone)]
pub struct SatelliteGranule {
    pub latitude_axis: Vec<f64>,
    pub longitude_axis: Vec<f64>,
    /// Column density (molecules/cm2) or total-column value, per-pollutant grid.
    pub value: Array2<f64>,
    /// NASA quality flag grid; 0 means the pixel passed quality control.
    pub quality_flag: Array2<i32>,
    /// Effective cloud fraction grid, in [0, 1].
    pub cloud_fraction: Array2<f64>,
    pub fill_value: f64,
}

impl SatelliteGranule {
    /// Nearest-neighbour argmin over the 1-D latitude and longitude axes,
    /// returning the single `(row, col)` pixel index to read (§4.2/GLOSSARY).
    pub fn nearest_pixel(&self, lat: f64, lon: f64) -> (usize, usize) {
        let row = argmin_abs_diff(&self.latitude_axis, lat);
        let col = argmin_abs_diff(&self.longitude_axis, lon);
        (row, col)
    }
}

fn argmin_abs_diff(axis: &[f64], target: f64) -> usize {
    axis.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (*a - target).abs().partial_cmp(&(*b - target).abs()).unwrap()
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// One named gas product's most recent granule for a given day.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Lists objects under the gas's prefix and reads the most recent one,
    /// returning `None` if no granule is available for today (§6:
    /// `s3://asdc-prod-protected/TEMPO/TEMPO_{gas}_L3_V03/YYYY.MM.DD/*.nc`).
    async fn latest_granule(&self, gas: &str, date: chrono::NaiveDate) -> Option<SatelliteGranule>;
}

/// Test/demo fixture: an in-process map of `gas -> granule`. No network or
/// credentials required; the satellite adapter issues the identical
/// nearest-pixel/quality-filter logic against it as it would a real tile.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStore {
    granules: std::collections::HashMap<String, SatelliteGranule>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_granule(mut self, gas: impl Into<String>, granule: SatelliteGranule) -> Self {
        self.granules.insert(gas.into(), granule);
        self
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn latest_granule(&self, gas: &str, _date: chrono::NaiveDate) -> Option<SatelliteGranule> {
        self.granules.get(gas).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn granule() -> SatelliteGranule {
        SatelliteGranule {
            latitude_axis: vec![40.0, 40.5, 41.0],
            longitude_axis: vec![-75.0, -74.5, -74.0],
            value: array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
            quality_flag: array![[0, 0, 0], [0, 0, 0], [0, 0, 0]],
            cloud_fraction: array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
            fill_value: -999.0,
        }
    }

    #[test]
    fn nearest_pixel_picks_closest_grid_cell() {
        let g = granule();
        let (row, col) = g.nearest_pixel(40.71, -74.0);
        assert_eq!((row, col), (1, 2));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryBlobStore::new().with_granule("NO2", granule());
        let found = store.latest_granule("NO2", chrono::Utc::now().date_naive()).await;
        assert!(found.is_some());
        assert!(store.latest_granule("O3", chrono::Utc::now().date_naive()).await.is_none());
    }
}
