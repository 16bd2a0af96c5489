//! Source adapters (C2): one module per external data source. Every adapter
//! implements [`SourceAdapter`] and never lets an error cross its boundary —
//! failures become entries in the returned `SourceDiagnostics` instead (§6).

mod blobstore;
mod ground_a;
mod ground_b;
mod model;
mod satellite;
mod weather;

pub use blobstore::{BlobStore, InMemoryBlobStore, SatelliteGranule};
pub use ground_a::GroundAAdapter;
pub use ground_b::GroundBAdapter;
pub use model::ModelAdapter;
pub use satellite::SatelliteAdapter;
pub use weather::WeatherAdapter;

use crate::models::AdapterOutput;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Stable identifiers used as fusion-weight lookup keys and persisted
/// provenance tags (§4.2/§4.4).
pub const SOURCE_SATELLITE: &str = "satellite";
pub const SOURCE_MODEL: &str = "model";
pub const SOURCE_GROUND_A: &str = "ground_a";
pub const SOURCE_GROUND_B: &str = "ground_b";
pub const SOURCE_WEATHER: &str = "weather";

/// The shared contract every source adapter implements (§6):
///
/// ```text
/// Fetch(lat, lon, nowUTC) -> measurements: map<Pollutant, Measurement>, diagnostics
/// ```
///
/// Implementations never propagate errors out of `fetch` -- every failure
/// (timeout, malformed payload, empty result) is captured as a diagnostic and
/// an empty measurement set, so the collector's fan-out never needs to treat
/// one adapter's failure specially.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The provenance tag this adapter stamps on every measurement it emits.
    fn source_id(&self) -> &'static str;

    async fn fetch(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> AdapterOutput;
}
