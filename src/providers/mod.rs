//! Narrow interfaces to the external data sources, plus the concrete
//! providers the service ships with.

use std::future::Future;

use crate::environment::WeatherCondition;
use crate::error::ProviderError;
use crate::geometry::{BoundingRegion, Coordinate};
use crate::graph::RawGraphData;

pub mod nominatim;
pub mod open_meteo;
pub mod overpass;
pub mod pbf;

pub use nominatim::NominatimGeocoder;
pub use open_meteo::OpenMeteoProvider;
pub use overpass::OverpassProvider;
pub use pbf::PbfExtract;

/// Source of raw road network data. `radius_m` is always pre-clamped.
pub trait GraphProvider: Send + Sync {
    fn fetch_road_network(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> impl Future<Output = Result<RawGraphData, ProviderError>> + Send;
}

/// Current air quality and weather, as reported by a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conditions {
    pub aqi: u32,
    pub temperature_c: f64,
    pub condition: WeatherCondition,
}

pub trait EnvironmentProvider: Send + Sync {
    fn fetch_conditions(
        &self,
        region: &BoundingRegion,
    ) -> impl Future<Output = Result<Conditions, ProviderError>> + Send;
}

/// Resolves a free-text place name. `Ok(None)` means nothing matched.
pub trait Geocoder: Send + Sync {
    fn geocode(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Option<Coordinate>, ProviderError>> + Send;
}

/// Graph provider selected at start-up.
pub enum GraphSource {
    Overpass(OverpassProvider),
    Pbf(PbfExtract),
}

impl GraphProvider for GraphSource {
    async fn fetch_road_network(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<RawGraphData, ProviderError> {
        match self {
            GraphSource::Overpass(p) => p.fetch_road_network(center, radius_m).await,
            GraphSource::Pbf(p) => p.fetch_road_network(center, radius_m).await,
        }
    }
}

/// Environmental provider selected at start-up. `Disabled` always fails,
/// which the fusion service turns into a neutral snapshot.
pub enum EnvironmentSource {
    OpenMeteo(OpenMeteoProvider),
    Disabled,
}

impl EnvironmentProvider for EnvironmentSource {
    async fn fetch_conditions(&self, region: &BoundingRegion) -> Result<Conditions, ProviderError> {
        match self {
            EnvironmentSource::OpenMeteo(p) => p.fetch_conditions(region).await,
            EnvironmentSource::Disabled => Err(ProviderError::Unreachable(
                "environmental provider disabled".to_string(),
            )),
        }
    }
}

/// Geocoder selected at start-up. `Disabled` matches no place names, so
/// only coordinates are accepted.
pub enum GeocoderSource {
    Nominatim(NominatimGeocoder),
    Disabled,
}

impl Geocoder for GeocoderSource {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, ProviderError> {
        match self {
            GeocoderSource::Nominatim(g) => g.geocode(query).await,
            GeocoderSource::Disabled => Ok(None),
        }
    }
}
