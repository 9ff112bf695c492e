use serde::Serialize;
use strum::Display;
use thiserror::Error;

/// Which upstream collaborator a [`RoutingError::SourceUnreachable`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    Graph,
    Environment,
    Geocoder,
}

/// Errors surfaced to the caller of a routing request.
///
/// Each variant renders as a message the end user can act on. Geometry and
/// feature extraction never produce one of these; environmental failures are
/// absorbed before they reach this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error(
        "points too far apart ({distance_m:.0} m, limit {max_m:.0} m); request a route with a narrower corridor"
    )]
    RegionTooLarge { distance_m: f64, max_m: f64 },

    #[error(
        "the graph data provider refused a {radius_m:.0} m search radius ({reason}); try points closer together or a smaller search radius"
    )]
    RegionRefused { radius_m: f64, reason: String },

    #[error("the {provider} data provider could not be reached ({reason}); try again shortly")]
    SourceUnreachable { provider: DataSource, reason: String },

    #[error("no usable road data in this area; try points on or near a public road")]
    GraphUnavailable,

    #[error("no road path found between these points; try points closer together or a larger search radius")]
    NoPathFound,

    #[error("no place matches \"{query}\"; try a more specific name or \"lat,lon\"")]
    PlaceNotFound { query: String },

    #[error("invalid coordinate ({lat}, {lon}); latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidCoordinate { lat: f64, lon: f64 },
}

impl RoutingError {
    /// Stable identifier used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RoutingError::RegionTooLarge { .. } | RoutingError::RegionRefused { .. } => {
                "region_too_large"
            }
            RoutingError::SourceUnreachable { .. } => "source_unreachable",
            RoutingError::GraphUnavailable => "graph_unavailable",
            RoutingError::NoPathFound => "no_path_found",
            RoutingError::PlaceNotFound { .. } => "place_not_found",
            RoutingError::InvalidCoordinate { .. } => "invalid_coordinate",
        }
    }
}

/// Failures reported by graph and environmental providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("requested region too large for provider: {0}")]
    RegionTooLarge(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Unreachable(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("could not decode surface image: {0}")]
    Image(#[from] image::ImageError),
    #[error("unsupported surface image: {0}")]
    Format(String),
}
