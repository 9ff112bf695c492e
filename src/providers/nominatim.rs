use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::Deserialize;

use super::Geocoder;
use crate::error::ProviderError;
use crate::geometry::Coordinate;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Nominatim reports coordinates as decimal strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Resolves free-text place names through a Nominatim instance.
pub struct NominatimGeocoder {
    client: Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("saferoute/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, ProviderError> {
        let places: Vec<Place> = self
            .client
            .get(format!("{}/search", self.url))
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        first_match(places)
    }
}

fn first_match(places: Vec<Place>) -> Result<Option<Coordinate>, ProviderError> {
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let lat = place.lat.parse::<f64>();
    let lon = place.lon.parse::<f64>();
    let (Ok(lat), Ok(lon)) = (lat, lon) else {
        return Err(ProviderError::Malformed(format!(
            "unreadable coordinates ({}, {})",
            place.lat, place.lon
        )));
    };
    debug!(
        "Geocoded to ({lat}, {lon}) {}",
        place.display_name.as_deref().unwrap_or_default()
    );
    Coordinate::new(lat, lon)
        .map(Some)
        .map_err(|e| ProviderError::Malformed(e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(json: &str) -> Result<Option<Coordinate>, ProviderError> {
        first_match(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_takes_first_place() {
        let found = parse(
            r#"[
                {"place_id": 1, "lat": "30.3398", "lon": "76.3869", "display_name": "Patiala, Punjab, India"},
                {"place_id": 2, "lat": "0", "lon": "0"}
            ]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.lat(), 30.3398);
        assert_eq!(found.lon(), 76.3869);
    }

    #[test]
    fn test_no_places_is_none() {
        assert_eq!(parse("[]").unwrap(), None);
    }

    #[test]
    fn test_bad_coordinates_are_malformed() {
        assert!(matches!(
            parse(r#"[{"lat": "north", "lon": "76.3"}]"#),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            parse(r#"[{"lat": "95.0", "lon": "76.3"}]"#),
            Err(ProviderError::Malformed(_))
        ));
    }
}
