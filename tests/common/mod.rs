#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use saferoute::environment::WeatherCondition;
use saferoute::error::ProviderError;
use saferoute::geometry::{BoundingRegion, Coordinate};
use saferoute::graph::{RawGraphData, RawNode, RawWay};
use saferoute::providers::{Conditions, EnvironmentProvider, Geocoder, GraphProvider};

const METERS_PER_DEGREE: f64 = 111_320.0;

fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Square street grid covering the requested disk: lit primary roads run
/// east-west, residential streets north-south.
pub struct Grid {
    pub spacing_m: f64,
}

impl Default for Grid {
    fn default() -> Self {
        Self { spacing_m: 250.0 }
    }
}

impl GraphProvider for Grid {
    async fn fetch_road_network(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<RawGraphData, ProviderError> {
        let steps = (radius_m / self.spacing_m).floor() as i64;
        let dlat = self.spacing_m / METERS_PER_DEGREE;
        let dlon = dlat / center.lat().to_radians().cos();
        let id = |row: i64, col: i64| (row + steps) * 10_000 + (col + steps);

        let mut raw = RawGraphData::default();
        for row in -steps..=steps {
            for col in -steps..=steps {
                raw.nodes.push(RawNode {
                    id: id(row, col),
                    lat: center.lat() + row as f64 * dlat,
                    lon: center.lon() + col as f64 * dlon,
                });
            }
        }
        for i in -steps..=steps {
            raw.ways.push(RawWay {
                id: 1_000_000 + i,
                refs: (-steps..=steps).map(|col| id(i, col)).collect(),
                tags: tags(&[("highway", "primary"), ("lanes", "2"), ("lit", "yes")]),
            });
            raw.ways.push(RawWay {
                id: 2_000_000 + i,
                refs: (-steps..=steps).map(|row| id(row, i)).collect(),
                tags: tags(&[("highway", "residential")]),
            });
        }
        Ok(raw)
    }
}

/// Two short roads 1 km apart that never meet.
pub struct Islands;

impl GraphProvider for Islands {
    async fn fetch_road_network(&self, center: Coordinate, _: f64) -> Result<RawGraphData, ProviderError> {
        let (lat, lon) = (center.lat(), center.lon());
        Ok(RawGraphData {
            nodes: vec![
                RawNode { id: 1, lat: lat - 0.0045, lon },
                RawNode { id: 2, lat: lat - 0.0045, lon: lon + 0.002 },
                RawNode { id: 3, lat: lat + 0.0045, lon },
                RawNode { id: 4, lat: lat + 0.0045, lon: lon + 0.002 },
            ],
            ways: vec![
                RawWay {
                    id: 1,
                    refs: vec![1, 2],
                    tags: tags(&[("highway", "tertiary")]),
                },
                RawWay {
                    id: 2,
                    refs: vec![3, 4],
                    tags: tags(&[("highway", "tertiary")]),
                },
            ],
        })
    }
}

pub enum Weather {
    Fixed(Conditions),
    Hangs,
}

impl Weather {
    pub fn smoggy_rain() -> Self {
        Weather::Fixed(Conditions {
            aqi: 180,
            temperature_c: 17.5,
            condition: WeatherCondition::Rain,
        })
    }
}

impl EnvironmentProvider for Weather {
    async fn fetch_conditions(&self, _: &BoundingRegion) -> Result<Conditions, ProviderError> {
        match self {
            Weather::Fixed(conditions) => Ok(*conditions),
            Weather::Hangs => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Unreachable("never answered".into()))
            }
        }
    }
}

/// Knows two Delhi landmarks by name.
pub struct Landmarks;

impl Geocoder for Landmarks {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, ProviderError> {
        Ok(match query {
            "India Gate" => Some(coordinate(28.6129, 77.2295)),
            "Connaught Place" => Some(coordinate(28.6315, 77.2167)),
            _ => None,
        })
    }
}

pub fn coordinate(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).unwrap()
}
