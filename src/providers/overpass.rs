use std::collections::HashMap;
use std::time::Duration;

use log::{debug, error, info};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::GraphProvider;
use crate::error::ProviderError;
use crate::geometry::Coordinate;
use crate::graph::{RawGraphData, RawNode, RawWay};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

const DRIVABLE_HIGHWAYS: &str = "motorway|motorway_link|trunk|trunk_link|primary|primary_link|\
secondary|secondary_link|tertiary|tertiary_link|unclassified|residential|living_street|service|road";

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    elem_type: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    nodes: Option<Vec<i64>>,
    tags: Option<HashMap<String, String>>,
}

/// Fetches drivable ways around a point from an Overpass API instance.
pub struct OverpassProvider {
    client: Client,
    url: String,
    timeout: Duration,
}

impl OverpassProvider {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .user_agent(concat!("saferoute/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            timeout,
        })
    }

    fn query(&self, center: Coordinate, radius_m: f64) -> String {
        format!(
            "[out:json][timeout:{}];\nway[\"highway\"~\"^({})$\"](around:{:.0},{},{});\n(._;>;);\nout body;",
            self.timeout.as_secs().max(1),
            DRIVABLE_HIGHWAYS,
            radius_m,
            center.lat(),
            center.lon()
        )
    }
}

impl GraphProvider for OverpassProvider {
    async fn fetch_road_network(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<RawGraphData, ProviderError> {
        let query = self.query(center, radius_m);
        debug!("Overpass query:\n{}", query);

        let response = self
            .client
            .post(&self.url)
            .body(query)
            .header("Content-Type", "text/plain")
            .send()
            .await
            .map_err(|e| {
                error!("Overpass request failed: {}", e);
                ProviderError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::PAYLOAD_TOO_LARGE => {
                    ProviderError::RegionTooLarge(format!("Overpass returned {status}"))
                }
                StatusCode::BAD_REQUEST => ProviderError::Malformed(format!("Overpass returned {status}")),
                _ => ProviderError::Unreachable(format!("Overpass returned {status}")),
            });
        }

        let body: OverpassResponse = response.json().await?;
        if let Some(remark) = &body.remark {
            if remark.contains("out of memory") || remark.contains("too large") {
                return Err(ProviderError::RegionTooLarge(remark.clone()));
            }
            if remark.contains("runtime error") {
                return Err(ProviderError::Unreachable(remark.clone()));
            }
        }

        let raw = into_raw(body);
        info!(
            "Downloaded {} nodes and {} ways from Overpass",
            raw.nodes.len(),
            raw.ways.len()
        );
        Ok(raw)
    }
}

fn into_raw(body: OverpassResponse) -> RawGraphData {
    let mut raw = RawGraphData::default();
    for elem in body.elements {
        match elem.elem_type.as_str() {
            "node" => {
                if let (Some(lat), Some(lon)) = (elem.lat, elem.lon) {
                    raw.nodes.push(RawNode { id: elem.id, lat, lon });
                }
            }
            "way" => {
                if let Some(refs) = elem.nodes {
                    raw.ways.push(RawWay {
                        id: elem.id,
                        refs,
                        tags: elem.tags.unwrap_or_default(),
                    });
                }
            }
            _ => {}
        }
    }
    raw
}
