use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::info;
use osmpbf::{Element, ElementReader};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

use super::GraphProvider;
use crate::error::ProviderError;
use crate::geometry::{BoundingRegion, Coordinate};
use crate::graph::{RawGraphData, RawNode, RawWay};

type IndexedNode = GeomWithData<[f64; 2], i64>;

struct ExtractData {
    ways: Vec<RawWay>,
    nodes: HashMap<i64, (f64, f64)>,
    index: RTree<IndexedNode>,
}

/// A local `.osm.pbf` extract held in memory and cut into disks on request.
#[derive(Clone)]
pub struct PbfExtract {
    data: Arc<ExtractData>,
}

impl PbfExtract {
    pub fn open(path: &Path) -> Result<Self, osmpbf::Error> {
        info!("Parsing OSM PBF: {}", path.display());

        // PASS 1: highway ways, so only their nodes need to be kept.
        let mut ways = Vec::new();
        let mut wanted: HashSet<i64> = HashSet::new();
        ElementReader::from_path(path)?.for_each(|element| {
            if let Element::Way(way) = element {
                if !way.tags().any(|(k, _)| k == "highway") {
                    return;
                }
                let refs: Vec<i64> = way.refs().collect();
                wanted.extend(refs.iter().copied());
                ways.push(RawWay {
                    id: way.id(),
                    refs,
                    tags: way
                        .tags()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                });
            }
        })?;

        // PASS 2: coordinates of referenced nodes.
        let mut nodes = HashMap::with_capacity(wanted.len());
        ElementReader::from_path(path)?.for_each(|element| {
            let (id, lat, lon) = match element {
                Element::Node(node) => (node.id(), node.lat(), node.lon()),
                Element::DenseNode(node) => (node.id(), node.lat(), node.lon()),
                _ => return,
            };
            if wanted.contains(&id) {
                nodes.insert(id, (lat, lon));
            }
        })?;

        info!("Loaded {} highway ways and {} nodes", ways.len(), nodes.len());
        Ok(Self::from_parts(ways, nodes))
    }

    fn from_parts(ways: Vec<RawWay>, nodes: HashMap<i64, (f64, f64)>) -> Self {
        let index = RTree::bulk_load(
            nodes
                .iter()
                .map(|(id, (lat, lon))| GeomWithData::new([*lon, *lat], *id))
                .collect(),
        );
        Self {
            data: Arc::new(ExtractData { ways, nodes, index }),
        }
    }

    /// Nodes inside the disk, and every way touching one of them.
    fn cut(&self, region: &BoundingRegion) -> RawGraphData {
        let (south, west, north, east) = region.bbox();
        let envelope = AABB::from_corners([west, south], [east, north]);

        let inside: HashSet<i64> = self
            .data
            .index
            .locate_in_envelope(&envelope)
            .filter(|entry| {
                let [lon, lat] = *entry.geom();
                Coordinate::new(lat, lon).is_ok_and(|c| region.contains(&c))
            })
            .map(|entry| entry.data)
            .collect();

        let nodes = inside
            .iter()
            .filter_map(|id| {
                self.data
                    .nodes
                    .get(id)
                    .map(|&(lat, lon)| RawNode { id: *id, lat, lon })
            })
            .collect();
        let ways = self
            .data
            .ways
            .iter()
            .filter(|way| way.refs.iter().any(|id| inside.contains(id)))
            .cloned()
            .collect();

        RawGraphData { nodes, ways }
    }
}

impl GraphProvider for PbfExtract {
    async fn fetch_road_network(
        &self,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<RawGraphData, ProviderError> {
        let extract = self.clone();
        let region = BoundingRegion::new(center, radius_m);
        tokio::task::spawn_blocking(move || extract.cut(&region))
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))
    }
}
