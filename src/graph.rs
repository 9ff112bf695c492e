use std::collections::HashMap;
use std::mem::size_of;
use std::str::FromStr;

use log::{debug, info};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::error::RoutingError;
use crate::geometry::{BoundingRegion, Coordinate, path_length_m};

/// OSM node as delivered by a graph provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

/// OSM way as delivered by a graph provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawWay {
    pub id: i64,
    pub refs: Vec<i64>,
    pub tags: HashMap<String, String>,
}

/// Unprocessed road network for one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGraphData {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
}

/// Drivable `highway=*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    MotorwayLink,
    Trunk,
    TrunkLink,
    Primary,
    PrimaryLink,
    Secondary,
    SecondaryLink,
    Tertiary,
    TertiaryLink,
    Unclassified,
    Residential,
    LivingStreet,
    Service,
    Road,
}

impl RoadClass {
    /// Typical speed when no `maxspeed` is posted, km/h.
    pub const fn default_speed_kmh(&self) -> f64 {
        match self {
            RoadClass::Motorway => 100.0,
            RoadClass::Trunk => 80.0,
            RoadClass::MotorwayLink | RoadClass::Primary => 60.0,
            RoadClass::TrunkLink | RoadClass::PrimaryLink | RoadClass::Secondary => 50.0,
            RoadClass::SecondaryLink | RoadClass::Tertiary | RoadClass::TertiaryLink => 40.0,
            RoadClass::Unclassified | RoadClass::Road => 40.0,
            RoadClass::Residential => 30.0,
            RoadClass::Service => 20.0,
            RoadClass::LivingStreet => 15.0,
        }
    }

    pub const fn is_major(&self) -> bool {
        matches!(self, RoadClass::Motorway | RoadClass::Trunk | RoadClass::Primary)
    }

    /// Classes that are commonly unlit when `lit` is untagged.
    pub const fn is_unlit_prone(&self) -> bool {
        matches!(self, RoadClass::Unclassified | RoadClass::Service | RoadClass::Road)
    }
}

/// Optional road attributes. Absent tags stay `None`; defaults are applied
/// by the risk extractor, never here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EdgeAttributes {
    pub road_class: Option<RoadClass>,
    pub lanes: Option<u8>,
    pub width_m: Option<f64>,
    pub lit: Option<bool>,
    pub max_speed_kmh: Option<f64>,
    pub name: Option<String>,
}

impl EdgeAttributes {
    pub fn from_tags(tags: &HashMap<String, String>) -> Self {
        let get = |key: &str| tags.get(key).map(|v| v.trim());

        Self {
            road_class: get("highway").and_then(|v| RoadClass::from_str(v).ok()),
            lanes: get("lanes").and_then(|v| first_value(v).parse::<u8>().ok()),
            width_m: get("width").and_then(parse_width),
            lit: get("lit").and_then(|v| match v {
                "yes" | "24/7" | "automatic" | "limited" | "interval" => Some(true),
                "no" | "disused" => Some(false),
                _ => None,
            }),
            max_speed_kmh: get("maxspeed").and_then(parse_speed),
            name: get("name").map(str::to_string),
        }
    }

    /// Posted speed if tagged, otherwise the class default.
    pub fn speed_estimate_kmh(&self) -> Option<f64> {
        self.max_speed_kmh
            .or_else(|| self.road_class.map(|class| class.default_speed_kmh()))
    }
}

fn first_value(value: &str) -> &str {
    value.split(';').next().unwrap_or(value).trim()
}

fn parse_width(value: &str) -> Option<f64> {
    let value = first_value(value);
    let value = value.strip_suffix('m').unwrap_or(value).trim();
    value.parse::<f64>().ok().filter(|w| *w > 0.0)
}

fn parse_speed(value: &str) -> Option<f64> {
    let value = first_value(value);
    let (number, factor) = match value.strip_suffix("mph") {
        Some(mph) => (mph.trim(), 1.609_344),
        None => (value.strip_suffix("km/h").unwrap_or(value).trim(), 1.0),
    };
    number
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0)
        .map(|v| v * factor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    Forward,
    Backward,
}

fn drivable(tags: &HashMap<String, String>) -> bool {
    let get = |key: &str| tags.get(key).map(String::as_str).unwrap_or("");

    RoadClass::from_str(get("highway")).is_ok()
        && get("area") != "yes"
        && !matches!(get("access"), "private" | "no")
        && !matches!(get("motor_vehicle"), "private" | "no")
        && !matches!(get("motorcar"), "private" | "no")
        && !matches!(
            get("service"),
            "alley" | "driveway" | "emergency_access" | "parking" | "parking_aisle" | "private"
        )
}

fn direction(tags: &HashMap<String, String>) -> Direction {
    match tags.get("oneway").map(String::as_str) {
        Some("yes" | "1" | "true") => Direction::Forward,
        Some("-1" | "reverse") => Direction::Backward,
        Some("no" | "false" | "0") => Direction::Both,
        _ if tags.get("junction").is_some_and(|j| j == "roundabout") => Direction::Forward,
        _ => Direction::Both,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoadNode {
    pub id: i64,
    pub coordinate: Coordinate,
}

/// A directed stretch of road between two intersections (or way ends).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoadEdge {
    pub way_id: i64,
    /// Full polyline from the source node to the target node.
    pub geometry: Vec<Coordinate>,
    pub length_m: f64,
    pub attributes: EdgeAttributes,
    pub oneway: bool,
}

type IndexedNode = GeomWithData<[f64; 2], NodeIndex>;

/// Road network for one request. Immutable once built.
pub struct RoadGraph {
    graph: DiGraph<RoadNode, RoadEdge>,
    index: RTree<IndexedNode>,
    region: BoundingRegion,
    lon_scale: f64,
}

impl std::fmt::Debug for RoadGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadGraph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("region", &self.region)
            .finish()
    }
}

impl RoadGraph {
    /// Builds the graph from raw provider data, splitting ways only at
    /// intersections and way ends so edges keep their intermediate shape.
    pub fn from_raw(raw: &RawGraphData, region: BoundingRegion) -> Result<Self, RoutingError> {
        let positions: HashMap<i64, Coordinate> = raw
            .nodes
            .iter()
            .filter_map(|n| Coordinate::new(n.lat, n.lon).ok().map(|c| (n.id, c)))
            .collect();

        // Runs of consecutive resolvable nodes for every drivable way.
        let mut runs: Vec<(&RawWay, Vec<i64>)> = Vec::new();
        for way in raw.ways.iter().filter(|w| drivable(&w.tags)) {
            let mut current = Vec::new();
            for id in &way.refs {
                if positions.contains_key(id) {
                    current.push(*id);
                } else if current.len() >= 2 {
                    runs.push((way, std::mem::take(&mut current)));
                } else {
                    current.clear();
                }
            }
            if current.len() >= 2 {
                runs.push((way, current));
            }
        }

        let mut usage: HashMap<i64, u32> = HashMap::new();
        for (_, run) in &runs {
            for id in run {
                *usage.entry(*id).or_default() += 1;
            }
            // Run ends always split.
            for end in [run[0], run[run.len() - 1]] {
                *usage.entry(end).or_default() += 1;
            }
        }

        let mut graph: DiGraph<RoadNode, RoadEdge> = DiGraph::new();
        let mut node_ids: HashMap<i64, NodeIndex> = HashMap::new();
        let mut node_index = |graph: &mut DiGraph<RoadNode, RoadEdge>, id: i64| {
            *node_ids.entry(id).or_insert_with(|| {
                graph.add_node(RoadNode {
                    id,
                    coordinate: positions[&id],
                })
            })
        };

        for (way, run) in &runs {
            let attributes = EdgeAttributes::from_tags(&way.tags);
            let direction = direction(&way.tags);

            let mut start = 0;
            for i in 1..run.len() {
                let is_split = usage.get(&run[i]).copied().unwrap_or(0) >= 2;
                if !is_split && i != run.len() - 1 {
                    continue;
                }

                let segment = &run[start..=i];
                start = i;

                let geometry: Vec<Coordinate> = segment.iter().map(|id| positions[id]).collect();
                let length_m = path_length_m(&geometry);
                let a = node_index(&mut graph, segment[0]);
                let b = node_index(&mut graph, segment[segment.len() - 1]);

                let mut edge = RoadEdge {
                    way_id: way.id,
                    geometry,
                    length_m,
                    attributes: attributes.clone(),
                    oneway: direction != Direction::Both,
                };

                match direction {
                    Direction::Forward => {
                        graph.add_edge(a, b, edge);
                    }
                    Direction::Backward => {
                        edge.geometry.reverse();
                        graph.add_edge(b, a, edge);
                    }
                    Direction::Both => {
                        let mut back = edge.clone();
                        back.geometry.reverse();
                        graph.add_edge(a, b, edge);
                        graph.add_edge(b, a, back);
                    }
                }
            }
        }

        if graph.edge_count() == 0 {
            debug!(
                "No drivable edges among {} ways / {} nodes",
                raw.ways.len(),
                raw.nodes.len()
            );
            return Err(RoutingError::GraphUnavailable);
        }

        let lon_scale = region.center.lat().to_radians().cos();
        let index = RTree::bulk_load(
            graph
                .node_indices()
                .map(|n| {
                    let c = graph[n].coordinate;
                    GeomWithData::new([c.lon() * lon_scale, c.lat()], n)
                })
                .collect(),
        );

        info!(
            "Graph built: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            index,
            region,
            lon_scale,
        })
    }

    pub fn graph(&self) -> &DiGraph<RoadNode, RoadEdge> {
        &self.graph
    }

    pub fn region(&self) -> &BoundingRegion {
        &self.region
    }

    pub fn node(&self, index: NodeIndex) -> &RoadNode {
        &self.graph[index]
    }

    pub fn edge(&self, index: EdgeIndex) -> &RoadEdge {
        &self.graph[index]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Snaps a position to the closest graph node.
    pub fn nearest_node(&self, target: &Coordinate) -> Option<NodeIndex> {
        self.index
            .nearest_neighbor(&[target.lon() * self.lon_scale, target.lat()])
            .map(|entry| entry.data)
    }

    /// Rough heap footprint, used to enforce cache memory caps.
    pub fn estimated_bytes(&self) -> usize {
        let nodes = self.graph.node_count() * (size_of::<RoadNode>() + size_of::<IndexedNode>());
        let edges: usize = self
            .graph
            .edge_weights()
            .map(|e| size_of::<RoadEdge>() + e.geometry.len() * size_of::<Coordinate>())
            .sum();
        size_of::<Self>() + nodes + edges
    }
}
