use log::debug;
use petgraph::algo::astar;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::config::ScoringPolicy;
use crate::environment::EnvironmentalSnapshot;
use crate::error::RoutingError;
use crate::geometry::Coordinate;
use crate::graph::{RoadEdge, RoadGraph};
use crate::risk::RiskTable;
use crate::safety::{RiskBreakdown, SafetyScorer};

/// Cost function a path search minimises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SearchObjective {
    /// Physical distance only.
    Shortest,
    /// Half the curvature penalty.
    Balanced,
    /// Full curvature penalty.
    Safest,
}

impl SearchObjective {
    /// Curvature penalty applied to edge cost for this objective.
    pub fn penalty(&self, alpha: f64) -> f64 {
        match self {
            SearchObjective::Shortest => 0.0,
            SearchObjective::Balanced => alpha / 2.0,
            SearchObjective::Safest => alpha,
        }
    }
}

/// A scored path from origin to destination. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCandidate {
    edges: Vec<EdgeIndex>,
    nodes: Vec<NodeIndex>,
    objectives: Vec<SearchObjective>,
    total_distance_m: f64,
    breakdown: RiskBreakdown,
    safety_score: u8,
}

impl RouteCandidate {
    /// Edges in travel order; each one starts where the previous ended.
    pub fn edges(&self) -> &[EdgeIndex] {
        &self.edges
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    /// Every objective whose search produced this path.
    pub fn objectives(&self) -> &[SearchObjective] {
        &self.objectives
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn total_risk(&self) -> f64 {
        self.breakdown.risk
    }

    pub fn breakdown(&self) -> &RiskBreakdown {
        &self.breakdown
    }

    pub fn safety_score(&self) -> u8 {
        self.safety_score
    }
}

/// Searches path variants over a request's graph and ranks them by safety.
#[derive(Debug, Clone)]
pub struct RouteSelector {
    alpha: f64,
    objectives: Vec<SearchObjective>,
    scorer: SafetyScorer,
}

impl RouteSelector {
    pub fn new(policy: &ScoringPolicy) -> Self {
        Self {
            alpha: policy.curvature_penalty,
            objectives: SearchObjective::iter().collect(),
            scorer: SafetyScorer::new(policy.weights),
        }
    }

    pub fn scorer(&self) -> &SafetyScorer {
        &self.scorer
    }

    /// Candidates sorted by descending safety score, ties by ascending distance.
    ///
    /// Fails with [`RoutingError::NoPathFound`] when the snapped endpoints are
    /// not connected. Never retries with a larger graph.
    pub fn select(
        &self,
        graph: &RoadGraph,
        table: &RiskTable,
        environment: &EnvironmentalSnapshot,
        origin: &Coordinate,
        destination: &Coordinate,
    ) -> Result<Vec<RouteCandidate>, RoutingError> {
        let start = graph.nearest_node(origin).ok_or(RoutingError::GraphUnavailable)?;
        let goal = graph.nearest_node(destination).ok_or(RoutingError::GraphUnavailable)?;

        let mut candidates: Vec<RouteCandidate> = Vec::new();
        for &objective in &self.objectives {
            let (nodes, edges) = self
                .find_path(graph, table, start, goal, objective)
                .ok_or(RoutingError::NoPathFound)?;

            if let Some(existing) = candidates.iter_mut().find(|c| c.edges == edges) {
                existing.objectives.push(objective);
                continue;
            }
            candidates.push(self.candidate(graph, table, environment, nodes, edges, objective));
        }

        candidates.sort_by(|a, b| {
            b.safety_score
                .cmp(&a.safety_score)
                .then(a.total_distance_m.total_cmp(&b.total_distance_m))
        });
        debug!(
            "{} distinct candidates from {} objectives",
            candidates.len(),
            self.objectives.len()
        );
        Ok(candidates)
    }

    /// A* over `length * (1 + penalty * curvature_score)` with a great-circle
    /// heuristic, which never overestimates since no edge is shorter than the
    /// chord between its endpoints.
    pub fn find_path(
        &self,
        graph: &RoadGraph,
        table: &RiskTable,
        start: NodeIndex,
        goal: NodeIndex,
        objective: SearchObjective,
    ) -> Option<(Vec<NodeIndex>, Vec<EdgeIndex>)> {
        let penalty = objective.penalty(self.alpha);
        let cost = |index: EdgeIndex, edge: &RoadEdge| {
            edge.length_m * (1.0 + penalty * table.features(index).curvature_score)
        };
        let target = graph.node(goal).coordinate;

        let (_, nodes) = astar(
            graph.graph(),
            start,
            |n| n == goal,
            |e| cost(e.id(), e.weight()),
            |n| graph.node(n).coordinate.distance_to(&target),
        )?;

        // Parallel edges: take the one the search would have paid for.
        let edges = nodes
            .windows(2)
            .map(|pair| {
                graph
                    .graph()
                    .edges_connecting(pair[0], pair[1])
                    .min_by(|a, b| cost(a.id(), a.weight()).total_cmp(&cost(b.id(), b.weight())))
                    .map(|e| e.id())
            })
            .collect::<Option<Vec<_>>>()?;

        Some((nodes, edges))
    }

    fn candidate(
        &self,
        graph: &RoadGraph,
        table: &RiskTable,
        environment: &EnvironmentalSnapshot,
        nodes: Vec<NodeIndex>,
        edges: Vec<EdgeIndex>,
        objective: SearchObjective,
    ) -> RouteCandidate {
        let total_distance_m = edges.iter().map(|e| graph.edge(*e).length_m).sum();
        let breakdown = self.scorer.breakdown(
            edges
                .iter()
                .map(|e| (graph.edge(*e).length_m, table.features(*e))),
            environment,
        );

        RouteCandidate {
            edges,
            nodes,
            objectives: vec![objective],
            total_distance_m,
            safety_score: SafetyScorer::safety_score(breakdown.risk),
            breakdown,
        }
    }
}
