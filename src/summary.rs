//! Caller-facing view of scored routes.

use std::collections::BTreeMap;
use std::fmt::Write;

use itertools::Itertools;
use serde::Serialize;
use strum::Display;

use crate::config::ScoringPolicy;
use crate::environment::EnvironmentalSnapshot;
use crate::graph::RoadGraph;
use crate::risk::{Hazard, RiskTable};
use crate::safety::{RiskBreakdown, SafetyScorer};
use crate::select::{RouteCandidate, SearchObjective};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJsonLineString {
    r#type: String,
    /// `[lon, lat]`, as GeoJSON requires.
    coordinates: Vec<[f64; 2]>,
}

impl GeoJsonLineString {
    fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            r#type: "LineString".to_string(),
            coordinates,
        }
    }

    pub fn coordinates(&self) -> &[[f64; 2]] {
        &self.coordinates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum RiskLevel {
    High,
    Moderate,
    Low,
}

impl RiskLevel {
    pub fn color(&self) -> &'static str {
        match self {
            RiskLevel::High => "#E11B23",
            RiskLevel::Moderate => "#F5A623",
            RiskLevel::Low => "#20BD5F",
        }
    }
}

/// One traversed edge, ready for map display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    /// `[lat, lon]` pairs in travel order.
    pub positions: Vec<[f64; 2]>,
    pub risk: f64,
    pub level: RiskLevel,
    pub color: &'static str,
    pub hazards: Vec<Hazard>,
    /// Hazard names joined for display.
    pub info: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskLevelCounts {
    #[serde(rename = "High")]
    pub high: u32,
    #[serde(rename = "Moderate")]
    pub moderate: u32,
    #[serde(rename = "Low")]
    pub low: u32,
}

impl RiskLevelCounts {
    fn add(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::High => self.high += 1,
            RiskLevel::Moderate => self.moderate += 1,
            RiskLevel::Low => self.low += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSummary {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub objectives: Vec<SearchObjective>,
    pub geometry: GeoJsonLineString,
    pub distance_m: f64,
    pub distance_km: f64,
    pub safety_score: u8,
    pub breakdown: RiskBreakdown,
    pub segments: Vec<SegmentSummary>,
    pub stats: RiskLevelCounts,
    pub hazards: BTreeMap<Hazard, u32>,
    pub top_risk_factors: Vec<String>,
}

impl RouteSummary {
    /// Plain-text digest for downstream advisory consumers.
    pub fn advisory_brief(&self) -> String {
        let mut brief = format!(
            "Route {}: {:.2} km, safety score {}/100.",
            self.rank, self.distance_km, self.safety_score
        );
        if self.top_risk_factors.is_empty() {
            brief.push_str(" No notable risk factors.");
        } else {
            let _ = write!(brief, " Main risk factors: {}.", self.top_risk_factors.join(", "));
        }
        if !self.hazards.is_empty() {
            let hazards = self
                .hazards
                .iter()
                .sorted_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)))
                .map(|(hazard, count)| format!("{count} x {hazard}"))
                .join(", ");
            let _ = write!(brief, " Hazards: {hazards}.");
        }
        brief
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteResponse {
    pub candidates: Vec<RouteSummary>,
    pub environment: EnvironmentalSnapshot,
    pub search_radius_m: f64,
    pub radius_clamped: bool,
}

/// Turns scored candidates into summaries against one request's graph.
pub struct Summarizer<'a> {
    pub graph: &'a RoadGraph,
    pub table: &'a RiskTable,
    pub scorer: &'a SafetyScorer,
    pub policy: &'a ScoringPolicy,
    pub environment: &'a EnvironmentalSnapshot,
}

impl Summarizer<'_> {
    pub fn summarize(&self, rank: usize, candidate: &RouteCandidate) -> RouteSummary {
        let mut segments = Vec::with_capacity(candidate.edges().len());
        let mut stats = RiskLevelCounts::default();
        let mut hazards: BTreeMap<Hazard, u32> = BTreeMap::new();

        for &index in candidate.edges() {
            let edge = self.graph.edge(index);
            let assessment = self.table.get(index);
            let risk = self.scorer.edge_risk(&assessment.features, self.environment);
            let level = self.level(risk);

            let mut labels = assessment.hazards.clone();
            if self.environment.impairs_visibility() {
                labels.push(Hazard::BadVisibility);
            }
            labels.sort();

            stats.add(level);
            for hazard in &labels {
                *hazards.entry(*hazard).or_default() += 1;
            }
            segments.push(SegmentSummary {
                positions: edge.geometry.iter().map(|c| [c.lat(), c.lon()]).collect(),
                risk,
                level,
                color: level.color(),
                info: labels.iter().join(", "),
                hazards: labels,
            });
        }

        let distance_m = candidate.total_distance_m();
        RouteSummary {
            rank,
            objectives: candidate.objectives().to_vec(),
            geometry: GeoJsonLineString::new(self.line(candidate)),
            distance_m,
            distance_km: (distance_m / 10.0).round() / 100.0,
            safety_score: candidate.safety_score(),
            breakdown: *candidate.breakdown(),
            segments,
            stats,
            hazards,
            top_risk_factors: self.top_risk_factors(candidate.breakdown()),
        }
    }

    fn level(&self, risk: f64) -> RiskLevel {
        if risk > self.policy.high_risk {
            RiskLevel::High
        } else if risk > self.policy.moderate_risk {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    fn line(&self, candidate: &RouteCandidate) -> Vec<[f64; 2]> {
        let Some(&first) = candidate.nodes().first() else {
            return Vec::new();
        };
        let start = self.graph.node(first).coordinate;
        let mut line = vec![[start.lon(), start.lat()]];
        for &index in candidate.edges() {
            // Each edge's first point is the previous edge's last.
            line.extend(
                self.graph
                    .edge(index)
                    .geometry
                    .iter()
                    .skip(1)
                    .map(|c| [c.lon(), c.lat()]),
            );
        }
        line
    }

    /// Up to three weighted contributions to the composite risk, largest first.
    fn top_risk_factors(&self, breakdown: &RiskBreakdown) -> Vec<String> {
        let w = &self.policy.weights;
        [
            ("curvature", w.curvature * breakdown.curvature),
            ("road width", w.width * breakdown.width),
            ("lighting", w.lighting * breakdown.lighting),
            ("speed", w.speed * breakdown.speed),
            ("visibility", w.visibility * breakdown.visibility),
        ]
        .into_iter()
        .filter(|(_, contribution)| *contribution > 0.0)
        .sorted_by(|a, b| b.1.total_cmp(&a.1))
        .take(3)
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::blackspot::BlackspotIndex;
    use crate::geometry::{BoundingRegion, Coordinate};
    use crate::risk::RiskFeatureExtractor;
    use crate::select::RouteSelector;
    use crate::select::test::shortcut_and_detour;

    fn summaries(environment: EnvironmentalSnapshot) -> Vec<RouteSummary> {
        let region = BoundingRegion::new(Coordinate::new(28.605, 77.2).unwrap(), 2_000.0);
        let graph = RoadGraph::from_raw(&shortcut_and_detour(), region).unwrap();
        let policy = ScoringPolicy::default();
        let table = RiskFeatureExtractor::new(policy, 1, BlackspotIndex::default())
            .unwrap()
            .extract(&graph);
        let selector = RouteSelector::new(&policy);
        let candidates = selector
            .select(
                &graph,
                &table,
                &environment,
                &Coordinate::new(28.600, 77.200).unwrap(),
                &Coordinate::new(28.610, 77.200).unwrap(),
            )
            .unwrap();

        let summarizer = Summarizer {
            graph: &graph,
            table: &table,
            scorer: selector.scorer(),
            policy: &policy,
            environment: &environment,
        };
        candidates
            .iter()
            .enumerate()
            .map(|(i, c)| summarizer.summarize(i + 1, c))
            .collect()
    }

    #[test]
    fn test_summaries_describe_each_route() {
        let summaries = summaries(EnvironmentalSnapshot::neutral());
        assert_eq!(summaries.len(), 2);

        let curvy = &summaries[1];
        assert_eq!(curvy.rank, 2);
        assert_eq!(curvy.segments.len(), 1);
        assert_eq!(curvy.hazards.get(&Hazard::WindingRoad), Some(&1));
        assert!(curvy.segments[0].info.contains("Winding Road"));
        assert_eq!(curvy.top_risk_factors[0], "curvature");
        assert_eq!(curvy.geometry.coordinates().len(), 21);

        let straight = &summaries[0];
        assert_eq!(straight.segments.len(), 2);
        assert_eq!(straight.stats.high + straight.stats.moderate + straight.stats.low, 2);
        assert_eq!(straight.geometry.coordinates().len(), 3);
        assert_eq!(straight.geometry.coordinates()[0], [77.200, 28.600]);
        assert!(!straight.hazards.contains_key(&Hazard::WindingRoad));
        assert_abs_diff_eq!(straight.distance_km, (straight.distance_m / 10.0).round() / 100.0);
    }

    #[test]
    fn test_bad_visibility_marks_every_segment() {
        let foggy = EnvironmentalSnapshot::neutral().with_visibility_penalty(0.9);
        for summary in summaries(foggy) {
            assert_eq!(
                summary.hazards.get(&Hazard::BadVisibility).copied(),
                Some(summary.segments.len() as u32)
            );
            assert!(summary.top_risk_factors.contains(&"visibility".to_string()));
        }
    }

    #[test]
    fn test_environmental_visibility_threshold() {
        let mut hazy = EnvironmentalSnapshot::neutral();
        hazy.visibility_risk = EnvironmentalSnapshot::BAD_VISIBILITY_RISK;
        assert!(summaries(hazy)
            .iter()
            .all(|s| s.hazards.get(&Hazard::BadVisibility) == Some(&(s.segments.len() as u32))));

        hazy.visibility_risk = 0.29;
        assert!(summaries(hazy)
            .iter()
            .all(|s| !s.hazards.contains_key(&Hazard::BadVisibility)));
    }

    #[test]
    fn test_advisory_brief() {
        let summaries = summaries(EnvironmentalSnapshot::neutral());
        let brief = summaries[1].advisory_brief();
        assert!(brief.starts_with("Route 2: "));
        assert!(brief.contains(&format!("safety score {}/100", summaries[1].safety_score)));
        assert!(brief.contains("Main risk factors: curvature"));
        assert!(brief.contains("1 x Winding Road"));
    }

    #[test]
    fn test_serialises_for_the_map() {
        let json = serde_json::to_value(&summaries(EnvironmentalSnapshot::neutral())[0]).unwrap();
        assert_eq!(json["geometry"]["type"], "LineString");
        assert!(json["stats"]["Low"].is_u64());
        assert_eq!(json["objectives"][0], "balanced");
    }
}
