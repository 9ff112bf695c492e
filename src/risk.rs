use log::debug;
use petgraph::graph::EdgeIndex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use strum::Display;

use crate::blackspot::BlackspotIndex;
use crate::config::ScoringPolicy;
use crate::error::ConfigError;
use crate::geometry::{CurvatureProfile, GeometryAnalyzer};
use crate::graph::{EdgeAttributes, RoadClass, RoadEdge, RoadGraph};

/// Risk assumed when the tags that would inform a feature are absent.
/// Missing data must never read as safe.
pub const DEFAULT_RISK: f64 = 0.5;

/// Speeds at which speed risk reaches 0 and 1, km/h.
const SPEED_RISK_FLOOR_KMH: f64 = 20.0;
const SPEED_RISK_CEILING_KMH: f64 = 110.0;

/// Carriageway widths at which width risk is highest and lowest, meters.
const NARROW_WIDTH_M: f64 = 3.0;
const WIDE_WIDTH_M: f64 = 7.0;

/// Per-edge risk features, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskFeatures {
    pub curvature_score: f64,
    pub width_risk: f64,
    pub lighting_risk: f64,
    pub speed_risk: f64,
}

/// Named hazard labels attached to traversed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Display)]
pub enum Hazard {
    #[serde(rename = "Sharp Curve")]
    #[strum(serialize = "Sharp Curve")]
    SharpCurve,
    #[serde(rename = "Winding Road")]
    #[strum(serialize = "Winding Road")]
    WindingRoad,
    #[serde(rename = "Narrow Road")]
    #[strum(serialize = "Narrow Road")]
    NarrowRoad,
    #[serde(rename = "High Speed Zone")]
    #[strum(serialize = "High Speed Zone")]
    HighSpeedZone,
    #[serde(rename = "Poor Lighting")]
    #[strum(serialize = "Poor Lighting")]
    PoorLighting,
    #[serde(rename = "Bad Visibility")]
    #[strum(serialize = "Bad Visibility")]
    BadVisibility,
    #[serde(rename = "Known Blackspot")]
    #[strum(serialize = "Known Blackspot")]
    KnownBlackspot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeAssessment {
    pub features: RiskFeatures,
    pub profile: CurvatureProfile,
    pub hazards: Vec<Hazard>,
}

/// Assessments for every edge of one graph, indexed like the graph's edges.
/// Lives exactly as long as the request that built it.
#[derive(Debug, Default)]
pub struct RiskTable {
    assessments: Vec<EdgeAssessment>,
}

impl RiskTable {
    pub fn get(&self, edge: EdgeIndex) -> &EdgeAssessment {
        &self.assessments[edge.index()]
    }

    pub fn features(&self, edge: EdgeIndex) -> &RiskFeatures {
        &self.get(edge).features
    }

    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }
}

/// Maps road edges to [`RiskFeatures`]. Never fails: unusable geometry or
/// missing tags degrade to neutral values.
pub struct RiskFeatureExtractor {
    policy: ScoringPolicy,
    analyzer: GeometryAnalyzer,
    blackspots: BlackspotIndex,
    pool: ThreadPool,
}

impl RiskFeatureExtractor {
    pub fn new(
        policy: ScoringPolicy,
        workers: usize,
        blackspots: BlackspotIndex,
    ) -> Result<Self, ConfigError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("risk-extract-{i}"))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("extraction pool: {e}")))?;

        Ok(Self {
            policy,
            analyzer: GeometryAnalyzer::new(policy.sharp_turn_deg),
            blackspots,
            pool,
        })
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Assesses every edge on the bounded worker pool.
    pub fn extract(&self, graph: &RoadGraph) -> RiskTable {
        let assessments: Vec<EdgeAssessment> = self.pool.install(|| {
            graph
                .graph()
                .raw_edges()
                .par_iter()
                .map(|edge| self.assess(&edge.weight))
                .collect()
        });
        debug!("Assessed {} edges", assessments.len());
        RiskTable { assessments }
    }

    pub fn assess(&self, edge: &RoadEdge) -> EdgeAssessment {
        let profile = self.analyzer.analyze(&edge.geometry);
        let attributes = &edge.attributes;

        let features = RiskFeatures {
            curvature_score: self.curvature_score(profile.curvature_rate),
            width_risk: width_risk(attributes),
            lighting_risk: lighting_risk(attributes),
            speed_risk: speed_risk(attributes.speed_estimate_kmh()),
        };

        let mut hazards = Vec::new();
        if profile.has_sharp_turn() {
            hazards.push(Hazard::SharpCurve);
        } else if profile.total_turn_deg > self.policy.winding_turn_deg {
            hazards.push(Hazard::WindingRoad);
        }
        if attributes.lanes.is_some_and(|l| l <= 1) || attributes.width_m.is_some_and(|w| w < 4.0) {
            hazards.push(Hazard::NarrowRoad);
        }
        if attributes.road_class.is_some_and(|c| c.is_major())
            || attributes.speed_estimate_kmh().is_some_and(|v| v >= 80.0)
        {
            hazards.push(Hazard::HighSpeedZone);
        }
        let unlit = match attributes.lit {
            Some(lit) => !lit,
            None => attributes.road_class.is_some_and(|c| c.is_unlit_prone()),
        };
        if unlit {
            hazards.push(Hazard::PoorLighting);
        }
        if self.blackspots.touches(&edge.geometry) {
            hazards.push(Hazard::KnownBlackspot);
        }

        EdgeAssessment {
            features,
            profile,
            hazards,
        }
    }

    /// Linear up to `curvature_rate_max`, saturating at 1.
    pub fn curvature_score(&self, curvature_rate: f64) -> f64 {
        (curvature_rate / self.policy.curvature_rate_max).clamp(0.0, 1.0)
    }
}

fn width_risk(attributes: &EdgeAttributes) -> f64 {
    if let Some(width) = attributes.width_m {
        let t = ((WIDE_WIDTH_M - width) / (WIDE_WIDTH_M - NARROW_WIDTH_M)).clamp(0.0, 1.0);
        return 0.1 + 0.8 * t;
    }
    if let Some(lanes) = attributes.lanes {
        return match lanes {
            0 | 1 => 0.8,
            2 => 0.4,
            3 => 0.25,
            _ => 0.15,
        };
    }
    match attributes.road_class {
        Some(RoadClass::Motorway | RoadClass::Trunk) => 0.2,
        Some(RoadClass::MotorwayLink | RoadClass::TrunkLink | RoadClass::Primary) => 0.3,
        Some(RoadClass::PrimaryLink | RoadClass::Secondary | RoadClass::SecondaryLink) => 0.35,
        Some(RoadClass::Tertiary | RoadClass::TertiaryLink) => 0.4,
        Some(RoadClass::Residential | RoadClass::LivingStreet) => 0.5,
        Some(RoadClass::Unclassified | RoadClass::Service | RoadClass::Road) => 0.6,
        None => DEFAULT_RISK,
    }
}

fn lighting_risk(attributes: &EdgeAttributes) -> f64 {
    match (attributes.lit, attributes.road_class) {
        (Some(true), _) => 0.1,
        (Some(false), _) => 0.9,
        (None, Some(class)) if class.is_unlit_prone() => 0.75,
        (None, Some(RoadClass::Motorway | RoadClass::Trunk | RoadClass::Primary)) => 0.35,
        (None, Some(RoadClass::Secondary | RoadClass::Tertiary)) => 0.45,
        (None, _) => DEFAULT_RISK,
    }
}

/// Monotonically non-decreasing in speed; unknown speed is [`DEFAULT_RISK`].
pub fn speed_risk(speed_kmh: Option<f64>) -> f64 {
    match speed_kmh {
        Some(v) if v.is_finite() => ((v - SPEED_RISK_FLOOR_KMH)
            / (SPEED_RISK_CEILING_KMH - SPEED_RISK_FLOOR_KMH))
            .clamp(0.0, 1.0),
        _ => DEFAULT_RISK,
    }
}
