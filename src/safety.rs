use serde::Serialize;

use crate::config::RiskWeights;
use crate::environment::EnvironmentalSnapshot;
use crate::risk::{DEFAULT_RISK, RiskFeatures};

/// Length-weighted feature means of a route and the composite risk they give.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskBreakdown {
    pub curvature: f64,
    pub width: f64,
    pub lighting: f64,
    pub speed: f64,
    pub visibility: f64,
    pub risk: f64,
}

/// Combines geometric risk and the environmental snapshot into a 0-100
/// safety score. Pure and deterministic.
#[derive(Debug, Clone, Copy)]
pub struct SafetyScorer {
    weights: RiskWeights,
}

impl SafetyScorer {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// Composite risk of a single edge.
    pub fn edge_risk(&self, features: &RiskFeatures, environment: &EnvironmentalSnapshot) -> f64 {
        self.composite(
            features.curvature_score,
            features.width_risk,
            features.lighting_risk,
            features.speed_risk,
            environment.visibility_risk,
        )
    }

    fn composite(&self, curvature: f64, width: f64, lighting: f64, speed: f64, visibility: f64) -> f64 {
        let w = &self.weights;
        (w.curvature * curvature
            + w.width * width
            + w.lighting * lighting
            + w.speed * speed
            + w.visibility * visibility)
            .clamp(0.0, 1.0)
    }

    /// Scores a route given as `(length_m, features)` per edge, in path order.
    ///
    /// Means are weighted by each edge's share of total length. Edges that
    /// all have zero length fall back to a plain mean. A route with no edges
    /// has no road data, so its geometric terms take [`DEFAULT_RISK`].
    pub fn breakdown<'a, I>(&self, edges: I, environment: &EnvironmentalSnapshot) -> RiskBreakdown
    where
        I: IntoIterator<Item = (f64, &'a RiskFeatures)>,
    {
        let edges: Vec<(f64, &RiskFeatures)> = edges.into_iter().collect();
        let total_length: f64 = edges.iter().map(|(len, _)| len.max(0.0)).sum();

        let mean = |feature: fn(&RiskFeatures) -> f64| -> f64 {
            if edges.is_empty() {
                DEFAULT_RISK
            } else if total_length > 0.0 {
                edges
                    .iter()
                    .map(|(len, f)| len.max(0.0) * feature(f))
                    .sum::<f64>()
                    / total_length
            } else {
                edges.iter().map(|(_, f)| feature(f)).sum::<f64>() / edges.len() as f64
            }
        };

        let curvature = mean(|f| f.curvature_score);
        let width = mean(|f| f.width_risk);
        let lighting = mean(|f| f.lighting_risk);
        let speed = mean(|f| f.speed_risk);
        let visibility = environment.visibility_risk;

        RiskBreakdown {
            curvature,
            width,
            lighting,
            speed,
            visibility,
            risk: self.composite(curvature, width, lighting, speed, visibility),
        }
    }

    /// `round(100 * (1 - risk))`.
    pub fn safety_score(risk: f64) -> u8 {
        (100.0 * (1.0 - risk.clamp(0.0, 1.0))).round() as u8
    }
}
