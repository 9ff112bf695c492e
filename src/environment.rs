use log::{debug, warn};
use serde::Serialize;
use strum::Display;

use crate::config::EnvironmentPolicy;
use crate::geometry::BoundingRegion;
use crate::providers::{Conditions, EnvironmentProvider};

/// Coarse weather categories, ordered roughly by how much they impair visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Cloudy,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Fog,
    Unknown,
}

impl WeatherCondition {
    /// Maps a WMO weather interpretation code.
    pub fn from_wmo_code(code: u16) -> Self {
        match code {
            0 => WeatherCondition::Clear,
            1..=3 => WeatherCondition::Cloudy,
            45 | 48 => WeatherCondition::Fog,
            51..=57 => WeatherCondition::Drizzle,
            61..=67 | 80..=82 => WeatherCondition::Rain,
            71..=77 | 85 | 86 => WeatherCondition::Snow,
            95..=99 => WeatherCondition::Thunderstorm,
            _ => WeatherCondition::Unknown,
        }
    }

    /// Clear categories sit at the baseline; precipitation and fog are elevated.
    pub fn visibility_risk(&self) -> f64 {
        match self {
            WeatherCondition::Clear | WeatherCondition::Cloudy | WeatherCondition::Unknown => {
                EnvironmentalSnapshot::BASELINE_RISK
            }
            WeatherCondition::Drizzle => 0.3,
            WeatherCondition::Rain => 0.5,
            WeatherCondition::Snow => 0.7,
            WeatherCondition::Thunderstorm => 0.8,
            WeatherCondition::Fog => 0.9,
        }
    }
}

/// Environmental conditions for one request, shared read-only by every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvironmentalSnapshot {
    pub aqi: Option<u32>,
    pub temperature_c: Option<f64>,
    pub condition: WeatherCondition,
    pub visibility_risk: f64,
    /// Road-surface penalty already folded into `visibility_risk`.
    pub surface_penalty: f64,
    /// False when the snapshot is the neutral fallback.
    pub live: bool,
}

impl EnvironmentalSnapshot {
    pub const BASELINE_RISK: f64 = 0.0;
    /// Visibility risk at which every segment is labelled bad visibility.
    pub const BAD_VISIBILITY_RISK: f64 = 0.3;

    /// Neither bonus nor penalty; used whenever live data is unavailable.
    pub fn neutral() -> Self {
        Self {
            aqi: None,
            temperature_c: None,
            condition: WeatherCondition::Unknown,
            visibility_risk: Self::BASELINE_RISK,
            surface_penalty: 0.0,
            live: false,
        }
    }

    /// Folds a road-surface penalty into this snapshot's visibility risk.
    pub fn with_visibility_penalty(mut self, penalty: f64) -> Self {
        let penalty = penalty.clamp(0.0, 1.0);
        self.visibility_risk = combine(self.visibility_risk, penalty);
        self.surface_penalty = combine(self.surface_penalty, penalty);
        self
    }

    /// Poor visibility from the air or sky, or any sign of a degraded surface.
    pub fn impairs_visibility(&self) -> bool {
        self.visibility_risk >= Self::BAD_VISIBILITY_RISK || self.surface_penalty > 0.0
    }
}

/// Probability that at least one of two independent impairments occurs.
fn combine(a: f64, b: f64) -> f64 {
    1.0 - (1.0 - a) * (1.0 - b)
}

/// Fetches live conditions once per request and turns them into a visibility
/// risk. Provider failure or timeout yields [`EnvironmentalSnapshot::neutral`].
pub struct EnvironmentalFusionService<E> {
    provider: E,
    policy: EnvironmentPolicy,
}

impl<E: EnvironmentProvider> EnvironmentalFusionService<E> {
    pub fn new(provider: E, policy: EnvironmentPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn snapshot(&self, region: &BoundingRegion) -> EnvironmentalSnapshot {
        match tokio::time::timeout(self.policy.timeout(), self.provider.fetch_conditions(region)).await {
            Ok(Ok(conditions)) => {
                let snapshot = self.fuse(&conditions);
                debug!("Environmental snapshot: {:?}", snapshot);
                snapshot
            }
            Ok(Err(e)) => {
                warn!("Environmental provider failed, using neutral snapshot: {}", e);
                EnvironmentalSnapshot::neutral()
            }
            Err(_) => {
                warn!(
                    "Environmental provider timed out after {:?}, using neutral snapshot",
                    self.policy.timeout()
                );
                EnvironmentalSnapshot::neutral()
            }
        }
    }

    pub fn fuse(&self, conditions: &Conditions) -> EnvironmentalSnapshot {
        let visibility_risk = combine(
            self.aqi_risk(conditions.aqi),
            conditions.condition.visibility_risk(),
        );
        EnvironmentalSnapshot {
            aqi: Some(conditions.aqi),
            temperature_c: Some(conditions.temperature_c),
            condition: conditions.condition,
            visibility_risk,
            surface_penalty: 0.0,
            live: true,
        }
    }

    /// Zero up to the baseline AQI, linear to 1 at saturation, flat beyond.
    pub fn aqi_risk(&self, aqi: u32) -> f64 {
        let span = self.policy.aqi_saturation - self.policy.aqi_baseline;
        ((aqi as f64 - self.policy.aqi_baseline) / span).clamp(0.0, 1.0)
    }
}
