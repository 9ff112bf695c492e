//! Engine policy. Every field has a default, so an empty TOML file is a valid
//! configuration; thresholds and weights are tunable, the monotonicity of the
//! functions that use them is not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub acquisition: AcquisitionPolicy,
    pub scoring: ScoringPolicy,
    pub environment: EnvironmentPolicy,
    pub extraction: ExtractionPolicy,
    pub cache: CachePolicy,
    pub blackspots: Vec<BlackspotSite>,
    pub surface: Option<SurfaceConfig>,
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.acquisition;
        if !(a.min_radius_m > 0.0 && a.hard_cap_radius_m > 0.0 && a.margin_m >= 0.0) {
            return Err(invalid("acquisition radii must be positive"));
        }
        if a.min_radius_m > a.hard_cap_radius_m {
            return Err(invalid("acquisition.min_radius_m exceeds hard_cap_radius_m"));
        }
        if a.max_span_m <= 0.0 || a.fetch_timeout_secs == 0 {
            return Err(invalid("acquisition.max_span_m and fetch_timeout_secs must be positive"));
        }

        let s = &self.scoring;
        let sum = s.weights.sum();
        if (sum - 1.0).abs() > 1e-6 || s.weights.as_array().iter().any(|w| *w < 0.0) {
            return Err(invalid(&format!(
                "scoring weights must be non-negative and sum to 1 (got {sum})"
            )));
        }
        if s.curvature_penalty <= 0.0 || s.curvature_rate_max <= 0.0 {
            return Err(invalid("scoring.curvature_penalty and curvature_rate_max must be positive"));
        }
        if s.moderate_risk > s.high_risk {
            return Err(invalid("scoring.moderate_risk exceeds high_risk"));
        }

        let e = &self.environment;
        if e.aqi_saturation <= e.aqi_baseline || e.timeout_secs == 0 {
            return Err(invalid("environment.aqi_saturation must exceed aqi_baseline"));
        }

        if self.extraction.workers == 0 {
            return Err(invalid("extraction.workers must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionPolicy {
    /// Added to half the origin/destination distance.
    pub margin_m: f64,
    pub min_radius_m: f64,
    /// Upper bound on every fetch radius, override included.
    pub hard_cap_radius_m: f64,
    /// Requests spanning more than this are refused unless a radius override is given.
    pub max_span_m: f64,
    pub fetch_timeout_secs: u64,
}

impl AcquisitionPolicy {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            margin_m: 400.0,
            min_radius_m: 500.0,
            hard_cap_radius_m: 2_500.0,
            max_span_m: 100_000.0,
            fetch_timeout_secs: 60,
        }
    }
}

/// Composite risk weights (w1..w5). Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub curvature: f64,
    pub width: f64,
    pub lighting: f64,
    pub speed: f64,
    pub visibility: f64,
}

impl RiskWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [self.curvature, self.width, self.lighting, self.speed, self.visibility]
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            curvature: 0.30,
            width: 0.15,
            lighting: 0.15,
            speed: 0.20,
            visibility: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weights: RiskWeights,
    /// Alpha in `length * (1 + alpha * curvature_score)`.
    pub curvature_penalty: f64,
    pub sharp_turn_deg: f64,
    pub winding_turn_deg: f64,
    /// Curvature rate (degrees per 100 m) that maps to a curvature score of 1.
    pub curvature_rate_max: f64,
    pub high_risk: f64,
    pub moderate_risk: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            curvature_penalty: 4.0,
            sharp_turn_deg: 45.0,
            winding_turn_deg: 20.0,
            curvature_rate_max: 30.0,
            high_risk: 0.5,
            moderate_risk: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentPolicy {
    pub timeout_secs: u64,
    /// AQI at or below which air quality adds no risk.
    pub aqi_baseline: f64,
    /// AQI at or above which air quality risk is 1.
    pub aqi_saturation: f64,
}

impl EnvironmentPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EnvironmentPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            aqi_baseline: 50.0,
            aqi_saturation: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionPolicy {
    /// Fixed size of the feature extraction thread pool.
    pub workers: usize,
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 8,
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// A known accident location; `rings` widens it by neighbouring H3 cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlackspotSite {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub rings: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceConfig {
    /// Road image (JPEG, PNG, ...) analysed on demand.
    pub image_path: PathBuf,
}
