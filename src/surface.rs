//! Optional road-surface capability. Estimators are built on demand for a
//! single request and dropped as soon as they have produced a penalty.

use std::path::{Path, PathBuf};

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use log::{debug, warn};

use crate::error::SurfaceError;
use crate::geometry::BoundingRegion;

/// Sigma of a 5x5 Gaussian kernel when none is given explicitly.
const BLUR_SIGMA: f32 = 1.1;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

pub trait SurfaceQualityEstimator {
    /// Extra visibility penalty in [0, 1] for the region.
    fn visibility_penalty(&self, region: &BoundingRegion) -> Result<f64, SurfaceError>;
}

/// Builds a fresh estimator per request. Only the factory lives for the
/// lifetime of the service.
pub trait SurfaceEstimatorFactory: Send + Sync {
    fn instantiate(&self) -> Result<Box<dyn SurfaceQualityEstimator>, SurfaceError>;
}

/// Instantiates, runs and drops an estimator. Any failure yields no penalty.
pub fn estimate_once(factory: &dyn SurfaceEstimatorFactory, region: &BoundingRegion) -> f64 {
    let penalty = factory
        .instantiate()
        .and_then(|estimator| estimator.visibility_penalty(region));
    match penalty {
        Ok(penalty) => {
            debug!("Surface penalty {:.2}", penalty);
            penalty.clamp(0.0, 1.0)
        }
        Err(e) => {
            warn!("Surface estimator failed, ignoring: {}", e);
            0.0
        }
    }
}

/// Loads a road image from disk, as greyscale, each time it is instantiated.
#[derive(Debug, Clone)]
pub struct EdgeDensityFactory {
    image_path: PathBuf,
}

impl EdgeDensityFactory {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
        }
    }
}

impl SurfaceEstimatorFactory for EdgeDensityFactory {
    fn instantiate(&self) -> Result<Box<dyn SurfaceQualityEstimator>, SurfaceError> {
        Ok(Box::new(EdgeDensityEstimator::open(&self.image_path)?))
    }
}

/// Share of edge pixels in a road image: cracked or cluttered surfaces show
/// many edges.
pub struct EdgeDensityEstimator {
    image: GrayImage,
}

impl EdgeDensityEstimator {
    pub fn open(path: &Path) -> Result<Self, SurfaceError> {
        Self::from_image(image::open(path)?.to_luma8())
    }

    /// Decodes any format the `image` crate recognises.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SurfaceError> {
        Self::from_image(image::load_from_memory(bytes)?.to_luma8())
    }

    pub fn from_image(image: GrayImage) -> Result<Self, SurfaceError> {
        let (width, height) = image.dimensions();
        if width < 3 || height < 3 {
            return Err(SurfaceError::Format(format!(
                "{width}x{height} is too small for edge detection"
            )));
        }
        Ok(Self { image })
    }

    /// Percentage of all pixels marked as edges by Canny after a light blur.
    pub fn edge_density(&self) -> f64 {
        let blurred = gaussian_blur_f32(&self.image, BLUR_SIGMA);
        let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
        let marked = edges.pixels().filter(|p| p.0[0] > 0).count();
        100.0 * marked as f64 / (edges.width() as f64 * edges.height() as f64)
    }
}

fn penalty_for_density(density: f64) -> f64 {
    if density > 5.0 {
        0.2
    } else if density > 2.0 {
        0.1
    } else {
        0.0
    }
}

impl SurfaceQualityEstimator for EdgeDensityEstimator {
    fn visibility_penalty(&self, _region: &BoundingRegion) -> Result<f64, SurfaceError> {
        Ok(penalty_for_density(self.edge_density()))
    }
}
