use geo::Point;
use geo::prelude::*;
use itertools::Itertools;
use serde::Serialize;

use crate::error::RoutingError;

/// Meters per degree of latitude, used for the local planar projection.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Turning angles below this are floating point noise, not road shape.
const TURN_NOISE_DEGREES: f64 = 1e-6;

/// Segments shorter than this carry no usable bearing.
const MIN_SEGMENT_METERS: f64 = 1e-6;

/// A WGS84 position. Validated on construction, immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, RoutingError> {
        if lat.is_finite() && lon.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
            Ok(Self { lat, lon })
        } else {
            Err(RoutingError::InvalidCoordinate { lat, lon })
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Point in geo's (x = lon, y = lat) convention.
    pub fn to_point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        self.to_point().haversine_distance(&other.to_point())
    }

    /// Great-circle midpoint.
    pub fn midpoint(&self, other: &Coordinate) -> Coordinate {
        let mid = self.to_point().haversine_intermediate(&other.to_point(), 0.5);
        Coordinate {
            lat: mid.y().clamp(-90.0, 90.0),
            lon: wrap_longitude(mid.x()),
        }
    }

    /// Position relative to `origin` on a local equirectangular plane, in meters.
    /// Straight lines in lat/lon stay straight on this plane.
    fn local_xy(&self, origin: &Coordinate) -> (f64, f64) {
        let k = origin.lat.to_radians().cos();
        (
            wrap_longitude(self.lon - origin.lon) * k * METERS_PER_DEGREE,
            (self.lat - origin.lat) * METERS_PER_DEGREE,
        )
    }
}

/// A disk on the earth's surface; the extent of one acquired road graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRegion {
    pub center: Coordinate,
    pub radius_m: f64,
}

impl BoundingRegion {
    pub fn new(center: Coordinate, radius_m: f64) -> Self {
        Self { center, radius_m }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center.distance_to(point) <= self.radius_m
    }

    /// True when `other` lies entirely inside this disk.
    pub fn covers(&self, other: &BoundingRegion) -> bool {
        self.center.distance_to(&other.center) + other.radius_m <= self.radius_m
    }

    /// Enclosing box as (south, west, north, east) degrees.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        let d_lat = self.radius_m / METERS_PER_DEGREE;
        let d_lon = self.radius_m / (METERS_PER_DEGREE * self.center.lat.to_radians().cos().max(1e-6));
        (
            (self.center.lat - d_lat).max(-90.0),
            (self.center.lon - d_lon).max(-180.0),
            (self.center.lat + d_lat).min(90.0),
            (self.center.lon + d_lon).min(180.0),
        )
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 { 180.0 } else { wrapped }
}

/// Shape metrics of one edge's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CurvatureProfile {
    pub length_m: f64,
    /// Sum of absolute turning angles at interior vertices, degrees.
    pub total_turn_deg: f64,
    pub max_turn_deg: f64,
    /// Number of single turns sharper than the analyzer's threshold.
    pub sharp_turns: u32,
    /// Degrees of turning per 100 m of road.
    pub curvature_rate: f64,
}

impl CurvatureProfile {
    pub const NEUTRAL: CurvatureProfile = CurvatureProfile {
        length_m: 0.0,
        total_turn_deg: 0.0,
        max_turn_deg: 0.0,
        sharp_turns: 0,
        curvature_rate: 0.0,
    };

    pub fn has_sharp_turn(&self) -> bool {
        self.sharp_turns > 0
    }
}

/// Computes curvature and bearing-change metrics for edge geometries.
///
/// Malformed input (fewer than two points) yields [`CurvatureProfile::NEUTRAL`].
#[derive(Debug, Clone, Copy)]
pub struct GeometryAnalyzer {
    sharp_turn_deg: f64,
}

impl GeometryAnalyzer {
    pub fn new(sharp_turn_deg: f64) -> Self {
        Self { sharp_turn_deg }
    }

    pub fn sharp_turn_deg(&self) -> f64 {
        self.sharp_turn_deg
    }

    pub fn analyze(&self, points: &[Coordinate]) -> CurvatureProfile {
        if points.len() < 2 {
            return CurvatureProfile::NEUTRAL;
        }

        let length_m = path_length_m(points);
        let turns = turning_angles(points);

        let total_turn_deg: f64 = turns.iter().sum();
        let max_turn_deg = turns.iter().copied().fold(0.0, f64::max);
        let sharp_turns = turns.iter().filter(|&&t| t > self.sharp_turn_deg).count() as u32;
        let curvature_rate = if length_m > MIN_SEGMENT_METERS {
            total_turn_deg / length_m * 100.0
        } else {
            0.0
        };

        CurvatureProfile {
            length_m,
            total_turn_deg,
            max_turn_deg,
            sharp_turns,
            curvature_rate,
        }
    }
}

impl Default for GeometryAnalyzer {
    fn default() -> Self {
        Self::new(45.0)
    }
}

/// Haversine length of a polyline in meters.
pub fn path_length_m(points: &[Coordinate]) -> f64 {
    points
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.distance_to(b))
        .sum()
}

/// Absolute turning angle, in degrees within [0, 180], at every interior
/// vertex. Repeated points are skipped so they cannot fake a turn.
pub fn turning_angles(points: &[Coordinate]) -> Vec<f64> {
    let Some(origin) = points.first() else {
        return Vec::new();
    };

    let vectors: Vec<(f64, f64)> = points
        .iter()
        .map(|p| p.local_xy(origin))
        .tuple_windows()
        .map(|((x1, y1), (x2, y2))| (x2 - x1, y2 - y1))
        .filter(|(dx, dy)| dx.hypot(*dy) > MIN_SEGMENT_METERS)
        .collect();

    vectors
        .iter()
        .tuple_windows()
        .map(|((ax, ay), (bx, by))| {
            let cross = ax * by - ay * bx;
            let dot = ax * bx + ay * by;
            let angle = cross.atan2(dot).abs().to_degrees();
            if angle < TURN_NOISE_DEGREES { 0.0 } else { angle }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    /// An "L" shape starting at (lat, lon): east for `leg` degrees, then north.
    fn right_angle(lat: f64, lon: f64, leg: f64) -> Vec<Coordinate> {
        vec![c(lat, lon), c(lat, lon + leg), c(lat + leg, lon + leg)]
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_degenerate_geometry_is_neutral() {
        let analyzer = GeometryAnalyzer::default();
        assert_eq!(analyzer.analyze(&[]), CurvatureProfile::NEUTRAL);
        assert_eq!(analyzer.analyze(&[c(28.6, 77.2)]), CurvatureProfile::NEUTRAL);
    }

    #[test]
    fn test_two_points_have_no_curvature() {
        let profile = GeometryAnalyzer::default().analyze(&[c(28.6, 77.2), c(28.61, 77.21)]);
        assert_eq!(profile.curvature_rate, 0.0);
        assert_eq!(profile.total_turn_deg, 0.0);
        assert!(profile.length_m > 1000.0);
    }

    #[test]
    fn test_collinear_points_have_no_curvature() {
        let analyzer = GeometryAnalyzer::default();
        for scale in [0.0001, 0.001, 0.05] {
            let points: Vec<_> = (0..6)
                .map(|i| c(28.6 + scale * i as f64, 77.2 + scale * i as f64))
                .collect();
            let profile = analyzer.analyze(&points);
            assert_eq!(profile.total_turn_deg, 0.0, "scale {scale}");
            assert_eq!(profile.curvature_rate, 0.0, "scale {scale}");
        }
    }

    #[test]
    fn test_repeated_vertex_is_not_a_turn() {
        let profile = GeometryAnalyzer::default().analyze(&[
            c(10.0, 10.0),
            c(10.0, 10.001),
            c(10.0, 10.001),
            c(10.0, 10.002),
        ]);
        assert_eq!(profile.total_turn_deg, 0.0);
    }

    #[test]
    fn test_right_angle_is_sharp_at_any_scale() {
        let analyzer = GeometryAnalyzer::default();
        let small = analyzer.analyze(&right_angle(0.0, 0.0, 0.0005));
        let large = analyzer.analyze(&right_angle(0.0, 0.0, 0.005));

        assert!(small.has_sharp_turn());
        assert!(large.has_sharp_turn());
        assert_abs_diff_eq!(small.max_turn_deg, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(large.max_turn_deg, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(large.length_m / small.length_m, 10.0, epsilon = 1e-3);
        // Same turning over ten times the length.
        assert!(large.curvature_rate < small.curvature_rate);
    }

    #[test]
    fn test_gentle_winding_is_distinguishable_from_single_sharp_turn() {
        let analyzer = GeometryAnalyzer::default();

        // Long zig-zag with ~22 degree kinks.
        let mut winding = Vec::new();
        for i in 0..20 {
            let wiggle = if i % 2 == 0 { 0.0 } else { 0.00007 };
            winding.push(c(45.0 + wiggle, 7.0 + 0.0005 * i as f64));
        }
        let winding = analyzer.analyze(&winding);
        let sharp = analyzer.analyze(&right_angle(45.0, 7.0, 0.0002));

        assert!(!winding.has_sharp_turn());
        assert!(winding.total_turn_deg > sharp.total_turn_deg);
        assert!(sharp.has_sharp_turn());
    }

    #[test]
    fn test_rate_grows_with_turning_at_fixed_length() {
        let analyzer = GeometryAnalyzer::default();
        let gentle = analyzer.analyze(&[c(0.0, 0.0), c(0.0, 0.001), c(0.0002, 0.002)]);
        let tight = analyzer.analyze(&[c(0.0, 0.0), c(0.0, 0.001), c(0.0007, 0.0017)]);
        assert!(tight.total_turn_deg > gentle.total_turn_deg);
        assert!(tight.curvature_rate > gentle.curvature_rate);
    }

    #[test]
    fn test_midpoint_between_delhi_points() {
        let a = c(28.6139, 77.2090);
        let b = c(28.7041, 77.1025);
        let mid = a.midpoint(&b);
        assert_abs_diff_eq!(mid.lat(), 28.659, epsilon = 0.001);
        assert_abs_diff_eq!(mid.lon(), 77.156, epsilon = 0.001);
        assert_abs_diff_eq!(a.distance_to(&mid), b.distance_to(&mid), epsilon = 1.0);
    }
}
