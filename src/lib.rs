//! Safety-scored driving routes: fetch a bounded road graph around two
//! points, score every edge for geometric and environmental risk, and rank
//! candidate paths by a 0-100 safety score.

pub mod acquire;
pub mod api;
pub mod blackspot;
pub mod cache;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod providers;
pub mod risk;
pub mod safety;
pub mod select;
pub mod summary;
pub mod surface;

pub use config::EngineConfig;
pub use engine::{RouteRequest, SafetyRouter};
pub use error::RoutingError;
pub use geometry::Coordinate;
