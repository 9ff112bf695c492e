//! One routing request from endpoints to ranked summaries.

use std::sync::Arc;

use log::{debug, info};

use crate::acquire::GraphAcquirer;
use crate::blackspot::BlackspotIndex;
use crate::config::{EngineConfig, ScoringPolicy};
use crate::environment::{EnvironmentalFusionService, EnvironmentalSnapshot};
use crate::error::{ConfigError, RoutingError};
use crate::geometry::Coordinate;
use crate::graph::RoadGraph;
use crate::providers::{EnvironmentProvider, GraphProvider};
use crate::risk::{RiskFeatureExtractor, RiskTable};
use crate::select::RouteSelector;
use crate::summary::{RouteResponse, Summarizer};
use crate::surface::{EdgeDensityFactory, SurfaceEstimatorFactory, estimate_once};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub radius_override_m: Option<f64>,
}

/// Everything one request builds that is too large to outlive it.
struct RequestScope {
    graph: Arc<RoadGraph>,
    table: RiskTable,
    environment: EnvironmentalSnapshot,
}

impl RequestScope {
    fn release(self) {}
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        debug!(
            "Released request graph ({} nodes, {} edges) and {} edge assessments",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.table.len()
        );
    }
}

/// Read-only service state shared by all requests.
pub struct SafetyRouter<G, E> {
    acquirer: GraphAcquirer<G>,
    environment: EnvironmentalFusionService<E>,
    extractor: Arc<RiskFeatureExtractor>,
    selector: RouteSelector,
    policy: ScoringPolicy,
    surface: Option<Arc<dyn SurfaceEstimatorFactory>>,
}

impl<G: GraphProvider, E: EnvironmentProvider> SafetyRouter<G, E> {
    pub fn new(config: &EngineConfig, graphs: G, environment: E) -> Result<Self, ConfigError> {
        config.validate()?;

        let blackspots = BlackspotIndex::from_sites(&config.blackspots);
        if !blackspots.is_empty() {
            info!("Loaded {} blackspot cells", blackspots.len());
        }
        let extractor =
            RiskFeatureExtractor::new(config.scoring, config.extraction.workers, blackspots)?;

        let surface = config.surface.as_ref().map(|s| {
            info!("Surface estimator enabled: {}", s.image_path.display());
            Arc::new(EdgeDensityFactory::new(s.image_path.clone())) as Arc<dyn SurfaceEstimatorFactory>
        });

        Ok(Self {
            acquirer: GraphAcquirer::new(graphs, config.acquisition.clone(), config.cache),
            environment: EnvironmentalFusionService::new(environment, config.environment),
            extractor: Arc::new(extractor),
            selector: RouteSelector::new(&config.scoring),
            policy: config.scoring,
            surface,
        })
    }

    pub fn with_surface_estimator(mut self, factory: Arc<dyn SurfaceEstimatorFactory>) -> Self {
        self.surface = Some(factory);
        self
    }

    /// Plans the region, fetches graph and conditions concurrently, then
    /// extracts, searches and scores off the async runtime.
    ///
    /// The graph and its risk table are dropped before this returns, on the
    /// error paths as well.
    pub async fn route(&self, request: RouteRequest) -> Result<RouteResponse, RoutingError> {
        let RouteRequest {
            origin,
            destination,
            radius_override_m,
        } = request;
        info!(
            "Route request ({:.5}, {:.5}) -> ({:.5}, {:.5})",
            origin.lat(),
            origin.lon(),
            destination.lat(),
            destination.lon()
        );

        let plan = self.acquirer.plan(origin, destination, radius_override_m)?;
        let (graph, environment) = tokio::join!(
            self.acquirer.acquire(&plan),
            self.environment.snapshot(&plan.region)
        );
        let graph = graph?;

        let extractor = Arc::clone(&self.extractor);
        let selector = self.selector.clone();
        let policy = self.policy;
        let surface = self.surface.clone();
        let region = plan.region;

        let candidates = tokio::task::spawn_blocking(move || {
            let environment = match &surface {
                Some(factory) => {
                    environment.with_visibility_penalty(estimate_once(factory.as_ref(), &region))
                }
                None => environment,
            };
            let table = extractor.extract(&graph);
            let scope = RequestScope {
                graph,
                table,
                environment,
            };

            let candidates = selector.select(
                &scope.graph,
                &scope.table,
                &scope.environment,
                &origin,
                &destination,
            )?;
            let summarizer = Summarizer {
                graph: &scope.graph,
                table: &scope.table,
                scorer: selector.scorer(),
                policy: &policy,
                environment: &scope.environment,
            };
            let summaries = candidates
                .iter()
                .enumerate()
                .map(|(i, candidate)| summarizer.summarize(i + 1, candidate))
                .collect::<Vec<_>>();

            let environment = scope.environment;
            scope.release();
            Ok::<_, RoutingError>((summaries, environment))
        })
        .await
        .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()));

        let (candidates, environment) = candidates?;
        info!(
            "Returning {} candidates (best score {})",
            candidates.len(),
            candidates.first().map_or(0, |c| c.safety_score)
        );

        Ok(RouteResponse {
            candidates,
            environment,
            search_radius_m: plan.region.radius_m,
            radius_clamped: plan.clamped,
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::environment::WeatherCondition;
    use crate::error::{ProviderError, SurfaceError};
    use crate::geometry::BoundingRegion;
    use crate::graph::RawGraphData;
    use crate::providers::Conditions;
    use crate::risk::Hazard;
    use crate::select::test::shortcut_and_detour;
    use crate::surface::SurfaceQualityEstimator;

    struct Fixture;

    impl GraphProvider for Fixture {
        async fn fetch_road_network(&self, _: Coordinate, _: f64) -> Result<RawGraphData, ProviderError> {
            Ok(shortcut_and_detour())
        }
    }

    impl EnvironmentProvider for Fixture {
        async fn fetch_conditions(&self, _: &BoundingRegion) -> Result<Conditions, ProviderError> {
            Ok(Conditions {
                aqi: 40,
                temperature_c: 22.0,
                condition: WeatherCondition::Clear,
            })
        }
    }

    struct Glare(f64);

    impl SurfaceQualityEstimator for Glare {
        fn visibility_penalty(&self, _: &BoundingRegion) -> Result<f64, SurfaceError> {
            Ok(self.0)
        }
    }

    /// The largest penalty edge density alone can produce.
    struct WornSurface;

    impl SurfaceEstimatorFactory for WornSurface {
        fn instantiate(&self) -> Result<Box<dyn SurfaceQualityEstimator>, SurfaceError> {
            Ok(Box::new(Glare(0.2)))
        }
    }

    struct GlareFactory(Arc<AtomicUsize>);

    impl SurfaceEstimatorFactory for GlareFactory {
        fn instantiate(&self) -> Result<Box<dyn SurfaceQualityEstimator>, SurfaceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Glare(0.5)))
        }
    }

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn request() -> RouteRequest {
        RouteRequest {
            origin: c(28.600, 77.200),
            destination: c(28.610, 77.200),
            radius_override_m: None,
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_routes_and_ranks() {
        let router = SafetyRouter::new(&EngineConfig::default(), Fixture, Fixture).unwrap();
        let response = router.route(request()).await.unwrap();

        assert_eq!(response.candidates.len(), 2);
        assert!(response.environment.live);
        assert!(!response.radius_clamped);
        assert!(response.candidates[0].safety_score >= response.candidates[1].safety_score);
        assert!(response.candidates.iter().all(|c| c.safety_score <= 100));
        assert_eq!(response.search_radius_m, 400.0 + request().origin.distance_to(&request().destination) / 2.0);
    }

    #[tokio::test]
    async fn test_surface_estimator_is_per_request() {
        let instantiated = Arc::new(AtomicUsize::new(0));
        let router = SafetyRouter::new(&EngineConfig::default(), Fixture, Fixture)
            .unwrap()
            .with_surface_estimator(Arc::new(GlareFactory(Arc::clone(&instantiated))));

        let response = router.route(request()).await.unwrap();
        router.route(request()).await.unwrap();

        assert_eq!(instantiated.load(Ordering::SeqCst), 2);
        assert_eq!(response.environment.visibility_risk, 0.5);
        assert!(response.candidates[0].hazards.contains_key(&Hazard::BadVisibility));
    }

    #[tokio::test]
    async fn test_surface_penalty_alone_flags_bad_visibility() {
        let router = SafetyRouter::new(&EngineConfig::default(), Fixture, Fixture)
            .unwrap()
            .with_surface_estimator(Arc::new(WornSurface));

        let response = router.route(request()).await.unwrap();

        assert!(response.environment.visibility_risk < EnvironmentalSnapshot::BAD_VISIBILITY_RISK);
        assert!((response.environment.surface_penalty - 0.2).abs() < 1e-12);
        for candidate in &response.candidates {
            assert!(candidate
                .segments
                .iter()
                .all(|s| s.hazards.contains(&Hazard::BadVisibility)));
        }
    }

    #[tokio::test]
    async fn test_invalid_plan_is_reported() {
        let router = SafetyRouter::new(&EngineConfig::default(), Fixture, Fixture).unwrap();
        let err = router
            .route(RouteRequest {
                origin: c(28.6, 77.2),
                destination: c(12.97, 77.59),
                radius_override_m: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::RegionTooLarge { .. }));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = EngineConfig::default();
        config.extraction.workers = 0;
        assert!(SafetyRouter::new(&config, Fixture, Fixture).is_err());
    }

    #[test]
    fn test_scope_release_frees_graph() {
        let region = BoundingRegion::new(c(28.605, 77.2), 2_000.0);
        let graph = Arc::new(RoadGraph::from_raw(&shortcut_and_detour(), region).unwrap());
        let weak = Arc::downgrade(&graph);

        let scope = RequestScope {
            graph,
            table: RiskTable::default(),
            environment: EnvironmentalSnapshot::neutral(),
        };
        assert!(weak.upgrade().is_some());
        scope.release();
        assert!(weak.upgrade().is_none());
    }
}
