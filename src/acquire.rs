use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::cache::{CacheKey, GraphCache};
use crate::config::{AcquisitionPolicy, CachePolicy};
use crate::error::{DataSource, ProviderError, RoutingError};
use crate::geometry::{BoundingRegion, Coordinate};
use crate::graph::RoadGraph;
use crate::providers::GraphProvider;

impl AcquisitionPolicy {
    /// `min(max(d / 2 + margin, min_radius), hard_cap)`: non-decreasing in
    /// `distance_m` and never above the hard cap.
    pub fn fetch_radius(&self, distance_m: f64) -> f64 {
        (distance_m / 2.0 + self.margin_m)
            .max(self.min_radius_m)
            .min(self.hard_cap_radius_m)
    }
}

/// Where and how much road network a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcquisitionPlan {
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub distance_m: f64,
    pub region: BoundingRegion,
    /// True when the hard cap cut the radius the distance called for.
    pub clamped: bool,
}

/// Plans and fetches the road graph for one request.
pub struct GraphAcquirer<G> {
    provider: G,
    policy: AcquisitionPolicy,
    cache: Option<GraphCache>,
}

impl<G: GraphProvider> GraphAcquirer<G> {
    pub fn new(provider: G, policy: AcquisitionPolicy, cache: CachePolicy) -> Self {
        Self {
            provider,
            policy,
            cache: cache.enabled.then(|| GraphCache::new(cache)),
        }
    }

    pub fn policy(&self) -> &AcquisitionPolicy {
        &self.policy
    }

    pub fn plan(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        radius_override_m: Option<f64>,
    ) -> Result<AcquisitionPlan, RoutingError> {
        let distance_m = origin.distance_to(&destination);
        let radius_override_m = radius_override_m.filter(|r| r.is_finite() && *r > 0.0);

        if distance_m > self.policy.max_span_m && radius_override_m.is_none() {
            return Err(RoutingError::RegionTooLarge {
                distance_m,
                max_m: self.policy.max_span_m,
            });
        }

        let (wanted, radius_m) = match radius_override_m {
            Some(r) => {
                let r = r.max(self.policy.min_radius_m);
                (r, r.min(self.policy.hard_cap_radius_m))
            }
            None => (
                distance_m / 2.0 + self.policy.margin_m,
                self.policy.fetch_radius(distance_m),
            ),
        };
        let clamped = wanted > radius_m;
        if clamped {
            warn!(
                "Radius clamped from {:.0} m to {:.0} m for memory safety",
                wanted, radius_m
            );
        }

        Ok(AcquisitionPlan {
            origin,
            destination,
            distance_m,
            region: BoundingRegion::new(origin.midpoint(&destination), radius_m),
            clamped,
        })
    }

    /// Fetches and builds the graph covering `plan.region`. Failures are
    /// reported, never retried.
    pub async fn acquire(&self, plan: &AcquisitionPlan) -> Result<Arc<RoadGraph>, RoutingError> {
        let region = plan.region;
        let key = self.cache.as_ref().and_then(|_| CacheKey::for_region(&region));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(graph) = cache.get(key, &region) {
                return Ok(graph);
            }
        }

        info!("Downloading map... (radius {:.0} m)", region.radius_m);
        let fetched = tokio::time::timeout(
            self.policy.fetch_timeout(),
            self.provider.fetch_road_network(region.center, region.radius_m),
        )
        .await;

        let raw = match fetched {
            Ok(Ok(raw)) => raw,
            Ok(Err(ProviderError::RegionTooLarge(reason))) => {
                warn!("Graph provider refused region: {}", reason);
                return Err(RoutingError::RegionRefused {
                    radius_m: region.radius_m,
                    reason,
                });
            }
            Ok(Err(e)) => {
                return Err(RoutingError::SourceUnreachable {
                    provider: DataSource::Graph,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(RoutingError::SourceUnreachable {
                    provider: DataSource::Graph,
                    reason: format!("timed out after {:?}", self.policy.fetch_timeout()),
                });
            }
        };

        let graph = tokio::task::spawn_blocking(move || RoadGraph::from_raw(&raw, region))
            .await
            .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))?;
        let graph = Arc::new(graph);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, Arc::clone(&graph));
        }
        Ok(graph)
    }
}
