use std::sync::{Arc, Mutex, MutexGuard};

use h3o::{CellIndex, LatLng, Resolution};
use indexmap::IndexMap;
use log::debug;

use crate::config::CachePolicy;
use crate::geometry::BoundingRegion;
use crate::graph::RoadGraph;

/// H3 resolution 8 cell holding the region's centre. One graph is kept per
/// cell; its exact region decides whether it can serve a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    cell: CellIndex,
}

impl CacheKey {
    pub fn for_region(region: &BoundingRegion) -> Option<Self> {
        let cell = LatLng::new(region.center.lat(), region.center.lon())
            .ok()?
            .to_cell(Resolution::Eight);
        Some(Self { cell })
    }
}

#[derive(Default)]
struct CacheState {
    // Oldest first.
    entries: IndexMap<CacheKey, (Arc<RoadGraph>, usize)>,
    bytes: usize,
}

/// Bounded least-recently-used cache of road graphs shared across requests.
/// Enforces both an entry count and an estimated memory cap.
pub struct GraphCache {
    policy: CachePolicy,
    state: Mutex<CacheState>,
}

impl GraphCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A cached graph whose region covers `region` entirely, if any.
    pub fn get(&self, key: &CacheKey, region: &BoundingRegion) -> Option<Arc<RoadGraph>> {
        let mut state = self.lock();
        if !state.entries.get(key)?.0.region().covers(region) {
            debug!("Cached graph for {:?} does not cover the request", key);
            return None;
        }
        let (graph, bytes) = state.entries.shift_remove(key)?;
        let found = Arc::clone(&graph);
        state.entries.insert(*key, (graph, bytes));
        debug!("Graph cache hit for {:?}", key);
        Some(found)
    }

    pub fn insert(&self, key: CacheKey, graph: Arc<RoadGraph>) {
        let size = graph.estimated_bytes();
        if size > self.policy.max_bytes || self.policy.max_entries == 0 {
            debug!("Graph of {} bytes not cached", size);
            return;
        }

        let mut state = self.lock();
        if let Some((_, old)) = state.entries.shift_remove(&key) {
            state.bytes -= old;
        }
        while !state.entries.is_empty()
            && (state.entries.len() >= self.policy.max_entries
                || state.bytes + size > self.policy.max_bytes)
        {
            if let Some((evicted, (_, bytes))) = state.entries.shift_remove_index(0) {
                state.bytes -= bytes;
                debug!("Evicted cached graph {:?} ({} bytes)", evicted, bytes);
            }
        }
        state.entries.insert(key, (graph, size));
        state.bytes += size;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::Coordinate;
    use crate::graph::test::tags;
    use crate::graph::{RawGraphData, RawNode, RawWay};

    fn region(lat: f64) -> BoundingRegion {
        BoundingRegion::new(Coordinate::new(lat, 77.2).unwrap(), 1_000.0)
    }

    fn graph(lat: f64) -> Arc<RoadGraph> {
        let raw = RawGraphData {
            nodes: vec![
                RawNode { id: 1, lat, lon: 77.2 },
                RawNode { id: 2, lat: lat + 0.001, lon: 77.2 },
            ],
            ways: vec![RawWay {
                id: 1,
                refs: vec![1, 2],
                tags: tags(&[("highway", "residential")]),
            }],
        };
        Arc::new(RoadGraph::from_raw(&raw, region(lat)).unwrap())
    }

    fn key(lat: f64) -> CacheKey {
        CacheKey::for_region(&region(lat)).unwrap()
    }

    fn get(cache: &GraphCache, lat: f64) -> Option<Arc<RoadGraph>> {
        cache.get(&key(lat), &region(lat))
    }

    #[test]
    fn test_keys_follow_the_centre_cell() {
        let center = Coordinate::new(28.6, 77.2).unwrap();
        let key_for = |radius_m| CacheKey::for_region(&BoundingRegion::new(center, radius_m));

        assert_eq!(key_for(1_000.0), key_for(2_000.0));
        assert_ne!(key(28.60), key(28.70));
    }

    #[test]
    fn test_only_covering_graphs_are_served() {
        let cache = GraphCache::new(CachePolicy {
            enabled: true,
            max_entries: 4,
            max_bytes: usize::MAX,
        });
        cache.insert(key(28.6), graph(28.6));

        // Same radius, centre ~100 m away: not covered.
        let shifted = BoundingRegion::new(Coordinate::new(28.6009, 77.2).unwrap(), 1_000.0);
        assert!(cache.get(&key(28.6), &shifted).is_none());

        let wider = BoundingRegion::new(Coordinate::new(28.6, 77.2).unwrap(), 1_200.0);
        assert!(cache.get(&key(28.6), &wider).is_none());

        let inner = BoundingRegion::new(Coordinate::new(28.6009, 77.2).unwrap(), 800.0);
        assert!(cache.get(&key(28.6), &inner).is_some());
        assert!(get(&cache, 28.6).is_some());
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = GraphCache::new(CachePolicy {
            enabled: true,
            max_entries: 2,
            max_bytes: usize::MAX,
        });
        cache.insert(key(28.1), graph(28.1));
        cache.insert(key(28.2), graph(28.2));
        assert!(get(&cache, 28.1).is_some());
        cache.insert(key(28.3), graph(28.3));

        assert_eq!(cache.len(), 2);
        assert!(get(&cache, 28.1).is_some());
        assert!(get(&cache, 28.2).is_none());
        assert!(get(&cache, 28.3).is_some());
    }

    #[test]
    fn test_memory_cap_is_enforced() {
        let size = graph(28.1).estimated_bytes();
        let cache = GraphCache::new(CachePolicy {
            enabled: true,
            max_entries: 10,
            max_bytes: size * 2,
        });
        for lat in [28.1, 28.2, 28.3, 28.4] {
            cache.insert(key(lat), graph(lat));
            assert!(cache.bytes() <= size * 2);
        }
        assert_eq!(cache.len(), 2);

        let tiny = GraphCache::new(CachePolicy {
            enabled: true,
            max_entries: 10,
            max_bytes: size - 1,
        });
        tiny.insert(key(28.1), graph(28.1));
        assert!(tiny.is_empty());
    }
}
