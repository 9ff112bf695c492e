use std::collections::HashSet;

use h3o::{CellIndex, LatLng, Resolution};
use itertools::Itertools;
use log::warn;

use crate::config::BlackspotSite;
use crate::geometry::Coordinate;

// Resolution nine cells are ~0.1 km^2; creation and lookup must agree on it.
const RESOLUTION: Resolution = Resolution::Nine;

/// Set of H3 cells covering known accident blackspots.
#[derive(Debug, Clone, Default)]
pub struct BlackspotIndex {
    cells: HashSet<CellIndex>,
}

impl BlackspotIndex {
    pub fn from_sites(sites: &[BlackspotSite]) -> Self {
        let mut cells = HashSet::new();

        for site in sites {
            let center = match LatLng::new(site.lat, site.lon) {
                Ok(ll) => ll.to_cell(RESOLUTION),
                Err(e) => {
                    warn!("Skipping blackspot at ({}, {}): {}", site.lat, site.lon, e);
                    continue;
                }
            };
            cells.extend(center.grid_disk::<Vec<_>>(site.rings));
        }

        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        LatLng::new(point.lat(), point.lon())
            .map(|ll| self.cells.contains(&ll.to_cell(RESOLUTION)))
            .unwrap_or(false)
    }

    /// True when any vertex, or the midpoint of any segment, of `geometry`
    /// falls in a blackspot cell.
    pub fn touches(&self, geometry: &[Coordinate]) -> bool {
        if self.cells.is_empty() {
            return false;
        }
        geometry.iter().any(|p| self.contains(p))
            || geometry
                .iter()
                .tuple_windows()
                .any(|(a, b)| self.contains(&a.midpoint(b)))
    }
}
