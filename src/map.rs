//! Static basemap: map bounds, passability, region lookup and safe zones.
//!
//! The production basemap ships as compressed data; here the same interface
//! is backed by a deterministic procedural definition (bounded hexagon,
//! coarse-grid regions), which keeps consensus behaviour pure and identical
//! on every node.

use crate::config::RoConfig;
use crate::hex::{CoordT, HexCoord};

/// Region identifier from the static region map.
pub type RegionId = i64;

/// L1 radius of the playable hexagon around the origin.
pub const MAP_RADIUS: CoordT = 4_064;

/// Edge length (in tiles, per axis) of the coarse region grid.
const REGION_GRID: CoordT = 32;

/// Static map data interface.
pub struct BaseMap;

impl BaseMap {
    pub fn new() -> Self {
        BaseMap
    }

    pub fn is_on_map(&self, pos: &HexCoord) -> bool {
        HexCoord::distance_l1(&HexCoord::new(0, 0), pos) <= MAP_RADIUS
    }

    /// Static passability.  Dynamic obstacles (vehicles, buildings) are
    /// layered on top by the per-block overlay.
    pub fn is_passable(&self, pos: &HexCoord) -> bool {
        self.is_on_map(pos)
    }

    /// Region the coordinate belongs to.  Regions tile the map as a coarse
    /// axial grid; the id packs both grid indices.
    pub fn region_id(&self, pos: &HexCoord) -> RegionId {
        assert!(self.is_on_map(pos), "region lookup off the map: {pos}");
        let gx = i64::from(pos.x.div_euclid(REGION_GRID));
        let gy = i64::from(pos.y.div_euclid(REGION_GRID));
        (gx << 20) | (gy & 0xf_ffff)
    }

    /// True inside a no-combat zone: target acquisition and damage are
    /// suppressed there.
    pub fn is_no_combat(&self, pos: &HexCoord) -> bool {
        RoConfig::get().safe_zones.iter().any(|z| z.contains(pos))
    }
}

impl Default for BaseMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_bounds() {
        let map = BaseMap::new();
        assert!(map.is_on_map(&HexCoord::new(0, 0)));
        assert!(map.is_on_map(&HexCoord::new(MAP_RADIUS, 0)));
        assert!(!map.is_on_map(&HexCoord::new(MAP_RADIUS + 1, 0)));
    }

    #[test]
    fn regions_are_locally_stable() {
        let map = BaseMap::new();
        let base = map.region_id(&HexCoord::new(64, 64));
        assert_eq!(base, map.region_id(&HexCoord::new(65, 64)));
        assert_eq!(base, map.region_id(&HexCoord::new(64, 95)));
        assert_ne!(base, map.region_id(&HexCoord::new(128, 64)));
        assert_ne!(base, map.region_id(&HexCoord::new(64, 128)));
        // Negative coordinates get their own regions, no mirroring.
        assert_ne!(
            map.region_id(&HexCoord::new(-1, 0)),
            map.region_id(&HexCoord::new(0, 0))
        );
    }

    #[test]
    fn safe_zone_lookup() {
        let map = BaseMap::new();
        assert!(map.is_no_combat(&HexCoord::new(900, 900)));
        assert!(map.is_no_combat(&HexCoord::new(905, 910)));
        assert!(!map.is_no_combat(&HexCoord::new(2_000, -2_000)));
    }
}
