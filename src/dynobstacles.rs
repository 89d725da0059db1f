//! In-memory overlay of dynamic obstacles for one block.
//!
//! Tracks the current vehicle position per tile (faction-tagged) and all
//! building footprints.  Built from the store at block start and mutated in
//! lock-step with the block's state transitions, so later decisions in the
//! same block observe current positions.

use std::collections::HashMap;

use crate::config::RoConfig;
use crate::db::buildings::BuildingsTable;
use crate::db::characters::CharacterTable;
use crate::db::records::Faction;
use crate::db::Database;
use crate::hex::HexCoord;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Occupancy {
    /// One or more vehicles of a single faction.  Same-faction vehicles may
    /// stack while passing through each other; opposing factions never
    /// share a tile since they are mutually impassable.
    Vehicles(Faction, u32),
    Building,
}

pub struct DynObstacles {
    tiles: HashMap<HexCoord, Occupancy>,
}

impl DynObstacles {
    /// Empty overlay (used by tests and god-mode setup).
    pub fn new_empty() -> Self {
        Self {
            tiles: HashMap::new(),
        }
    }

    /// Builds the overlay from current store contents.
    pub fn from_db(db: &Database) -> Self {
        let mut dyn_obstacles = Self::new_empty();

        CharacterTable::new(db).process_all_positions(|_id, pos, faction| {
            dyn_obstacles.add_vehicle(pos, faction);
        });

        let buildings = BuildingsTable::new(db);
        for id in buildings.query_all() {
            let b = buildings.get_by_id(id).unwrap();
            for tile in b.shape() {
                let prev = dyn_obstacles.tiles.insert(tile, Occupancy::Building);
                assert!(
                    !matches!(prev, Some(Occupancy::Building)),
                    "buildings overlap at {tile}"
                );
            }
        }

        dyn_obstacles
    }

    pub fn add_vehicle(&mut self, pos: HexCoord, faction: Faction) {
        match self.tiles.get_mut(&pos) {
            None => {
                self.tiles.insert(pos, Occupancy::Vehicles(faction, 1));
            }
            Some(Occupancy::Vehicles(f, count)) => {
                assert_eq!(*f, faction, "mixed-faction vehicle stack at {pos}");
                *count += 1;
            }
            Some(Occupancy::Building) => panic!("vehicle added onto building tile {pos}"),
        }
    }

    pub fn remove_vehicle(&mut self, pos: HexCoord) {
        match self.tiles.get_mut(&pos) {
            Some(Occupancy::Vehicles(_, count)) if *count > 1 => *count -= 1,
            Some(Occupancy::Vehicles(_, _)) => {
                self.tiles.remove(&pos);
            }
            other => panic!("removing vehicle from {pos} which holds {other:?}"),
        }
    }

    /// Tries to claim all tiles of a building shape.  Returns the shape on
    /// success and None if any tile clashes (in which case nothing is
    /// added).
    pub fn add_building(
        &mut self,
        building_type: &str,
        rotation: u32,
        centre: &HexCoord,
    ) -> Option<Vec<HexCoord>> {
        let shape = RoConfig::get()
            .building(building_type)
            .shape(rotation, centre);
        if shape.iter().any(|t| self.tiles.contains_key(t)) {
            return None;
        }
        for tile in &shape {
            self.tiles.insert(*tile, Occupancy::Building);
        }
        Some(shape)
    }

    /// Passability from one faction's viewpoint: buildings block, vehicles
    /// of another faction block, own-faction vehicles pass through (for
    /// path planning, not placement).
    pub fn is_passable(&self, pos: &HexCoord, faction: Faction) -> bool {
        match self.tiles.get(pos) {
            None => true,
            Some(Occupancy::Building) => false,
            Some(Occupancy::Vehicles(f, _)) => *f == faction,
        }
    }

    /// Strict emptiness, used for spawning and placement.
    pub fn is_free(&self, pos: &HexCoord) -> bool {
        !self.tiles.contains_key(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicles_and_factions() {
        let mut dyn_obstacles = DynObstacles::new_empty();
        let pos = HexCoord::new(2, 3);
        dyn_obstacles.add_vehicle(pos, Faction::Red);

        assert!(dyn_obstacles.is_passable(&pos, Faction::Red));
        assert!(!dyn_obstacles.is_passable(&pos, Faction::Green));
        assert!(!dyn_obstacles.is_free(&pos));

        dyn_obstacles.remove_vehicle(pos);
        assert!(dyn_obstacles.is_free(&pos));
        assert!(dyn_obstacles.is_passable(&pos, Faction::Green));
    }

    #[test]
    fn building_placement_and_clash() {
        let mut dyn_obstacles = DynObstacles::new_empty();
        let centre = HexCoord::new(0, 0);
        let shape = dyn_obstacles.add_building("depot", 0, &centre).unwrap();
        assert_eq!(shape.len(), 4);
        for tile in &shape {
            assert!(!dyn_obstacles.is_passable(tile, Faction::Red));
            assert!(!dyn_obstacles.is_free(tile));
        }

        // A second building whose shape overlaps fails and adds nothing.
        assert!(dyn_obstacles.add_building("turret", 0, &centre).is_none());
        let elsewhere = HexCoord::new(10, 10);
        assert!(dyn_obstacles.add_building("turret", 0, &elsewhere).is_some());
    }

    #[test]
    fn vehicle_blocks_building() {
        let mut dyn_obstacles = DynObstacles::new_empty();
        dyn_obstacles.add_vehicle(HexCoord::new(1, 0), Faction::Red);
        assert!(dyn_obstacles
            .add_building("depot", 0, &HexCoord::new(0, 0))
            .is_none());
    }

    #[test]
    fn same_faction_vehicles_stack() {
        let mut dyn_obstacles = DynObstacles::new_empty();
        let pos = HexCoord::new(0, 0);
        dyn_obstacles.add_vehicle(pos, Faction::Red);
        dyn_obstacles.add_vehicle(pos, Faction::Red);
        assert!(dyn_obstacles.is_passable(&pos, Faction::Red));
        assert!(!dyn_obstacles.is_free(&pos));

        dyn_obstacles.remove_vehicle(pos);
        assert!(!dyn_obstacles.is_free(&pos), "one vehicle remains");
        dyn_obstacles.remove_vehicle(pos);
        assert!(dyn_obstacles.is_free(&pos));
    }
}
