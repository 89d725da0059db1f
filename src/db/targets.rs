//! Spatial enumeration of potential combat targets.
//!
//! Queries characters and buildings within an L1 radius of a centre,
//! filtered by faction relation.  The SQL narrows with a bounding box on
//! the axial coordinates; the exact hex distance check happens here.

use super::records::{Faction, IdT, TargetId};
use super::Database;
use crate::hex::{CoordT, HexCoord};

/// Which faction relation to enumerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Targeting {
    /// Entities of an opposing player faction.
    Enemies,
    /// Entities of the own faction.
    Friendlies,
}

pub struct TargetFinder<'a> {
    db: &'a Database,
}

impl<'a> TargetFinder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn faction_matches(own: Faction, other: Faction, targeting: Targeting) -> bool {
        match targeting {
            Targeting::Enemies => other.is_player() && other != own,
            Targeting::Friendlies => other == own,
        }
    }

    /// Invokes the callback for every entity within L1 distance `l1range`
    /// of `centre` whose faction matches.  Characters inside buildings are
    /// never returned.  Buildings come first, then characters, each in
    /// ascending ID order.
    pub fn process_l1_targets(
        &self,
        centre: &HexCoord,
        l1range: CoordT,
        faction: Faction,
        targeting: Targeting,
        mut cb: impl FnMut(&HexCoord, &TargetId),
    ) {
        assert!(l1range >= 0);
        let (min_x, max_x) = (centre.x - l1range, centre.x + l1range);
        let (min_y, max_y) = (centre.y - l1range, centre.y + l1range);

        {
            let mut stmt = self.db.prepare(
                r#"
                SELECT `id`, `x`, `y`, `faction` FROM `buildings`
                    WHERE `x` >= ?1 AND `x` <= ?2 AND `y` >= ?3 AND `y` <= ?4
                    ORDER BY `id`
                "#,
            );
            let rows = stmt
                .query_map((min_x, max_x, min_y, max_y), |row| {
                    Ok((
                        row.get::<_, IdT>(0)?,
                        HexCoord::new(row.get(1)?, row.get(2)?),
                        Faction::from_db(row.get(3)?),
                    ))
                })
                .expect("building target query failed");
            for r in rows {
                let (id, pos, f) = r.unwrap();
                if !Self::faction_matches(faction, f, targeting) {
                    continue;
                }
                if HexCoord::distance_l1(centre, &pos) > l1range {
                    continue;
                }
                cb(&pos, &TargetId::building(id));
            }
        }

        {
            let mut stmt = self.db.prepare(
                r#"
                SELECT `id`, `x`, `y`, `faction` FROM `characters`
                    WHERE `inbuilding` IS NULL
                        AND `x` >= ?1 AND `x` <= ?2 AND `y` >= ?3 AND `y` <= ?4
                    ORDER BY `id`
                "#,
            );
            let rows = stmt
                .query_map((min_x, max_x, min_y, max_y), |row| {
                    Ok((
                        row.get::<_, IdT>(0)?,
                        HexCoord::new(row.get(1)?, row.get(2)?),
                        Faction::from_db(row.get(3)?),
                    ))
                })
                .expect("character target query failed");
            for r in rows {
                let (id, pos, f) = r.unwrap();
                if !Self::faction_matches(faction, f, targeting) {
                    continue;
                }
                if HexCoord::distance_l1(centre, &pos) > l1range {
                    continue;
                }
                cb(&pos, &TargetId::character(id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::buildings::BuildingsTable;
    use crate::db::characters::CharacterTable;
    use crate::db::records::TargetKind;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    fn add_character(db: &Database, pos: HexCoord, faction: Faction) -> IdT {
        let tbl = CharacterTable::new(db);
        let mut c = tbl.create_new("owner", faction);
        c.set_position(pos);
        c.mutate_data().vehicle = "rv st".to_owned();
        c.id()
    }

    fn add_building(db: &Database, pos: HexCoord, faction: Faction) -> IdT {
        let tbl = BuildingsTable::new(db);
        let owner = if faction == Faction::Ancient { "" } else { "owner" };
        let mut b = tbl.create_new("turret", owner, faction);
        b.set_centre(pos);
        b.id()
    }

    #[test]
    fn enemies_within_range() {
        let db = test_db();
        let red = add_character(&db, HexCoord::new(0, 0), Faction::Red);
        let green_near = add_character(&db, HexCoord::new(3, 0), Faction::Green);
        let _green_far = add_character(&db, HexCoord::new(8, 0), Faction::Green);
        let _red2 = add_character(&db, HexCoord::new(1, 0), Faction::Red);
        let green_building = add_building(&db, HexCoord::new(0, 3), Faction::Green);
        let _ancient = add_building(&db, HexCoord::new(1, 1), Faction::Ancient);

        let finder = TargetFinder::new(&db);
        let mut found = Vec::new();
        finder.process_l1_targets(
            &HexCoord::new(0, 0),
            5,
            Faction::Red,
            Targeting::Enemies,
            |_, id| found.push(*id),
        );
        assert_eq!(
            found,
            vec![TargetId::building(green_building), TargetId::character(green_near)]
        );
        assert_eq!(found[0].kind, TargetKind::Building);
        let _ = red;
    }

    #[test]
    fn friendlies_within_range() {
        let db = test_db();
        let _red = add_character(&db, HexCoord::new(0, 0), Faction::Red);
        let red2 = add_character(&db, HexCoord::new(2, 0), Faction::Red);
        let _green = add_character(&db, HexCoord::new(1, 0), Faction::Green);

        let finder = TargetFinder::new(&db);
        let mut found = Vec::new();
        finder.process_l1_targets(
            &HexCoord::new(2, 1),
            5,
            Faction::Red,
            Targeting::Friendlies,
            |_, id| found.push(*id),
        );
        // Both red characters, in ID order.
        assert_eq!(found.len(), 2);
        assert_eq!(found[1], TargetId::character(red2));
    }

    #[test]
    fn characters_in_buildings_are_ignored() {
        let db = test_db();
        let id = add_character(&db, HexCoord::new(0, 0), Faction::Green);
        {
            let tbl = CharacterTable::new(&db);
            let mut c = tbl.get_by_id(id).unwrap();
            c.set_building_id(99);
        }

        let finder = TargetFinder::new(&db);
        let mut found = Vec::new();
        finder.process_l1_targets(
            &HexCoord::new(0, 0),
            10,
            Faction::Red,
            Targeting::Enemies,
            |_, id| found.push(*id),
        );
        assert!(found.is_empty());
    }

    #[test]
    fn bounding_box_does_not_overcount() {
        let db = test_db();
        // L1 distance of (4, 4) from origin is 8, outside range 5 even
        // though each axis offset alone is within it.
        add_character(&db, HexCoord::new(4, 4), Faction::Green);

        let finder = TargetFinder::new(&db);
        let mut found = Vec::new();
        finder.process_l1_targets(
            &HexCoord::new(0, 0),
            5,
            Faction::Red,
            Targeting::Enemies,
            |_, id| found.push(*id),
        );
        assert!(found.is_empty());
    }
}
