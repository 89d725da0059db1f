//! Building rows and their write-back handle.
//!
//! On write-back the handle re-derives the attack range, friendly-attack
//! range and regen capability from the combat data and persists them as
//! columns so combat queries can filter without decoding blobs.

use rusqlite::Row;
use tracing::debug;

use super::lazy::LazyRecord;
use super::records::{BuildingData, Faction, Hp, IdT, RegenData, TargetId};
use super::tracker::TrackerGuard;
use super::Database;
use crate::config::RoConfig;
use crate::hex::HexCoord;

/// Write-back handle for one building row.
pub struct Building<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    id: IdT,
    building_type: String,
    owner: String,
    faction: Faction,
    centre: HexCoord,
    hp: LazyRecord<Hp>,
    regen_data: LazyRecord<RegenData>,
    proto: LazyRecord<BuildingData>,
    is_new: bool,
    dirty_fields: bool,
}

impl<'a> Building<'a> {
    fn from_row(db: &'a Database, row: &Row<'_>) -> Building<'a> {
        let id: IdT = row.get(0).unwrap();
        let tracker = db.track_handle("building", id);
        Building {
            db,
            _tracker: tracker,
            id,
            building_type: row.get(1).unwrap(),
            owner: row.get(2).unwrap(),
            faction: Faction::from_db(row.get(3).unwrap()),
            centre: HexCoord::new(row.get(4).unwrap(), row.get(5).unwrap()),
            hp: LazyRecord::from_bytes(row.get(6).unwrap()),
            regen_data: LazyRecord::from_bytes(row.get(7).unwrap()),
            proto: LazyRecord::from_bytes(row.get(8).unwrap()),
            is_new: false,
            dirty_fields: false,
        }
    }

    pub fn id(&self) -> IdT {
        self.id
    }

    pub fn building_type(&self) -> &str {
        &self.building_type
    }

    /// Owner account.  Empty for ancient buildings; use faction to check.
    pub fn owner(&self) -> &str {
        assert_ne!(
            self.faction,
            Faction::Ancient,
            "ancient building {} has no owner",
            self.id
        );
        &self.owner
    }

    pub fn set_owner(&mut self, owner: &str) {
        assert_ne!(self.faction, Faction::Ancient);
        self.owner = owner.to_owned();
        self.dirty_fields = true;
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    pub fn centre(&self) -> HexCoord {
        self.centre
    }

    pub fn set_centre(&mut self, centre: HexCoord) {
        self.centre = centre;
        self.dirty_fields = true;
    }

    /// World coordinates of all tiles the building occupies.
    pub fn shape(&self) -> Vec<HexCoord> {
        let rotation = self.data().shape_rotation;
        RoConfig::get()
            .building(&self.building_type)
            .shape(rotation, &self.centre)
    }

    pub fn hp(&self) -> std::cell::Ref<'_, Hp> {
        self.hp.get()
    }

    pub fn mutate_hp(&mut self) -> &mut Hp {
        self.hp.mutate()
    }

    pub fn regen_data(&self) -> std::cell::Ref<'_, RegenData> {
        self.regen_data.get()
    }

    pub fn mutate_regen_data(&mut self) -> &mut RegenData {
        self.regen_data.mutate()
    }

    pub fn data(&self) -> std::cell::Ref<'_, BuildingData> {
        self.proto.get()
    }

    pub fn mutate_data(&mut self) -> &mut BuildingData {
        self.proto.mutate()
    }

    pub fn is_foundation(&self) -> bool {
        self.data().foundation
    }

    pub fn target(&self) -> Option<TargetId> {
        self.data().target
    }

    pub fn set_target(&mut self, target: TargetId) {
        self.mutate_data().target = Some(target);
    }

    pub fn clear_target(&mut self) {
        if self.data().target.is_some() {
            self.mutate_data().target = None;
        }
    }

    fn compute_can_regen(&self) -> bool {
        let regen = self.regen_data.get();
        let hp = self.hp.get();
        let armour = regen.regeneration_mhp.armour > 0 && hp.armour < regen.max_hp.armour;
        let shield = regen.regeneration_mhp.shield > 0 && hp.shield < regen.max_hp.shield;
        armour || shield
    }
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        let dirty = self.dirty_fields
            || self.hp.is_dirty()
            || self.regen_data.is_dirty()
            || self.proto.is_dirty();
        if !self.is_new && !dirty {
            return;
        }

        debug!(id = self.id, new = self.is_new, "building write-back");
        let data = self.proto.get();
        let attack_range: i64 = data
            .combat_data
            .attack_range(false)
            .map(i64::from)
            .unwrap_or(-1);
        let friendly_range: i64 = data
            .combat_data
            .attack_range(true)
            .map(i64::from)
            .unwrap_or(-1);
        let has_target = data.target.is_some();
        drop(data);
        let can_regen = self.compute_can_regen();

        self.db
            .prepare(
                r#"
                INSERT OR REPLACE INTO `buildings`
                    (`id`, `type`, `owner`, `faction`, `x`, `y`,
                     `hp`, `regendata`, `proto`,
                     `attackrange`, `friendlyrange`, `canregen`, `hastarget`)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                            ?10, ?11, ?12, ?13)
                "#,
            )
            .execute(rusqlite::params![
                self.id,
                &self.building_type,
                &self.owner,
                self.faction.to_db(),
                self.centre.x,
                self.centre.y,
                self.hp.serialised(),
                self.regen_data.serialised(),
                self.proto.serialised(),
                attack_range,
                friendly_range,
                can_regen,
                has_target,
            ])
            .expect("failed to write building");
    }
}

const COLUMNS: &str = r#"
    `id`, `type`, `owner`, `faction`, `x`, `y`, `hp`, `regendata`, `proto`
"#;

/// Table object handing out building handles.
pub struct BuildingsTable<'a> {
    db: &'a Database,
}

impl<'a> BuildingsTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a new building.  Ancient buildings have an empty owner.
    pub fn create_new(&self, building_type: &str, owner: &str, faction: Faction) -> Building<'a> {
        assert!(faction != Faction::Invalid, "building without faction");
        assert_eq!(
            owner.is_empty(),
            faction == Faction::Ancient,
            "owner and faction disagree for new building"
        );
        let id = self.db.next_id();
        debug!(id, building_type, owner, "creating building");
        Building {
            db: self.db,
            _tracker: self.db.track_handle("building", id),
            id,
            building_type: building_type.to_owned(),
            owner: owner.to_owned(),
            faction,
            centre: HexCoord::new(0, 0),
            hp: LazyRecord::new_default(),
            regen_data: LazyRecord::new_default(),
            proto: LazyRecord::new_default(),
            is_new: true,
            dirty_fields: false,
        }
    }

    pub fn get_by_id(&self, id: IdT) -> Option<Building<'a>> {
        let mut stmt = self
            .db
            .prepare(&format!("SELECT {COLUMNS} FROM `buildings` WHERE `id` = ?1"));
        let mut rows = stmt.query((id,)).expect("building query failed");
        rows.next()
            .expect("building row read failed")
            .map(|row| Building::from_row(self.db, row))
    }

    fn query_ids(&self, sql: &str) -> Vec<IdT> {
        let mut stmt = self.db.prepare(sql);
        let rows = stmt
            .query_map((), |row| row.get::<_, IdT>(0))
            .expect("building id query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn query_all(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `buildings` ORDER BY `id`")
    }

    pub fn query_with_attacks(&self) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `buildings`
                WHERE `attackrange` >= 0 OR `friendlyrange` >= 0
                ORDER BY `id`
            "#,
        )
    }

    pub fn query_with_target(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `buildings` WHERE `hastarget` = 1 ORDER BY `id`")
    }

    pub fn query_for_regen(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `buildings` WHERE `canregen` = 1 ORDER BY `id`")
    }

    pub fn delete_by_id(&self, id: IdT) {
        let deleted = self
            .db
            .prepare("DELETE FROM `buildings` WHERE `id` = ?1")
            .execute((id,))
            .expect("building delete failed");
        assert_eq!(deleted, 1, "deleting non-existant building {id}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::Attack;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    #[test]
    fn create_and_reload() {
        let db = test_db();
        let tbl = BuildingsTable::new(&db);
        let id = {
            let mut b = tbl.create_new("turret", "domob", Faction::Red);
            b.set_centre(HexCoord::new(-5, 7));
            b.id()
        };

        let b = tbl.get_by_id(id).unwrap();
        assert_eq!(b.building_type(), "turret");
        assert_eq!(b.owner(), "domob");
        assert_eq!(b.faction(), Faction::Red);
        assert_eq!(b.centre(), HexCoord::new(-5, 7));
        assert!(!b.is_foundation());
    }

    #[test]
    fn ancient_buildings_have_no_owner() {
        let db = test_db();
        let tbl = BuildingsTable::new(&db);
        let id = {
            let b = tbl.create_new("obelisk", "", Faction::Ancient);
            b.id()
        };
        let b = tbl.get_by_id(id).unwrap();
        assert_eq!(b.faction(), Faction::Ancient);
    }

    #[test]
    fn shape_uses_rotation() {
        let db = test_db();
        let tbl = BuildingsTable::new(&db);
        let id = {
            let mut b = tbl.create_new("depot", "domob", Faction::Green);
            b.set_centre(HexCoord::new(0, 0));
            b.mutate_data().shape_rotation = 0;
            b.id()
        };
        let b = tbl.get_by_id(id).unwrap();
        let shape = b.shape();
        assert_eq!(shape.len(), 4);
        assert!(shape.contains(&HexCoord::new(0, 0)));
        assert!(shape.contains(&HexCoord::new(1, 0)));
    }

    #[test]
    fn combat_columns_follow_data() {
        let db = test_db();
        let tbl = BuildingsTable::new(&db);
        let id = {
            let b = tbl.create_new("turret", "domob", Faction::Red);
            b.id()
        };
        assert!(tbl.query_with_attacks().is_empty());

        {
            let mut b = tbl.get_by_id(id).unwrap();
            b.mutate_data().combat_data.attacks.push(Attack {
                range: Some(8),
                ..Default::default()
            });
        }
        assert_eq!(tbl.query_with_attacks(), vec![id]);
        assert!(tbl.query_with_target().is_empty());

        {
            let mut b = tbl.get_by_id(id).unwrap();
            b.set_target(TargetId::character(7));
        }
        assert_eq!(tbl.query_with_target(), vec![id]);
    }

    #[test]
    fn regen_flag() {
        let db = test_db();
        let tbl = BuildingsTable::new(&db);
        let id = {
            let mut b = tbl.create_new("turret", "domob", Faction::Red);
            b.mutate_regen_data().max_hp.shield = 100;
            b.mutate_regen_data().regeneration_mhp.shield = 500;
            b.mutate_hp().shield = 100;
            b.id()
        };
        assert!(tbl.query_for_regen().is_empty());

        {
            let mut b = tbl.get_by_id(id).unwrap();
            b.mutate_hp().shield = 10;
        }
        assert_eq!(tbl.query_for_regen(), vec![id]);
    }
}
