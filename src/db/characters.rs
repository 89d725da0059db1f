//! Character rows and their write-back handle.
//!
//! Characters have two write-back paths: movement touches many rows per
//! block but only the position and the small volatile-movement blob, which
//! go through a narrow `UPDATE`; any change to the bigger record blobs does
//! a full `INSERT OR REPLACE` and re-derives the filter columns.

use rusqlite::Row;
use tracing::{debug, trace};

use super::lazy::LazyRecord;
use super::records::{
    CharacterData, Faction, Hp, IdT, Inventory, RegenData, TargetId, VolatileMovement,
};
use super::tracker::TrackerGuard;
use super::Database;
use crate::amounts::QuantityProduct;
use crate::config::RoConfig;
use crate::hex::HexCoord;

/// Write-back handle for one character row.
pub struct Character<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    id: IdT,
    owner: String,
    faction: Faction,
    /// On-map position; `None` while inside a building.
    pos: Option<HexCoord>,
    in_building: Option<IdT>,
    volatile_mv: LazyRecord<VolatileMovement>,
    hp: LazyRecord<Hp>,
    regen_data: LazyRecord<RegenData>,
    inventory: LazyRecord<Inventory>,
    proto: LazyRecord<CharacterData>,
    is_new: bool,
    dirty_fields: bool,
}

impl<'a> Character<'a> {
    fn from_row(db: &'a Database, row: &Row<'_>) -> Character<'a> {
        let id: IdT = row.get(0).unwrap();
        let tracker = db.track_handle("character", id);
        let x: Option<i32> = row.get(3).unwrap();
        let y: Option<i32> = row.get(4).unwrap();
        let in_building: Option<IdT> = row.get(5).unwrap();
        let pos = match (x, y) {
            (Some(x), Some(y)) => Some(HexCoord::new(x, y)),
            (None, None) => None,
            _ => panic!("character {id} has partial position"),
        };
        assert!(
            pos.is_some() != in_building.is_some(),
            "character {id} must be either on the map or in a building"
        );

        Character {
            db,
            _tracker: tracker,
            id,
            owner: row.get(1).unwrap(),
            faction: Faction::from_db(row.get(2).unwrap()),
            pos,
            in_building,
            volatile_mv: LazyRecord::from_bytes(row.get(6).unwrap()),
            hp: LazyRecord::from_bytes(row.get(7).unwrap()),
            regen_data: LazyRecord::from_bytes(row.get(8).unwrap()),
            inventory: LazyRecord::from_bytes(row.get(9).unwrap()),
            proto: LazyRecord::from_bytes(row.get(10).unwrap()),
            is_new: false,
            dirty_fields: false,
        }
    }

    pub fn id(&self) -> IdT {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_owned();
        self.dirty_fields = true;
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    pub fn is_in_building(&self) -> bool {
        self.in_building.is_some()
    }

    pub fn building_id(&self) -> IdT {
        self.in_building
            .unwrap_or_else(|| panic!("character {} is not in a building", self.id))
    }

    pub fn set_building_id(&mut self, building: IdT) {
        self.in_building = Some(building);
        self.pos = None;
        self.dirty_fields = true;
    }

    /// On-map position.  Must not be called while inside a building.
    pub fn position(&self) -> HexCoord {
        self.pos
            .unwrap_or_else(|| panic!("character {} is inside a building", self.id))
    }

    pub fn set_position(&mut self, pos: HexCoord) {
        self.pos = Some(pos);
        self.in_building = None;
        self.dirty_fields = true;
    }

    pub fn volatile_mv(&self) -> std::cell::Ref<'_, VolatileMovement> {
        self.volatile_mv.get()
    }

    pub fn mutate_volatile_mv(&mut self) -> &mut VolatileMovement {
        self.volatile_mv.mutate()
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

    pub fn inventory(&self) -> std::cell::Ref<'_, Inventory> {
        self.inventory.get()
    }

    pub fn mutate_inventory(&mut self) -> &mut Inventory {
        self.inventory.mutate()
    }

    pub fn data(&self) -> std::cell::Ref<'_, CharacterData> {
        self.proto.get()
    }

    pub fn mutate_data(&mut self) -> &mut CharacterData {
        self.proto.mutate()
    }

    /// Whether the character is tied up in an ongoing operation.
    pub fn is_busy(&self) -> bool {
        self.data().ongoing.is_some()
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

    /// Cargo space taken up by the current inventory.
    pub fn used_cargo_space(&self) -> i64 {
        let cfg = RoConfig::get();
        let mut used = QuantityProduct::default();
        for (item, count) in &self.inventory().fungible {
            used.add_product(*count as i64, cfg.item(item).space as i64);
        }
        used.extract()
    }

    pub fn free_cargo_space(&self) -> i64 {
        let total = self.data().cargo_space as i64;
        let used = self.used_cargo_space();
        assert!(used <= total, "character {} cargo overflow", self.id);
        total - used
    }

    fn compute_can_regen(&self) -> bool {
        let regen = self.regen_data.get();
        let hp = self.hp.get();
        let armour = regen.regeneration_mhp.armour > 0 && hp.armour < regen.max_hp.armour;
        let shield = regen.regeneration_mhp.shield > 0 && hp.shield < regen.max_hp.shield;
        armour || shield
    }

    fn blob_dirty(&self) -> bool {
        self.hp.is_dirty()
            || self.regen_data.is_dirty()
            || self.inventory.is_dirty()
            || self.proto.is_dirty()
    }
}

impl Drop for Character<'_> {
    fn drop(&mut self) {
        let full = self.is_new || self.blob_dirty();
        if !full && !self.dirty_fields && !self.volatile_mv.is_dirty() {
            return;
        }

        let (x, y) = match self.pos {
            Some(p) => (Some(p.x), Some(p.y)),
            None => (None, None),
        };
        assert!(
            self.pos.is_some() != self.in_building.is_some(),
            "character {} must be either on the map or in a building",
            self.id
        );

        if !full {
            // Fast path: movement touches position and the volatile blob on
            // many rows each block without going near the main records.
            trace!(id = self.id, "character field update");
            self.db
                .prepare(
                    r#"
                    UPDATE `characters`
                        SET `owner` = ?2, `x` = ?3, `y` = ?4,
                            `inbuilding` = ?5, `volatilemv` = ?6
                        WHERE `id` = ?1
                    "#,
                )
                .execute((
                    self.id,
                    &self.owner,
                    x,
                    y,
                    self.in_building,
                    self.volatile_mv.serialised(),
                ))
                .expect("failed to update character");
            return;
        }

        debug!(id = self.id, new = self.is_new, "character full write-back");
        let data = self.proto.get();
        let attack_range: i64 = data
            .combat_data
            .attack_range(false)
            .or(data.combat_data.attack_range(true))
            .map(i64::from)
            .unwrap_or(-1);
        let has_target = data.target.is_some();
        let is_moving = data.movement.is_some();
        let is_mining = data.mining.as_ref().map(|m| m.active).unwrap_or(false);
        let busy: IdT = data.ongoing.unwrap_or(0);
        drop(data);
        let can_regen = self.compute_can_regen();

        self.db
            .prepare(
                r#"
                INSERT OR REPLACE INTO `characters`
                    (`id`, `owner`, `faction`, `x`, `y`, `inbuilding`,
                     `volatilemv`, `hp`, `regendata`, `busy`, `inventory`,
                     `proto`, `attackrange`, `canregen`, `hastarget`,
                     `ismoving`, `ismining`)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                            ?12, ?13, ?14, ?15, ?16, ?17)
                "#,
            )
            .execute(rusqlite::params![
                self.id,
                &self.owner,
                self.faction.to_db(),
                x,
                y,
                self.in_building,
                self.volatile_mv.serialised(),
                self.hp.serialised(),
                self.regen_data.serialised(),
                busy,
                self.inventory.serialised(),
                self.proto.serialised(),
                attack_range,
                can_regen,
                has_target,
                is_moving,
                is_mining,
            ])
            .expect("failed to write character");
    }
}

const COLUMNS: &str = r#"
    `id`, `owner`, `faction`, `x`, `y`, `inbuilding`,
    `volatilemv`, `hp`, `regendata`, `inventory`, `proto`
"#;

/// Table object handing out character handles and domain queries.
pub struct CharacterTable<'a> {
    db: &'a Database,
}

impl<'a> CharacterTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a new character owned by the given account.  The caller is
    /// responsible for placing it (position or building) and deriving its
    /// stats before the handle is dropped.
    pub fn create_new(&self, owner: &str, faction: Faction) -> Character<'a> {
        assert!(faction.is_player(), "characters need a player faction");
        let id = self.db.next_id();
        debug!(id, owner, "creating character");
        Character {
            db: self.db,
            _tracker: self.db.track_handle("character", id),
            id,
            owner: owner.to_owned(),
            faction,
            pos: Some(HexCoord::new(0, 0)),
            in_building: None,
            volatile_mv: LazyRecord::new_default(),
            hp: LazyRecord::new_default(),
            regen_data: LazyRecord::new_default(),
            inventory: LazyRecord::new_default(),
            proto: LazyRecord::new_default(),
            is_new: true,
            dirty_fields: false,
        }
    }

    pub fn get_by_id(&self, id: IdT) -> Option<Character<'a>> {
        let mut stmt = self
            .db
            .prepare(&format!("SELECT {COLUMNS} FROM `characters` WHERE `id` = ?1"));
        let mut rows = stmt.query((id,)).expect("character query failed");
        rows.next()
            .expect("character row read failed")
            .map(|row| Character::from_row(self.db, row))
    }

    fn query_ids(&self, sql: &str) -> Vec<IdT> {
        let mut stmt = self.db.prepare(sql);
        let rows = stmt
            .query_map((), |row| row.get::<_, IdT>(0))
            .expect("character id query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn query_all(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `characters` ORDER BY `id`")
    }

    pub fn query_moving(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `characters` WHERE `ismoving` = 1 ORDER BY `id`")
    }

    pub fn query_mining(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `characters` WHERE `ismining` = 1 ORDER BY `id`")
    }

    /// Characters relevant for target selection: at least one attack and
    /// not inside a building.
    pub fn query_with_attacks(&self) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `characters`
                WHERE `attackrange` >= 0 AND `inbuilding` IS NULL
                ORDER BY `id`
            "#,
        )
    }

    pub fn query_with_target(&self) -> Vec<IdT> {
        self.query_ids(
            r#"
            SELECT `id` FROM `characters`
                WHERE `hastarget` = 1 AND `inbuilding` IS NULL
                ORDER BY `id`
            "#,
        )
    }

    pub fn query_for_regen(&self) -> Vec<IdT> {
        self.query_ids("SELECT `id` FROM `characters` WHERE `canregen` = 1 ORDER BY `id`")
    }

    pub fn query_for_building(&self, building: IdT) -> Vec<IdT> {
        let mut stmt = self.db.prepare(
            "SELECT `id` FROM `characters` WHERE `inbuilding` = ?1 ORDER BY `id`",
        );
        let rows = stmt
            .query_map((building,), |row| row.get::<_, IdT>(0))
            .expect("character id query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// Characters whose intent is to enter a building.
    pub fn query_entering(&self) -> Vec<IdT> {
        // The enter intent lives in the main record; this query is driven
        // off the filter column maintained alongside it.
        let mut res = Vec::new();
        for id in self.query_ids(
            "SELECT `id` FROM `characters` WHERE `inbuilding` IS NULL ORDER BY `id`",
        ) {
            let c = self.get_by_id(id).unwrap();
            if c.data().enter_building.is_some() {
                res.push(id);
            }
        }
        res
    }

    pub fn count_for_owner(&self, owner: &str) -> u32 {
        self.db
            .prepare("SELECT COUNT(*) FROM `characters` WHERE `owner` = ?1")
            .query_row((owner,), |row| row.get(0))
            .expect("character count failed")
    }

    pub fn query_for_owner(&self, owner: &str) -> Vec<IdT> {
        let mut stmt = self
            .db
            .prepare("SELECT `id` FROM `characters` WHERE `owner` = ?1 ORDER BY `id`");
        let rows = stmt
            .query_map((owner,), |row| row.get::<_, IdT>(0))
            .expect("character id query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// Streams (id, position, faction) of all on-map characters without
    /// materialising handles, for the obstacle overlay.
    pub fn process_all_positions(&self, mut cb: impl FnMut(IdT, HexCoord, Faction)) {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `id`, `x`, `y`, `faction` FROM `characters`
                WHERE `inbuilding` IS NULL
                ORDER BY `id`
            "#,
        );
        let rows = stmt
            .query_map((), |row| {
                Ok((
                    row.get::<_, IdT>(0)?,
                    HexCoord::new(row.get(1)?, row.get(2)?),
                    Faction::from_db(row.get(3)?),
                ))
            })
            .expect("position query failed");
        for r in rows {
            let (id, pos, faction) = r.unwrap();
            cb(id, pos, faction);
        }
    }

    pub fn delete_by_id(&self, id: IdT) {
        let deleted = self
            .db
            .prepare("DELETE FROM `characters` WHERE `id` = ?1")
            .execute((id,))
            .expect("character delete failed");
        assert_eq!(deleted, 1, "deleting non-existant character {id}");
    }
}
