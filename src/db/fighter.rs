//! Unified view over the two combat-entity kinds.
//!
//! Characters and buildings share the combatant capability set (position,
//! faction, HP, combat data, target).  This is a plain variant with a small
//! dispatch layer; the combat engine never needs to know which kind it is
//! working on.

use std::cell::Ref;

use super::buildings::{Building, BuildingsTable};
use super::characters::{Character, CharacterTable};
use super::records::{CombatData, CombatEffects, Faction, Hp, RegenData, TargetId, TargetKind};
use super::Database;
use crate::hex::HexCoord;

/// Handle to a combat entity of either kind.
pub enum Fighter<'a> {
    Character(Character<'a>),
    Building(Building<'a>),
}

impl<'a> Fighter<'a> {
    pub fn id_as_target(&self) -> TargetId {
        match self {
            Fighter::Character(c) => TargetId::character(c.id()),
            Fighter::Building(b) => TargetId::building(b.id()),
        }
    }

    pub fn faction(&self) -> Faction {
        match self {
            Fighter::Character(c) => c.faction(),
            Fighter::Building(b) => b.faction(),
        }
    }

    /// Position used for combat: the character's map position or the
    /// building's centre.
    pub fn combat_position(&self) -> HexCoord {
        match self {
            Fighter::Character(c) => c.position(),
            Fighter::Building(b) => b.centre(),
        }
    }

    pub fn combat_data(&self) -> Ref<'_, CombatData> {
        match self {
            Fighter::Character(c) => Ref::map(c.data(), |d| &d.combat_data),
            Fighter::Building(b) => Ref::map(b.data(), |d| &d.combat_data),
        }
    }

    pub fn effects(&self) -> Ref<'_, CombatEffects> {
        match self {
            Fighter::Character(c) => Ref::map(c.data(), |d| &d.effects),
            Fighter::Building(b) => Ref::map(b.data(), |d| &d.effects),
        }
    }

    pub fn set_effects(&mut self, effects: CombatEffects) {
        match self {
            Fighter::Character(c) => c.mutate_data().effects = effects,
            Fighter::Building(b) => b.mutate_data().effects = effects,
        }
    }

    pub fn regen_data(&self) -> Ref<'_, RegenData> {
        match self {
            Fighter::Character(c) => c.regen_data(),
            Fighter::Building(b) => b.regen_data(),
        }
    }

    pub fn hp(&self) -> Ref<'_, Hp> {
        match self {
            Fighter::Character(c) => c.hp(),
            Fighter::Building(b) => b.hp(),
        }
    }

    pub fn mutate_hp(&mut self) -> &mut Hp {
        match self {
            Fighter::Character(c) => c.mutate_hp(),
            Fighter::Building(b) => b.mutate_hp(),
        }
    }

    pub fn target(&self) -> Option<TargetId> {
        match self {
            Fighter::Character(c) => c.target(),
            Fighter::Building(b) => b.target(),
        }
    }

    pub fn set_target(&mut self, target: TargetId) {
        match self {
            Fighter::Character(c) => c.set_target(target),
            Fighter::Building(b) => b.set_target(target),
        }
    }

    pub fn clear_target(&mut self) {
        match self {
            Fighter::Character(c) => c.clear_target(),
            Fighter::Building(b) => b.clear_target(),
        }
    }
}

/// Retrieval of fighters from both underlying tables.
pub struct FighterTable<'a> {
    db: &'a Database,
}

impl<'a> FighterTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn characters(&self) -> CharacterTable<'a> {
        CharacterTable::new(self.db)
    }

    fn buildings(&self) -> BuildingsTable<'a> {
        BuildingsTable::new(self.db)
    }

    /// Fighter handle for a target reference.  The referenced entity must
    /// exist; dangling targets are an internal inconsistency.
    pub fn get_for_target(&self, id: &TargetId) -> Fighter<'a> {
        match id.kind {
            TargetKind::Character => Fighter::Character(
                self.characters()
                    .get_by_id(id.id)
                    .unwrap_or_else(|| panic!("dangling character target {}", id.id)),
            ),
            TargetKind::Building => Fighter::Building(
                self.buildings()
                    .get_by_id(id.id)
                    .unwrap_or_else(|| panic!("dangling building target {}", id.id)),
            ),
        }
    }

    /// Processes every fighter with at least one attack (for target
    /// selection).  Buildings first, then characters, each by ID.
    pub fn process_with_attacks(&self, mut cb: impl FnMut(Fighter<'a>)) {
        for id in self.buildings().query_with_attacks() {
            cb(Fighter::Building(self.buildings().get_by_id(id).unwrap()));
        }
        for id in self.characters().query_with_attacks() {
            cb(Fighter::Character(self.characters().get_by_id(id).unwrap()));
        }
    }

    /// Processes every fighter that currently has a target.
    pub fn process_with_target(&self, mut cb: impl FnMut(Fighter<'a>)) {
        for id in self.buildings().query_with_target() {
            cb(Fighter::Building(self.buildings().get_by_id(id).unwrap()));
        }
        for id in self.characters().query_with_target() {
            cb(Fighter::Character(self.characters().get_by_id(id).unwrap()));
        }
    }

    /// Processes every fighter able to regenerate HP.
    pub fn process_for_regen(&self, mut cb: impl FnMut(Fighter<'a>)) {
        for id in self.buildings().query_for_regen() {
            cb(Fighter::Building(self.buildings().get_by_id(id).unwrap()));
        }
        for id in self.characters().query_for_regen() {
            cb(Fighter::Character(self.characters().get_by_id(id).unwrap()));
        }
    }

    /// Clears the persisted combat effects of every fighter.  Used at the
    /// end of the damage phase before the newly accumulated effects are
    /// written.
    pub fn clear_all_effects(&self) {
        for id in self.buildings().query_all() {
            let mut b = self.buildings().get_by_id(id).unwrap();
            if !b.data().effects.is_neutral() {
                b.mutate_data().effects = CombatEffects::default();
            }
        }
        for id in self.characters().query_all() {
            let mut c = self.characters().get_by_id(id).unwrap();
            if !c.data().effects.is_neutral() {
                c.mutate_data().effects = CombatEffects::default();
            }
        }
    }
}
