//! Record structs stored in the blob columns of the entity tables.
//!
//! These are encoded with bincode through the lazy-record wrapper; every
//! map in here is a `BTreeMap` so the encoding is canonical.  The same
//! structs double as the schema for the static configuration catalogue
//! (items, buildings), which is deserialised from TOML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amounts::{Amount, Quantity, MAX_QUANTITY};
use crate::hex::HexCoord;

/// Entity ID type, matching the store's integer identity pool.
pub type IdT = i64;

/// Sentinel for "no entity" in columns that hold optional references.
pub const EMPTY_ID: IdT = 0;

/* ************************************************************************ */

/// Player faction.  `Ancient` marks map-provided entities without an owner
/// and is not assignable by players; `Invalid` is the uninitialised state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Faction {
    Invalid,
    Red,
    Green,
    Blue,
    Ancient,
}

impl Faction {
    /// Database integer representation.  The values are part of the
    /// persisted state and must never change.
    pub fn to_db(self) -> i64 {
        match self {
            Faction::Invalid => 0,
            Faction::Red => 1,
            Faction::Green => 2,
            Faction::Blue => 3,
            Faction::Ancient => 4,
        }
    }

    pub fn from_db(val: i64) -> Self {
        match val {
            0 => Faction::Invalid,
            1 => Faction::Red,
            2 => Faction::Green,
            3 => Faction::Blue,
            4 => Faction::Ancient,
            _ => panic!("invalid faction value in database: {val}"),
        }
    }

    /// Single-letter representation used in moves and config ("r", "g", "b").
    pub fn from_move_str(s: &str) -> Self {
        match s {
            "r" => Faction::Red,
            "g" => Faction::Green,
            "b" => Faction::Blue,
            "a" => Faction::Ancient,
            _ => Faction::Invalid,
        }
    }

    pub fn to_move_str(self) -> &'static str {
        match self {
            Faction::Red => "r",
            Faction::Green => "g",
            Faction::Blue => "b",
            Faction::Ancient => "a",
            Faction::Invalid => "invalid",
        }
    }

    /// True for the three factions a player can actually be in.
    pub fn is_player(self) -> bool {
        matches!(self, Faction::Red | Faction::Green | Faction::Blue)
    }
}

/* ************************************************************************ */

/// A percentage-based modification to some combat or vehicle stat.
/// Modifiers are additive in percent when stacked, and apply as
/// `value * (100 + percent) / 100` with truncation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatModifier {
    pub percent: i64,
}

impl StatModifier {
    pub fn new(percent: i64) -> Self {
        Self { percent }
    }

    pub fn apply(&self, value: i64) -> i64 {
        let res = value * (100 + self.percent) / 100;
        res.max(0)
    }

    pub fn apply_u32(&self, value: u32) -> u32 {
        u32::try_from(self.apply(i64::from(value))).expect("modified stat out of u32 range")
    }

    pub fn add(&mut self, other: &StatModifier) {
        self.percent += other.percent;
    }

    pub fn is_neutral(&self) -> bool {
        self.percent == 0
    }
}

/* ************************************************************************ */

/// Armour/shield value pair without sub-unit accumulators (used for maxima
/// and regeneration rates).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpPair {
    #[serde(default)]
    pub armour: u32,
    #[serde(default)]
    pub shield: u32,
}

/// Current hit points including the milli-HP regeneration accumulator.
/// The `mhp` components are always below 1'000.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hp {
    pub armour: u32,
    pub shield: u32,
    #[serde(default)]
    pub mhp: HpPair,
}

impl Hp {
    pub fn from_max(max: &HpPair) -> Self {
        Self {
            armour: max.armour,
            shield: max.shield,
            mhp: HpPair::default(),
        }
    }
}

/// Maximum HP and regeneration rates (milli-HP per block).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenData {
    pub max_hp: HpPair,
    #[serde(default)]
    pub regeneration_mhp: HpPair,
}

/* ************************************************************************ */

/// Damage roll specification of an attack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub min: u32,
    pub max: u32,
    /// How much of the base damage can be applied to the shield, in percent.
    /// Absent means 100.
    #[serde(default)]
    pub shield_percent: Option<u32>,
    #[serde(default)]
    pub armour_percent: Option<u32>,
}

/// Non-damage effects written onto a hit target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackEffects {
    #[serde(default)]
    pub speed: Option<StatModifier>,
    #[serde(default)]
    pub range: Option<StatModifier>,
}

/// One attack of a combat entity.  An attack with only `range` hits the
/// primary target; with `area` it is an area-of-effect attack centred on
/// the target (if `range` is also present) or on the attacker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attack {
    #[serde(default)]
    pub range: Option<u32>,
    #[serde(default)]
    pub area: Option<u32>,
    #[serde(default)]
    pub damage: Option<Damage>,
    /// Drained shield HP are credited to the attacker (after reconciliation).
    #[serde(default)]
    pub gain_hp: bool,
    /// Attack targets entities of the own faction (support effects).
    #[serde(default)]
    pub friendlies: bool,
    #[serde(default)]
    pub effects: Option<AttackEffects>,
}

impl Attack {
    /// Largest distance at which this attack can do anything.
    pub fn max_reach(&self) -> Option<u32> {
        match (self.range, self.area) {
            (Some(r), _) => Some(r),
            (None, Some(a)) => Some(a),
            (None, None) => None,
        }
    }
}

/// Self-destruct blast triggered when the entity dies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfDestruct {
    pub area: u32,
    pub damage: Damage,
}

/// Stat boost that kicks in when armour HP falls at or below the given
/// fraction of the maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowHpBoost {
    pub max_hp_percent: u32,
    #[serde(default)]
    pub damage: StatModifier,
    #[serde(default)]
    pub range: StatModifier,
}

/// Full combat capabilities of an entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatData {
    #[serde(default)]
    pub attacks: Vec<Attack>,
    #[serde(default)]
    pub low_hp_boosts: Vec<LowHpBoost>,
    #[serde(default)]
    pub self_destructs: Vec<SelfDestruct>,
    #[serde(default)]
    pub received_damage_modifier: StatModifier,
}

impl CombatData {
    /// Largest reach over all attacks of the given friendliness, or None if
    /// there are no such attacks at all.
    pub fn attack_range(&self, friendlies: bool) -> Option<u32> {
        self.attacks
            .iter()
            .filter(|a| a.friendlies == friendlies)
            .filter_map(Attack::max_reach)
            .max()
    }
}

/// Effects currently in force on an entity, written by enemy hits.  They are
/// replaced wholesale after each block's damage phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEffects {
    #[serde(default)]
    pub speed: StatModifier,
    #[serde(default)]
    pub range: StatModifier,
    #[serde(default)]
    pub shield_regen: StatModifier,
}

impl CombatEffects {
    pub fn is_neutral(&self) -> bool {
        self.speed.is_neutral() && self.range.is_neutral() && self.shield_regen.is_neutral()
    }
}

/* ************************************************************************ */

/// What kind of entity a combat target refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Character,
    Building,
}

/// Reference to a combat entity.  Orders as (kind, id), which is the stable
/// processing order for anything iterating over mixed dead/target sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId {
    pub kind: TargetKind,
    pub id: IdT,
}

impl TargetId {
    pub fn character(id: IdT) -> Self {
        Self {
            kind: TargetKind::Character,
            id,
        }
    }

    pub fn building(id: IdT) -> Self {
        Self {
            kind: TargetKind::Building,
            id,
        }
    }
}

/* ************************************************************************ */

/// Mining rate of a vehicle, units per block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningRate {
    pub min: u64,
    pub max: u64,
}

/// Mining state of a character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningData {
    pub rate: MiningRate,
    #[serde(default)]
    pub active: bool,
}

/// An active movement plan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub waypoints: Vec<HexCoord>,
    #[serde(default)]
    pub chosen_speed: Option<u64>,
}

/// Frequently-changing movement bookkeeping, kept in its own small blob so
/// the per-step writes do not re-encode the main character record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileMovement {
    #[serde(default)]
    pub blocked_turns: u32,
}

/* ************************************************************************ */

/// Fungible item map.  Absent entries mean zero; the wrapper keeps the
/// invariant that no zero quantities are stored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub fungible: BTreeMap<String, u64>,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.fungible.is_empty()
    }

    pub fn get(&self, item: &str) -> Quantity {
        self.fungible
            .get(item)
            .map(|q| i64::try_from(*q).expect("stored quantity out of range"))
            .unwrap_or(0)
    }

    pub fn set(&mut self, item: &str, count: Quantity) {
        assert!(
            (0..=MAX_QUANTITY).contains(&count),
            "invalid quantity {count} for {item}"
        );
        if count == 0 {
            self.fungible.remove(item);
        } else {
            self.fungible.insert(item.to_owned(), count as u64);
        }
    }

    /// Adds the (positive or negative) delta to an item count.  Going below
    /// zero or above the quantity cap is a programming fault; move-level
    /// validation happens before any mutation.
    pub fn add(&mut self, item: &str, delta: Quantity) {
        let cur = self.get(item);
        self.set(item, cur + delta);
    }

    /// Merges all items from the other inventory into this one.
    pub fn extend_from(&mut self, other: &Inventory) {
        for (item, count) in &other.fungible {
            self.add(item, *count as Quantity);
        }
    }

    pub fn clear(&mut self) {
        self.fungible.clear();
    }
}

/* ************************************************************************ */

/// Configurable per-building fees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingConfig {
    #[serde(default)]
    pub service_fee_percent: u32,
    #[serde(default)]
    pub dex_fee_bps: u32,
}

/// Block heights of building lifecycle events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeData {
    pub founded_height: u64,
    #[serde(default)]
    pub finished_height: Option<u64>,
}

/// Main character record blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData {
    pub vehicle: String,
    #[serde(default)]
    pub fitments: Vec<String>,
    #[serde(default)]
    pub cargo_space: u64,
    #[serde(default)]
    pub speed: u64,
    #[serde(default)]
    pub combat_data: CombatData,
    #[serde(default)]
    pub effects: CombatEffects,
    #[serde(default)]
    pub target: Option<TargetId>,
    #[serde(default)]
    pub mining: Option<MiningData>,
    #[serde(default)]
    pub movement: Option<Movement>,
    #[serde(default)]
    pub ongoing: Option<IdT>,
    #[serde(default)]
    pub prospecting_blocks: Option<u32>,
    /// Building the character wants to enter once close enough.
    #[serde(default)]
    pub enter_building: Option<IdT>,
}

/// Main building record blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingData {
    #[serde(default)]
    pub shape_rotation: u32,
    #[serde(default)]
    pub foundation: bool,
    #[serde(default)]
    pub config: BuildingConfig,
    /// Materials dropped off for construction.  Only meaningful (and only
    /// ever non-empty) while the building is a foundation.
    #[serde(default)]
    pub construction_inventory: Inventory,
    /// Set once construction of the full building has been scheduled.
    #[serde(default)]
    pub ongoing_construction: Option<IdT>,
    #[serde(default)]
    pub age_data: AgeData,
    #[serde(default)]
    pub combat_data: CombatData,
    #[serde(default)]
    pub effects: CombatEffects,
    #[serde(default)]
    pub target: Option<TargetId>,
}

/// Result of a finished prospection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prospection {
    /// Account that prospected the region.
    pub name: String,
    pub height: u64,
    pub resource: String,
}

/// Region record blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionData {
    #[serde(default)]
    pub prospecting_character: Option<IdT>,
    #[serde(default)]
    pub prospection: Option<Prospection>,
}

/// Per-account record blob.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    /// Total vCHI this account minted through the burnsale.
    #[serde(default)]
    pub burnsale_balance: Amount,
}

/// Payload of an ongoing operation.  The scheduler dispatches on the
/// variant; adding a kind extends the match exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OngoingPayload {
    Prospection,
    ArmourRepair,
    BlueprintCopy {
        account: String,
        original_type: String,
        copy_type: String,
        num_copies: u64,
    },
    ItemConstruction {
        account: String,
        output_type: String,
        num_items: u64,
        /// Blueprint original to hand back on completion (None when
        /// construction ran from a copy, which is consumed).
        original_type: Option<String>,
    },
    BuildingConstruction,
    BuildingUpdate {
        new_config: BuildingConfig,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_modifier_math() {
        let m = StatModifier::new(0);
        assert_eq!(m.apply(100), 100);

        let m = StatModifier::new(50);
        assert_eq!(m.apply(100), 150);
        assert_eq!(m.apply(3), 4);

        let m = StatModifier::new(-30);
        assert_eq!(m.apply(100), 70);
        assert_eq!(m.apply(1), 0);

        let mut m = StatModifier::new(10);
        m.add(&StatModifier::new(15));
        assert_eq!(m.percent, 25);
        // Stacking is additive, not compounding.
        assert_eq!(m.apply(100), 125);

        let m = StatModifier::new(-200);
        assert_eq!(m.apply(100), 0, "modified stats never go negative");
    }

    #[test]
    fn inventory_add_remove() {
        let mut inv = Inventory::default();
        assert!(inv.is_empty());
        assert_eq!(inv.get("raw a"), 0);

        inv.add("raw a", 5);
        inv.add("raw a", 3);
        assert_eq!(inv.get("raw a"), 8);

        inv.add("raw a", -8);
        assert_eq!(inv.get("raw a"), 0);
        assert!(inv.is_empty(), "zero quantities are not stored");
    }

    #[test]
    #[should_panic(expected = "invalid quantity")]
    fn inventory_underflow_panics() {
        let mut inv = Inventory::default();
        inv.add("raw a", -1);
    }

    #[test]
    fn attack_reach() {
        let mut a = Attack::default();
        assert_eq!(a.max_reach(), None);
        a.area = Some(3);
        assert_eq!(a.max_reach(), Some(3));
        a.range = Some(7);
        assert_eq!(a.max_reach(), Some(7));
    }

    #[test]
    fn combat_data_range_per_friendliness() {
        let cd = CombatData {
            attacks: vec![
                Attack {
                    range: Some(5),
                    ..Default::default()
                },
                Attack {
                    range: Some(9),
                    friendlies: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(cd.attack_range(false), Some(5));
        assert_eq!(cd.attack_range(true), Some(9));
    }

    #[test]
    fn faction_db_roundtrip() {
        for f in [
            Faction::Invalid,
            Faction::Red,
            Faction::Green,
            Faction::Blue,
            Faction::Ancient,
        ] {
            assert_eq!(Faction::from_db(f.to_db()), f);
        }
    }
}
