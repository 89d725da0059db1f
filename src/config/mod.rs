//! Read-only game configuration.
//!
//! The static world catalogue (items, buildings, resource areas, safe
//! zones) ships embedded as TOML and is parsed once into a process-wide
//! instance.  Chain-specific numeric parameters are code (`Params`), the
//! same way the chain decides fork gating.
//!
//! Lookups of types referenced by existing records panic when absent: that
//! means the persisted state and the configuration disagree, which is not
//! recoverable.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::amounts::{Amount, ChiAmount};
use crate::db::records::{
    Attack, Faction, IdT, MiningRate, RegenData, SelfDestruct, StatModifier,
};
use crate::hex::HexCoord;

/// Satoshi per CHI coin.
pub const COIN: ChiAmount = 100_000_000;

/// The chain this process is validating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chain {
    Main,
    Test,
    Regtest,
}

impl Chain {
    pub fn from_str(s: &str) -> Option<Chain> {
        match s {
            "main" => Some(Chain::Main),
            "test" => Some(Chain::Test),
            "regtest" => Some(Chain::Regtest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Main => "main",
            Chain::Test => "test",
            Chain::Regtest => "regtest",
        }
    }
}

/* ************************************************************************ */

/// Vehicle stats of an item that can be piloted.
#[derive(Clone, Debug, Deserialize)]
pub struct VehicleData {
    pub cargo_space: u64,
    pub speed: u64,
    pub regen_data: RegenData,
    #[serde(default)]
    pub attacks: Vec<Attack>,
    #[serde(default)]
    pub mining_rate: Option<MiningRate>,
    #[serde(default)]
    pub prospecting_blocks: Option<u32>,
}

/// Effects of an item that can be fitted onto a vehicle.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FitmentData {
    #[serde(default)]
    pub attack: Option<Attack>,
    #[serde(default)]
    pub self_destruct: Option<SelfDestruct>,
    #[serde(default)]
    pub cargo_space: Option<StatModifier>,
    #[serde(default)]
    pub speed: Option<StatModifier>,
    #[serde(default)]
    pub max_armour: Option<StatModifier>,
    #[serde(default)]
    pub max_shield: Option<StatModifier>,
    #[serde(default)]
    pub shield_regen: Option<StatModifier>,
    #[serde(default)]
    pub range: Option<StatModifier>,
    #[serde(default)]
    pub damage: Option<StatModifier>,
}

/// Blueprint role of an item.
#[derive(Clone, Debug, Deserialize)]
pub struct BlueprintData {
    pub for_item: String,
    pub original: bool,
    pub copy_type: String,
    pub copy_blocks: u32,
    /// Base coin cost per produced copy.
    pub copy_cost: Amount,
}

/// Recipe for constructing an item inside a building.
#[derive(Clone, Debug, Deserialize)]
pub struct ItemConstruction {
    pub blocks: u32,
    /// Base coin cost per constructed item.
    pub cost: Amount,
    pub inputs: BTreeMap<String, u64>,
}

/// One item type in the catalogue.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ItemData {
    /// Cargo space one unit takes up.
    #[serde(default)]
    pub space: u64,
    #[serde(default)]
    pub vehicle: Option<VehicleData>,
    #[serde(default)]
    pub fitment: Option<FitmentData>,
    #[serde(default)]
    pub blueprint: Option<BlueprintData>,
    #[serde(default)]
    pub construction: Option<ItemConstruction>,
}

/// Construction data of a building type.
#[derive(Clone, Debug, Deserialize)]
pub struct BuildingConstruction {
    pub blocks: u32,
    /// Restricts construction to one faction ("r" / "g" / "b").
    #[serde(default)]
    pub faction: Option<String>,
    pub foundation: BTreeMap<String, u64>,
    pub full: BTreeMap<String, u64>,
}

/// One building type in the catalogue.
#[derive(Clone, Debug, Deserialize)]
pub struct BuildingType {
    /// Canonical shape tiles relative to the centre, before rotation.
    pub tiles: Vec<[i32; 2]>,
    pub regen_data: RegenData,
    #[serde(default)]
    pub attacks: Vec<Attack>,
    #[serde(default)]
    pub construction: Option<BuildingConstruction>,
}

impl BuildingType {
    /// Shape tiles as world coordinates for the given rotation and centre.
    pub fn shape(&self, rotation: u32, centre: &HexCoord) -> Vec<HexCoord> {
        self.tiles
            .iter()
            .map(|t| HexCoord::new(t[0], t[1]).rotate_cw(rotation).add(centre))
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ResourceArea {
    pub centre: [i32; 2],
    pub resources: Vec<String>,
}

impl ResourceArea {
    pub fn centre_coord(&self) -> HexCoord {
        HexCoord::new(self.centre[0], self.centre[1])
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SafeZone {
    pub centre: [i32; 2],
    pub radius: i32,
    #[serde(default)]
    pub faction: Option<String>,
}

impl SafeZone {
    pub fn centre_coord(&self) -> HexCoord {
        HexCoord::new(self.centre[0], self.centre[1])
    }

    pub fn contains(&self, pos: &HexCoord) -> bool {
        HexCoord::distance_l1(&self.centre_coord(), pos) <= self.radius
    }
}

/// The full static catalogue.
#[derive(Clone, Debug, Deserialize)]
pub struct RoConfig {
    pub items: BTreeMap<String, ItemData>,
    pub buildings: BTreeMap<String, BuildingType>,
    pub resource_areas: Vec<ResourceArea>,
    pub safe_zones: Vec<SafeZone>,
}

impl RoConfig {
    pub fn get() -> &'static RoConfig {
        static INSTANCE: Lazy<RoConfig> = Lazy::new(|| {
            let cfg: RoConfig = toml::from_str(include_str!("roconfig.toml"))
                .expect("embedded roconfig does not parse");
            cfg.validate();
            cfg
        });
        &INSTANCE
    }

    fn validate(&self) {
        for (name, item) in &self.items {
            if let Some(bp) = &item.blueprint {
                assert!(
                    self.items.contains_key(&bp.for_item),
                    "blueprint {name} for unknown item {}",
                    bp.for_item
                );
                assert!(
                    self.items.contains_key(&bp.copy_type),
                    "blueprint {name} with unknown copy type {}",
                    bp.copy_type
                );
            }
            if let Some(c) = &item.construction {
                for input in c.inputs.keys() {
                    assert!(
                        self.items.contains_key(input),
                        "item {name} construction needs unknown input {input}"
                    );
                }
            }
        }
        for (name, b) in &self.buildings {
            assert!(!b.tiles.is_empty(), "building {name} has no shape tiles");
        }
    }

    pub fn item_or_null(&self, name: &str) -> Option<&ItemData> {
        self.items.get(name)
    }

    /// Item lookup for types already referenced by persisted state.
    pub fn item(&self, name: &str) -> &ItemData {
        self.items
            .get(name)
            .unwrap_or_else(|| panic!("undefined item type in state: {name}"))
    }

    pub fn building_or_null(&self, name: &str) -> Option<&BuildingType> {
        self.buildings.get(name)
    }

    pub fn building(&self, name: &str) -> &BuildingType {
        self.buildings
            .get(name)
            .unwrap_or_else(|| panic!("undefined building type in state: {name}"))
    }
}

/* ************************************************************************ */

/// Prospecting prize tier.  Probability is 1-in-`one_in`, with at most
/// `number` of the prize ever found.
#[derive(Clone, Debug)]
pub struct PrizeTier {
    pub name: &'static str,
    pub number: u32,
    pub one_in: u64,
}

/// Chain-specific consensus parameters and fork-style switches.
#[derive(Clone, Debug)]
pub struct Params {
    pub chain: Chain,
    /// Admin channel is honoured only when set (regtest).
    pub god_mode: bool,
    pub dev_addr: &'static str,
    pub burn_addr: &'static str,
    /// CHI (satoshi) to pay per new character.
    pub character_cost: ChiAmount,
    pub character_limit: u32,
    /// vCHI credited per created character.
    pub vchi_airdrop: Amount,
    pub damage_list_blocks: u64,
    pub prospection_expiry_blocks: u64,
    pub building_update_delay: u64,
    /// Protocol DEX fee in basis points (burnt).
    pub dex_fee_bps: u32,
    pub min_region_ore: u64,
    pub max_region_ore: u64,
    /// Movement clears after this many blocked steps in a row.
    pub blocked_turns_limit: u32,
    /// Radius around starter safe zones where prize odds are reduced.
    pub low_prize_radius: i32,
    pub prizes: Vec<PrizeTier>,
    /// Heights before this are pre-game; only coin operations run.
    pub game_start_height: u64,
    /// Burnsale schedule: (coins per tier, CHI satoshi per coin).
    pub burnsale_tiers: &'static [(Amount, ChiAmount)],
}

/// Burnsale schedule shared by all chains.
const BURNSALE_TIERS: &[(Amount, ChiAmount)] = &[
    (10_000_000, 10_000),
    (10_000_000, 20_000),
    (10_000_000, 50_000),
    (10_000_000, 100_000),
];

impl Params {
    pub fn for_chain(chain: Chain) -> Params {
        let mut p = Params {
            chain,
            god_mode: false,
            dev_addr: "AURdev00000000000000000000000000000",
            burn_addr: "AURburn0000000000000000000000000000",
            character_cost: 5 * COIN,
            character_limit: 20,
            vchi_airdrop: 1_000,
            damage_list_blocks: 100,
            prospection_expiry_blocks: 5_000,
            building_update_delay: 100,
            dex_fee_bps: 30,
            min_region_ore: 1_000,
            max_region_ore: 3_000,
            blocked_turns_limit: 10,
            low_prize_radius: 1_250,
            prizes: vec![
                PrizeTier {
                    name: "gold",
                    number: 5,
                    one_in: 1_000,
                },
                PrizeTier {
                    name: "silver",
                    number: 50,
                    one_in: 100,
                },
                PrizeTier {
                    name: "bronze",
                    number: 2_000,
                    one_in: 10,
                },
            ],
            game_start_height: 1_656_000,
            burnsale_tiers: BURNSALE_TIERS,
        };

        match chain {
            Chain::Main => (),
            Chain::Test => {
                p.game_start_height = 97_000;
            }
            Chain::Regtest => {
                p.god_mode = true;
                p.damage_list_blocks = 10;
                p.prospection_expiry_blocks = 100;
                p.building_update_delay = 10;
                p.min_region_ore = 10;
                p.max_region_ore = 100;
                p.game_start_height = 0;
            }
        }

        p
    }

    /// Spawn building (by well-known ID from state initialisation) for a
    /// player faction.
    pub fn spawn_building(&self, f: Faction) -> IdT {
        match f {
            Faction::Red => 4,
            Faction::Green => 5,
            Faction::Blue => 6,
            _ => panic!("no spawn building for faction {f:?}"),
        }
    }

    /// True if prospection prizes are found with reduced odds at `pos`.
    pub fn is_low_prize_zone(&self, pos: &HexCoord) -> bool {
        RoConfig::get()
            .safe_zones
            .iter()
            .filter(|z| z.faction.is_some())
            .any(|z| HexCoord::distance_l1(&z.centre_coord(), pos) <= self.low_prize_radius)
    }
}
