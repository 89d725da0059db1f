//! Building game logic: placement, stat derivation, entering and leaving,
//! and the start of foundation construction.

use tracing::{debug, info, warn};

use crate::context::Context;
use crate::db::buildings::{Building, BuildingsTable};
use crate::db::characters::{Character, CharacterTable};
use crate::db::ongoings::OngoingsTable;
use crate::db::records::{Faction, Hp, OngoingPayload};
use crate::db::Database;
use crate::dynobstacles::DynObstacles;
use crate::hex::{HexCoord, L1Ring};
use crate::mining::stop_mining;
use crate::movement::stop_character;
use crate::rng::BlockRng;

/// Maximum L1 distance from any building tile at which a character can
/// enter it.
const ENTER_DISTANCE: i32 = 1;

/// Checks whether a building of the given type and rotation can be placed
/// with its centre at `pos`: all tiles on the map, statically passable,
/// free of vehicles and buildings, and within a single region.
pub fn can_place_building(
    building_type: &str,
    rotation: u32,
    pos: &HexCoord,
    dyn_obstacles: &DynObstacles,
    ctx: &Context<'_>,
) -> bool {
    let shape = match ctx.roconfig().building_or_null(building_type) {
        Some(t) => t.shape(rotation, pos),
        None => return false,
    };

    let mut region = None;
    for tile in &shape {
        if !ctx.map().is_on_map(tile) || !ctx.map().is_passable(tile) {
            return false;
        }
        if !dyn_obstacles.is_free(tile) {
            return false;
        }
        let tile_region = ctx.map().region_id(tile);
        if *region.get_or_insert(tile_region) != tile_region {
            return false;
        }
    }

    true
}

/// Recomputes a building's combat stats from its type and foundation
/// state.  Foundations have neither attacks nor regeneration.
pub fn update_building_stats(b: &mut Building<'_>, ctx: &Context<'_>) {
    let building_type = ctx.roconfig().building(b.building_type()).clone();
    let foundation = b.is_foundation();

    {
        let data = b.mutate_data();
        data.combat_data.attacks = if foundation {
            Vec::new()
        } else {
            building_type.attacks.clone()
        };
    }

    let regen = b.mutate_regen_data();
    regen.max_hp = building_type.regen_data.max_hp;
    regen.regeneration_mhp = if foundation {
        Default::default()
    } else {
        building_type.regen_data.regeneration_mhp
    };
}

/// Lets the character enter the building.  The vehicle vanishes from the
/// map; any movement, mining or combat target is cancelled.
pub fn enter_building(c: &mut Character<'_>, b: &Building<'_>, dyn_obstacles: &mut DynObstacles) {
    debug!(character = c.id(), building = b.id(), "entering building");
    if !c.is_in_building() {
        dyn_obstacles.remove_vehicle(c.position());
    }
    stop_character(c);
    stop_mining(c);
    c.clear_target();
    c.mutate_data().enter_building = None;
    c.set_building_id(b.id());
}

/// Resolves all pending "enter building" intents.  Characters close enough
/// enter now; intents referencing vanished buildings are dropped.
pub fn process_enter_buildings(db: &Database, dyn_obstacles: &mut DynObstacles) {
    let characters = CharacterTable::new(db);
    let buildings = BuildingsTable::new(db);

    for id in characters.query_entering() {
        let mut c = characters.get_by_id(id).unwrap();
        if c.is_busy() {
            continue;
        }
        let building_id = c.data().enter_building.expect("entering without intent");

        let b = match buildings.get_by_id(building_id) {
            Some(b) => b,
            None => {
                warn!(character = id, building_id, "enter target no longer exists");
                c.mutate_data().enter_building = None;
                continue;
            }
        };

        let pos = c.position();
        let in_range = b
            .shape()
            .iter()
            .any(|t| HexCoord::distance_l1(t, &pos) <= ENTER_DISTANCE);
        if !in_range {
            continue;
        }

        enter_building(&mut c, &b, dyn_obstacles);
    }
}

/// Places the character back onto the map next to the building it is in:
/// the closest ring with free passable tiles, one of them chosen at
/// random.
pub fn leave_building(
    buildings: &BuildingsTable<'_>,
    c: &mut Character<'_>,
    rng: &mut BlockRng,
    dyn_obstacles: &mut DynObstacles,
    ctx: &Context<'_>,
) {
    let building_id = c.building_id();
    let b = buildings
        .get_by_id(building_id)
        .expect("character is in non-existant building");
    let centre = b.centre();
    drop(b);

    for radius in 1.. {
        let ring = L1Ring::new(centre, radius);
        let mut found_on_map = false;
        let candidates: Vec<HexCoord> = ring
            .iter()
            .into_iter()
            .filter(|pos| {
                if !ctx.map().is_on_map(pos) {
                    return false;
                }
                found_on_map = true;
                ctx.map().is_passable(pos) && dyn_obstacles.is_free(pos)
            })
            .collect();

        if !candidates.is_empty() {
            let pos = candidates[rng.next_int(candidates.len() as u64) as usize];
            info!(character = c.id(), building = building_id, %pos, "exiting building");
            c.set_position(pos);
            dyn_obstacles.add_vehicle(pos, c.faction());
            return;
        }

        // If the ring did not even touch the map any more, there is no
        // spot at all; that cannot happen on a sane map.
        assert!(found_on_map, "no free tile around building {building_id}");
    }
}

/// Starts construction of a foundation once its construction inventory
/// covers the full recipe.  Called whenever resources are dropped off.
pub fn maybe_start_building_construction(b: &mut Building<'_>, db: &Database, ctx: &Context<'_>) {
    if !b.is_foundation() || b.data().ongoing_construction.is_some() {
        return;
    }

    let recipe = match &ctx.roconfig().building(b.building_type()).construction {
        Some(c) => c.clone(),
        None => return,
    };

    {
        let inv = &b.data().construction_inventory;
        for (item, needed) in &recipe.full {
            if inv.get(item) < *needed as i64 {
                return;
            }
        }
    }

    info!(building = b.id(), "starting building construction");
    let data = b.mutate_data();
    for (item, needed) in &recipe.full {
        data.construction_inventory.add(item, -(*needed as i64));
    }

    let ongoings = OngoingsTable::new(db);
    let mut op = ongoings.create_new(ctx.height() + u64::from(recipe.blocks));
    op.set_building_id(b.id());
    op.set_payload(OngoingPayload::BuildingConstruction);
    b.mutate_data().ongoing_construction = Some(op.id());
}

/// Finishes construction: the foundation becomes a full building with its
/// combat capabilities and service menu unlocked.
pub fn finish_building_construction(b: &mut Building<'_>, ctx: &Context<'_>) {
    assert!(b.is_foundation(), "finishing construction of full building");
    info!(building = b.id(), "construction finished");

    {
        let data = b.mutate_data();
        data.foundation = false;
        data.ongoing_construction = None;
        data.age_data.finished_height = Some(ctx.height());
        assert!(
            data.construction_inventory.is_empty(),
            "leftover construction inventory in finished building"
        );
    }
    update_building_stats(b, ctx);
}

/// Places the initial ancient buildings.  The spawn centres get the
/// well-known IDs the per-faction spawn configuration refers to.
pub fn initialise_buildings(db: &Database, ctx: &Context<'_>) {
    info!("adding initial ancient buildings to the map");
    let tbl = BuildingsTable::new(db);

    let mut place = |building_type: &str, centre: HexCoord| {
        let mut b = tbl.create_new(building_type, "", Faction::Ancient);
        b.set_centre(centre);
        update_building_stats(&mut b, ctx);
        let max = b.regen_data().max_hp;
        *b.mutate_hp() = Hp::from_max(&max);
        b.id()
    };

    place("obelisk", HexCoord::new(-125, 810));
    place("obelisk", HexCoord::new(-1_301, 902));
    place("obelisk", HexCoord::new(-637, -291));

    let r = place("spawn ctr", HexCoord::new(-100, 790));
    let g = place("spawn ctr", HexCoord::new(-1_280, 880));
    let b = place("spawn ctr", HexCoord::new(-610, -310));

    assert_eq!(r, ctx.params().spawn_building(Faction::Red));
    assert_eq!(g, ctx.params().spawn_building(Faction::Green));
    assert_eq!(b, ctx.params().spawn_building(Faction::Blue));
}
