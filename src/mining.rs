//! Per-block resource extraction from prospected regions.

use tracing::{trace, warn};

use crate::config::RoConfig;
use crate::context::Context;
use crate::db::characters::{Character, CharacterTable};
use crate::db::regions::RegionsTable;
use crate::db::Database;
use crate::rng::BlockRng;

/// Turns off active mining of a character.
pub fn stop_mining(c: &mut Character<'_>) {
    let active = c.data().mining.as_ref().map(|m| m.active).unwrap_or(false);
    if active {
        trace!(id = c.id(), "stopping mining");
        c.mutate_data().mining.as_mut().unwrap().active = false;
    }
}

/// Processes mining for all actively mining characters, in ID order.
pub fn process_all_mining(db: &Database, rng: &mut BlockRng, ctx: &Context<'_>) {
    let characters = CharacterTable::new(db);
    let regions = RegionsTable::new(db, ctx.height());

    for id in characters.query_mining() {
        let mut c = characters.get_by_id(id).unwrap();
        let pos = c.position();
        let region_id = ctx.map().region_id(&pos);
        trace!(character = id, region_id, "processing mining");
        let mut r = regions.get_by_id(region_id);

        let rate = c
            .data()
            .mining
            .as_ref()
            .expect("mining character without mining data")
            .rate;

        // The prospection entry may have been cleared already, e.g. when
        // the region ran dry last block and is being re-prospected.  Stop
        // mining gracefully in that case.
        let resource = match &r.data().prospection {
            Some(p) => p.resource.clone(),
            None => {
                warn!(character = id, region_id, "mining in unprospected region");
                stop_mining(&mut c);
                continue;
            }
        };

        let mut mined = (rate.min + rng.next_int(rate.max - rate.min + 1)) as i64;
        trace!(character = id, mined, %resource, "mining roll");

        // A zero roll neither mines nor deactivates.
        if mined == 0 {
            continue;
        }

        let left = r.resource_left();
        assert!(left >= 0);
        if mined > left {
            mined = left;
        }

        let item_space = RoConfig::get().item(&resource).space as i64;
        assert!(item_space > 0, "minable resource {resource} has zero space");
        let max_for_space = c.free_cargo_space() / item_space;
        if mined > max_for_space {
            trace!(character = id, max_for_space, "cargo limits mining");
            mined = max_for_space;
        }

        if mined > 0 {
            r.set_resource_left(left - mined);
            c.mutate_inventory().add(&resource, mined);
        } else {
            trace!(character = id, "cannot mine any more, deactivating");
            stop_mining(&mut c);
        }
    }
}
