//! Character creation and spawning.
//!
//! New characters appear inside their faction's spawn building, with the
//! faction's starter vehicle and a basic gun fitted.

use tracing::debug;

use crate::context::Context;
use crate::db::characters::{Character, CharacterTable};
use crate::db::records::Faction;
use crate::fitments::derive_character_stats;

/// Creates and fully initialises a new character for the given account.
pub fn spawn_character<'a>(
    owner: &str,
    faction: Faction,
    tbl: &CharacterTable<'a>,
    ctx: &Context<'_>,
) -> Character<'a> {
    debug!(owner, ?faction, "spawning character");
    let mut c = tbl.create_new(owner, faction);

    let vehicle = match faction {
        Faction::Red => "rv st",
        Faction::Green => "gv st",
        Faction::Blue => "bv st",
        _ => panic!("unexpected faction for spawned character: {faction:?}"),
    };
    c.mutate_data().vehicle = vehicle.to_owned();
    c.mutate_data().fitments.push("lf gun".to_owned());
    derive_character_stats(&mut c, ctx);

    c.set_building_id(ctx.params().spawn_building(faction));
    c
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};
    use crate::db::Database;
    use crate::map::BaseMap;

    #[test]
    fn spawned_characters_start_in_faction_building() {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        let params = Params::for_chain(Chain::Regtest);
        let map = BaseMap::new();
        let ctx = Context::new(Chain::Regtest, &params, &map, 10, 0);

        let tbl = CharacterTable::new(&db);
        for (faction, vehicle) in [
            (Faction::Red, "rv st"),
            (Faction::Green, "gv st"),
            (Faction::Blue, "bv st"),
        ] {
            let c = spawn_character("domob", faction, &tbl, &ctx);
            assert_eq!(c.faction(), faction);
            assert_eq!(c.data().vehicle, vehicle);
            assert!(c.is_in_building());
            assert_eq!(c.building_id(), params.spawn_building(faction));
            // Armed and at full HP.
            assert_eq!(c.data().combat_data.attacks.len(), 1);
            assert_eq!(c.hp().armour, c.regen_data().max_hp.armour);
        }
    }
}
