//! Character stat derivation from vehicle and fitments.

use crate::context::Context;
use crate::db::characters::Character;
use crate::db::records::{Hp, MiningData, StatModifier};

/// Checks whether the given fitments can go onto the vehicle.  The limit
/// is the vehicle's fitment space: every fitment item's `space` counts
/// against the vehicle's cargo-space-independent budget of one slot per
/// two cargo units.
pub fn check_vehicle_fitments(vehicle: &str, fitments: &[String], ctx: &Context<'_>) -> bool {
    let cfg = ctx.roconfig();
    let vehicle_data = match cfg.item_or_null(vehicle).and_then(|i| i.vehicle.as_ref()) {
        Some(v) => v,
        None => return false,
    };

    let budget = vehicle_data.cargo_space / 2;
    let mut used = 0u64;
    for f in fitments {
        let item = match cfg.item_or_null(f) {
            Some(i) if i.fitment.is_some() => i,
            _ => return false,
        };
        used += item.space;
    }
    used <= budget
}

/// Re-derives all of a character's stats from its vehicle and fitments.
/// Resets HP to the (possibly changed) maximum; callers only allow fitment
/// changes on fully repaired vehicles, so this never heals in effect.
pub fn derive_character_stats(c: &mut Character<'_>, ctx: &Context<'_>) {
    let cfg = ctx.roconfig();
    let vehicle_name = c.data().vehicle.clone();
    let vehicle = cfg
        .item(&vehicle_name)
        .vehicle
        .as_ref()
        .unwrap_or_else(|| panic!("character {} pilots non-vehicle {vehicle_name}", c.id()))
        .clone();

    // Base stats from the vehicle.
    {
        let data = c.mutate_data();
        data.cargo_space = vehicle.cargo_space;
        data.speed = vehicle.speed;
        data.combat_data.attacks = vehicle.attacks.clone();
        data.combat_data.self_destructs.clear();
        data.prospecting_blocks = vehicle.prospecting_blocks;
        data.mining = vehicle.mining_rate.map(|rate| MiningData {
            rate,
            active: false,
        });
    }
    *c.mutate_regen_data() = vehicle.regen_data;

    // Fitment modifiers are totalled first and applied once at the end, so
    // boosts do not compound.
    let mut cargo = StatModifier::default();
    let mut speed = StatModifier::default();
    let mut max_armour = StatModifier::default();
    let mut max_shield = StatModifier::default();
    let mut shield_regen = StatModifier::default();
    let mut range = StatModifier::default();
    let mut damage = StatModifier::default();

    let fitments = c.data().fitments.clone();
    for f in &fitments {
        let fitment = cfg
            .item(f)
            .fitment
            .as_ref()
            .unwrap_or_else(|| panic!("non-fitment {f} on character {}", c.id()))
            .clone();

        if let Some(attack) = &fitment.attack {
            c.mutate_data().combat_data.attacks.push(attack.clone());
        }
        if let Some(sd) = &fitment.self_destruct {
            c.mutate_data().combat_data.self_destructs.push(*sd);
        }

        for (total, part) in [
            (&mut cargo, &fitment.cargo_space),
            (&mut speed, &fitment.speed),
            (&mut max_armour, &fitment.max_armour),
            (&mut max_shield, &fitment.max_shield),
            (&mut shield_regen, &fitment.shield_regen),
            (&mut range, &fitment.range),
            (&mut damage, &fitment.damage),
        ] {
            if let Some(m) = part {
                total.add(m);
            }
        }
    }

    {
        let data = c.mutate_data();
        data.cargo_space = cargo.apply(data.cargo_space as i64) as u64;
        data.speed = speed.apply(data.speed as i64) as u64;
        for a in &mut data.combat_data.attacks {
            if let Some(r) = a.range {
                a.range = Some(range.apply_u32(r));
            }
            if let Some(d) = &mut a.damage {
                d.min = damage.apply_u32(d.min);
                d.max = damage.apply_u32(d.max);
            }
        }
    }

    {
        let regen = c.mutate_regen_data();
        regen.max_hp.armour = max_armour.apply_u32(regen.max_hp.armour);
        regen.max_hp.shield = max_shield.apply_u32(regen.max_hp.shield);
        regen.regeneration_mhp.shield = shield_regen.apply_u32(regen.regeneration_mhp.shield);
    }

    let max = c.regen_data().max_hp;
    *c.mutate_hp() = Hp::from_max(&max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};
    use crate::db::characters::CharacterTable;
    use crate::db::records::Faction;
    use crate::db::Database;
    use crate::hex::HexCoord;
    use crate::map::BaseMap;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    struct Setup {
        params: Params,
        map: BaseMap,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                params: Params::for_chain(Chain::Regtest),
                map: BaseMap::new(),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(Chain::Regtest, &self.params, &self.map, 10, 0)
        }
    }

    fn make_character(db: &Database, vehicle: &str, fitments: &[&str]) -> i64 {
        let tbl = CharacterTable::new(db);
        let mut c = tbl.create_new("domob", Faction::Red);
        c.set_position(HexCoord::new(0, 0));
        c.mutate_data().vehicle = vehicle.to_owned();
        c.mutate_data().fitments = fitments.iter().map(|s| s.to_string()).collect();
        c.id()
    }

    #[test]
    fn base_vehicle_stats() {
        let db = test_db();
        let setup = Setup::new();
        let ctx = setup.ctx();
        let id = make_character(&db, "rv st", &[]);

        let tbl = CharacterTable::new(&db);
        let mut c = tbl.get_by_id(id).unwrap();
        derive_character_stats(&mut c, &ctx);

        assert_eq!(c.data().cargo_space, 20);
        assert_eq!(c.data().speed, 2);
        assert!(c.data().combat_data.attacks.is_empty());
        assert_eq!(c.data().prospecting_blocks, Some(10));
        assert_eq!(c.hp().armour, 100);
        assert_eq!(c.hp().shield, 30);
    }

    #[test]
    fn fitments_add_attacks_and_modifiers() {
        let db = test_db();
        let setup = Setup::new();
        let ctx = setup.ctx();
        let id = make_character(&db, "rv st", &["lf gun", "shield booster"]);

        let tbl = CharacterTable::new(&db);
        let mut c = tbl.get_by_id(id).unwrap();
        derive_character_stats(&mut c, &ctx);

        let data = c.data();
        assert_eq!(data.combat_data.attacks.len(), 1);
        assert_eq!(data.combat_data.attacks[0].range, Some(5));
        drop(data);
        assert_eq!(c.regen_data().max_hp.shield, 39);
        assert_eq!(c.hp().shield, 39, "HP reset to the new maximum");
    }

    #[test]
    fn modifiers_do_not_compound() {
        let db = test_db();
        let setup = Setup::new();
        let ctx = setup.ctx();
        let id = make_character(&db, "hauler", &["cargo pod", "cargo pod"]);

        let tbl = CharacterTable::new(&db);
        let mut c = tbl.get_by_id(id).unwrap();
        derive_character_stats(&mut c, &ctx);

        // Two +50% pods add to +100%, not x1.5 twice.
        assert_eq!(c.data().cargo_space, 2_000);
    }

    #[test]
    fn self_destruct_fitment() {
        let db = test_db();
        let setup = Setup::new();
        let ctx = setup.ctx();
        let id = make_character(&db, "rv st", &["bomb rig"]);

        let tbl = CharacterTable::new(&db);
        let mut c = tbl.get_by_id(id).unwrap();
        derive_character_stats(&mut c, &ctx);
        assert_eq!(c.data().combat_data.self_destructs.len(), 1);
        assert_eq!(c.data().combat_data.self_destructs[0].area, 3);
    }

    #[test]
    fn fitment_check() {
        let setup = Setup::new();
        let ctx = setup.ctx();

        assert!(check_vehicle_fitments(
            "rv st",
            &["lf gun".to_owned()],
            &ctx
        ));
        assert!(!check_vehicle_fitments(
            "rv st",
            &["raw a".to_owned()],
            &ctx
        ), "non-fitment items are rejected");
        assert!(!check_vehicle_fitments(
            "bogus",
            &["lf gun".to_owned()],
            &ctx
        ));

        // Budget on "rv st" is 10 space: five guns at two each fit, six
        // do not.
        let five = vec!["lf gun".to_owned(); 5];
        let six = vec!["lf gun".to_owned(); 6];
        assert!(check_vehicle_fitments("rv st", &five, &ctx));
        assert!(!check_vehicle_fitments("rv st", &six, &ctx));
    }
}
