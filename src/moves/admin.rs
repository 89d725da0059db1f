//! God-mode admin commands.
//!
//! Honoured only on chains with `god_mode` set (regtest).  Validation is
//! intentionally lax: teleports onto obstacles or HP above the configured
//! maxima are allowed, which keeps test setup simple.

use serde_json::Value;
use tracing::{info, warn};

use super::json::{coin_amount_from_json, id_from_json};
use crate::context::Context;
use crate::db::accounts::AccountsTable;
use crate::db::buildings::BuildingsTable;
use crate::db::characters::CharacterTable;
use crate::db::counts::MoneySupply;
use crate::db::inventories::{BuildingInventoriesTable, GroundLootTable};
use crate::db::records::Faction;
use crate::db::Database;
use crate::hex::HexCoord;
use crate::movement::stop_character;

fn coord_from_json(val: &Value) -> Option<HexCoord> {
    let obj = val.as_object()?;
    if obj.len() != 2 {
        return None;
    }
    let x = obj.get("x")?.as_i64()?;
    let y = obj.get("y")?.as_i64()?;
    Some(HexCoord::new(
        i32::try_from(x).ok()?,
        i32::try_from(y).ok()?,
    ))
}

fn maybe_god_teleport(db: &Database, cmd: &Value) {
    let arr = match cmd.as_array() {
        Some(a) => a,
        None => return,
    };
    let characters = CharacterTable::new(db);

    for entry in arr {
        let id = match entry.get("id").map(id_from_json) {
            Some(Some(id)) => id,
            _ => {
                warn!(%entry, "invalid teleport entry");
                continue;
            }
        };
        let target = match entry.get("pos").map(coord_from_json) {
            Some(Some(pos)) => pos,
            _ => {
                warn!(%entry, "invalid teleport target");
                continue;
            }
        };

        let mut c = match characters.get_by_id(id) {
            Some(c) => c,
            None => {
                warn!(id, "teleport of unknown character");
                continue;
            }
        };
        info!(id, %target, "teleporting character");
        c.set_position(target);
        stop_character(&mut c);
    }
}

fn set_hp_fields(hp_cmd: &Value, hp: &mut crate::db::records::Hp, max: &mut crate::db::records::HpPair) {
    if let Some(val) = hp_cmd.get("a").and_then(Value::as_u64) {
        hp.armour = val as u32;
    }
    if let Some(val) = hp_cmd.get("s").and_then(Value::as_u64) {
        hp.shield = val as u32;
    }
    if let Some(val) = hp_cmd.get("ma").and_then(Value::as_u64) {
        max.armour = val as u32;
    }
    if let Some(val) = hp_cmd.get("ms").and_then(Value::as_u64) {
        max.shield = val as u32;
    }
}

fn maybe_god_set_hp(db: &Database, cmd: &Value) {
    let obj = match cmd.as_object() {
        Some(o) => o,
        None => return,
    };

    if let Some(arr) = obj.get("b").and_then(Value::as_array) {
        let buildings = BuildingsTable::new(db);
        for entry in arr {
            let id = match entry.get("id").map(id_from_json) {
                Some(Some(id)) => id,
                _ => continue,
            };
            if let Some(mut b) = buildings.get_by_id(id) {
                info!(id, "god-mode HP update for building");
                let mut hp = *b.hp();
                let mut max = b.regen_data().max_hp;
                set_hp_fields(entry, &mut hp, &mut max);
                *b.mutate_hp() = hp;
                b.mutate_regen_data().max_hp = max;
            }
        }
    }

    if let Some(arr) = obj.get("c").and_then(Value::as_array) {
        let characters = CharacterTable::new(db);
        for entry in arr {
            let id = match entry.get("id").map(id_from_json) {
                Some(Some(id)) => id,
                _ => continue,
            };
            if let Some(mut c) = characters.get_by_id(id) {
                info!(id, "god-mode HP update for character");
                let mut hp = *c.hp();
                let mut max = c.regen_data().max_hp;
                set_hp_fields(entry, &mut hp, &mut max);
                *c.mutate_hp() = hp;
                c.mutate_regen_data().max_hp = max;
            }
        }
    }
}

fn maybe_god_build(db: &Database, ctx: &Context<'_>, cmd: &Value) {
    let arr = match cmd.as_array() {
        Some(a) => a,
        None => return,
    };
    let accounts = AccountsTable::new(db);
    let buildings = BuildingsTable::new(db);

    for build in arr {
        let obj = match build.as_object() {
            Some(o) if o.len() == 4 => o,
            _ => {
                warn!(%build, "invalid god-build element");
                continue;
            }
        };

        let building_type = match obj.get("t").and_then(Value::as_str) {
            Some(t) if ctx.roconfig().building_or_null(t).is_some() => t.to_owned(),
            _ => {
                warn!(%build, "invalid god-build type");
                continue;
            }
        };
        let rotation = match obj.get("rot").and_then(Value::as_u64) {
            Some(r) if r <= 5 => r as u32,
            _ => {
                warn!(%build, "invalid god-build rotation");
                continue;
            }
        };
        let centre = match obj.get("c").map(coord_from_json) {
            Some(Some(c)) => c,
            _ => {
                warn!(%build, "invalid god-build centre");
                continue;
            }
        };

        let (owner, faction) = match obj.get("o") {
            Some(Value::Null) => (String::new(), Faction::Ancient),
            Some(Value::String(owner)) => match accounts.get_by_name(owner) {
                Some(a) if a.is_initialised() => (owner.clone(), a.faction()),
                _ => {
                    warn!(%owner, "god-build owner does not exist");
                    continue;
                }
            },
            _ => {
                warn!(%build, "god-build element without owner");
                continue;
            }
        };

        // No placement checks on purpose: tests may build anywhere.
        let mut b = buildings.create_new(&building_type, &owner, faction);
        b.set_centre(centre);
        {
            let data = b.mutate_data();
            data.shape_rotation = rotation;
            data.age_data.founded_height = ctx.height();
            data.age_data.finished_height = Some(ctx.height());
        }
        crate::buildings::update_building_stats(&mut b, ctx);
        let max = b.regen_data().max_hp;
        *b.mutate_hp() = crate::db::records::Hp::from_max(&max);
        info!(id = b.id(), %building_type, %centre, "god-mode building placed");
    }
}

fn maybe_god_drop_loot(db: &Database, ctx: &Context<'_>, cmd: &Value) {
    let arr = match cmd.as_array() {
        Some(a) => a,
        None => return,
    };
    let accounts = AccountsTable::new(db);

    for tile in arr {
        let obj = match tile.as_object() {
            Some(o) if o.len() == 2 => o,
            _ => {
                warn!(%tile, "invalid drop-loot element");
                continue;
            }
        };
        let fungible = match obj.get("fungible").and_then(Value::as_object) {
            Some(f) => f,
            None => {
                warn!(%tile, "drop-loot element without fungible member");
                continue;
            }
        };

        let mut quantities = Vec::new();
        let mut valid = true;
        for (item, val) in fungible {
            if ctx.roconfig().item_or_null(item).is_none() {
                warn!(%item, "invalid item in god drop");
                valid = false;
                break;
            }
            match super::json::quantity_from_json(val) {
                Some(q) => quantities.push((item.clone(), q)),
                None => {
                    warn!(%item, "invalid quantity in god drop");
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }

        if let Some(Some(pos)) = obj.get("pos").map(coord_from_json) {
            let loot = GroundLootTable::new(db);
            let mut ground = loot.get_by_coord(pos);
            for (item, q) in &quantities {
                info!(%item, q, %pos, "god-mode loot drop");
                ground.mutate_inventory().add(item, *q);
            }
            continue;
        }

        if let Some(target) = obj.get("building").and_then(Value::as_object) {
            let building = match target.get("id").map(id_from_json) {
                Some(Some(id)) if target.len() == 2 => id,
                _ => {
                    warn!(%tile, "invalid building target in god drop");
                    continue;
                }
            };
            let account = match target.get("a").and_then(Value::as_str) {
                Some(a) => a.to_owned(),
                None => {
                    warn!(%tile, "missing account in god drop");
                    continue;
                }
            };

            if accounts.get_by_name(&account).is_none() {
                let _ = accounts.create_new(&account);
            }

            let inventories = BuildingInventoriesTable::new(db);
            let mut inv = inventories.get(building, &account);
            for (item, q) in &quantities {
                info!(%item, q, building, %account, "god-mode inventory drop");
                inv.mutate_inventory().add(item, *q);
            }
            continue;
        }

        warn!(%tile, "drop-loot element without target");
    }
}

fn maybe_god_gift_coins(db: &Database, cmd: &Value) {
    let obj = match cmd.as_object() {
        Some(o) => o,
        None => return,
    };
    let accounts = AccountsTable::new(db);
    let supply = MoneySupply::new(db);

    for (name, val) in obj {
        let amount = match coin_amount_from_json(val) {
            Some(a) => a,
            None => {
                warn!(%name, %val, "invalid god-mode coin gift");
                continue;
            }
        };
        info!(%name, amount, "gifting coins");
        let mut a = accounts.get_or_create(name);
        a.add_balance(amount);
        supply.increment("gifted", amount);
    }
}

/// Entry point for one god-mode command object.
pub fn handle_god_mode(db: &Database, ctx: &Context<'_>, cmd: &Value) {
    if !cmd.is_object() {
        return;
    }
    if !ctx.params().god_mode {
        warn!("god mode command ignored on this chain");
        return;
    }

    maybe_god_teleport(db, cmd.get("teleport").unwrap_or(&Value::Null));
    maybe_god_set_hp(db, cmd.get("sethp").unwrap_or(&Value::Null));
    maybe_god_build(db, ctx, cmd.get("build").unwrap_or(&Value::Null));
    maybe_god_drop_loot(db, ctx, cmd.get("drop").unwrap_or(&Value::Null));
    maybe_god_gift_coins(db, cmd.get("giftcoins").unwrap_or(&Value::Null));
}
