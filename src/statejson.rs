//! Read-only JSON projection of the game state for external consumers.
//!
//! The projection is idempotent and never mutates the store.  Regions can
//! be restricted to those modified at or after a given height, for
//! incremental dissemination.

use serde_json::{json, Map, Value};

use crate::context::Context;
use crate::db::accounts::AccountsTable;
use crate::db::buildings::{Building, BuildingsTable};
use crate::db::characters::{Character, CharacterTable};
use crate::db::counts::{ItemCounts, MoneySupply};
use crate::db::damage_lists::DamageLists;
use crate::db::dex::DexOrderTable;
use crate::db::inventories::{BuildingInventoriesTable, GroundLootTable};
use crate::db::ongoings::OngoingsTable;
use crate::db::records::{Inventory, OngoingPayload, TargetId, TargetKind};
use crate::db::regions::RegionsTable;
use crate::db::Database;

pub struct GameStateJson<'a, 'c> {
    db: &'a Database,
    ctx: &'c Context<'c>,
}

fn inventory_json(inv: &Inventory) -> Value {
    let mut fungible = Map::new();
    for (item, count) in &inv.fungible {
        fungible.insert(item.clone(), json!(count));
    }
    json!({ "fungible": fungible })
}

fn target_json(target: &TargetId) -> Value {
    let kind = match target.kind {
        TargetKind::Character => "character",
        TargetKind::Building => "building",
    };
    json!({ "type": kind, "id": target.id })
}

impl<'a, 'c> GameStateJson<'a, 'c> {
    pub fn new(db: &'a Database, ctx: &'c Context<'c>) -> Self {
        Self { db, ctx }
    }

    fn account_json(&self, name: &str) -> Value {
        let accounts = AccountsTable::new(self.db);
        let a = accounts.get_by_name(name).unwrap();
        json!({
            "name": a.name(),
            "faction": a.faction().to_move_str(),
            "balance": a.balance(),
            "fame": a.fame(),
            "kills": a.kills(),
            "minted": a.data().burnsale_balance,
        })
    }

    fn character_json(&self, c: &Character<'_>) -> Value {
        let data = c.data();
        let mut res = Map::new();
        res.insert("id".into(), json!(c.id()));
        res.insert("owner".into(), json!(c.owner()));
        res.insert("faction".into(), json!(c.faction().to_move_str()));
        res.insert("vehicle".into(), json!(data.vehicle));
        res.insert("fitments".into(), json!(data.fitments));

        if c.is_in_building() {
            res.insert("inbuilding".into(), json!(c.building_id()));
        } else {
            let pos = c.position();
            res.insert("position".into(), json!({ "x": pos.x, "y": pos.y }));
        }

        if let Some(movement) = &data.movement {
            let wp: Vec<Value> = movement
                .waypoints
                .iter()
                .map(|w| json!({ "x": w.x, "y": w.y }))
                .collect();
            res.insert(
                "movement".into(),
                json!({
                    "waypoints": wp,
                    "chosenspeed": movement.chosen_speed,
                    "blockedturns": c.volatile_mv().blocked_turns,
                }),
            );
        }

        if let Some(mining) = &data.mining {
            res.insert(
                "mining".into(),
                json!({
                    "active": mining.active,
                    "rate": { "min": mining.rate.min, "max": mining.rate.max },
                }),
            );
        }

        let hp = c.hp();
        let regen = c.regen_data();
        let mut combat = Map::new();
        combat.insert(
            "hp".into(),
            json!({
                "armour": hp.armour,
                "shield": hp.shield,
                "maxarmour": regen.max_hp.armour,
                "maxshield": regen.max_hp.shield,
            }),
        );
        if let Some(target) = &data.target {
            combat.insert("target".into(), target_json(target));
        }
        let dl = DamageLists::new(self.db, self.ctx.height());
        let attackers: Vec<i64> = dl.get_attackers(c.id()).into_iter().collect();
        if !attackers.is_empty() {
            combat.insert("attackers".into(), json!(attackers));
        }
        res.insert("combat".into(), Value::Object(combat));

        res.insert("inventory".into(), inventory_json(&c.inventory()));
        res.insert("cargospace".into(), json!({
            "total": data.cargo_space,
            "used": c.used_cargo_space(),
            "free": c.free_cargo_space(),
        }));

        if let Some(op) = data.ongoing {
            res.insert("ongoing".into(), json!(op));
        }

        Value::Object(res)
    }

    fn building_json(&self, b: &Building<'_>) -> Value {
        let data = b.data();
        let centre = b.centre();
        let tiles: Vec<Value> = b
            .shape()
            .iter()
            .map(|t| json!({ "x": t.x, "y": t.y }))
            .collect();

        let hp = b.hp();
        let regen = b.regen_data();

        let mut res = Map::new();
        res.insert("id".into(), json!(b.id()));
        res.insert("type".into(), json!(b.building_type()));
        res.insert("faction".into(), json!(b.faction().to_move_str()));
        if b.faction() != crate::db::records::Faction::Ancient {
            res.insert("owner".into(), json!(b.owner()));
        }
        res.insert("centre".into(), json!({ "x": centre.x, "y": centre.y }));
        res.insert("rotation".into(), json!(data.shape_rotation));
        res.insert("tiles".into(), json!(tiles));
        res.insert("foundation".into(), json!(data.foundation));
        res.insert(
            "config".into(),
            json!({
                "servicefee": data.config.service_fee_percent,
                "dexfee": data.config.dex_fee_bps,
            }),
        );
        res.insert(
            "combat".into(),
            json!({
                "hp": {
                    "armour": hp.armour,
                    "shield": hp.shield,
                    "maxarmour": regen.max_hp.armour,
                    "maxshield": regen.max_hp.shield,
                },
            }),
        );
        if data.foundation {
            res.insert(
                "constructioninventory".into(),
                inventory_json(&data.construction_inventory),
            );
        }

        Value::Object(res)
    }

    fn ongoing_json(&self, id: i64) -> Value {
        let ongoings = OngoingsTable::new(self.db);
        let op = ongoings.get_by_id(id).unwrap();
        let operation = match &*op.payload() {
            OngoingPayload::Prospection => json!({ "op": "prospection" }),
            OngoingPayload::ArmourRepair => json!({ "op": "armourrepair" }),
            OngoingPayload::BlueprintCopy {
                account,
                original_type,
                num_copies,
                ..
            } => json!({
                "op": "blueprintcopy",
                "account": account,
                "original": original_type,
                "copies": num_copies,
            }),
            OngoingPayload::ItemConstruction {
                account,
                output_type,
                num_items,
                ..
            } => json!({
                "op": "construction",
                "account": account,
                "output": output_type,
                "num": num_items,
            }),
            OngoingPayload::BuildingConstruction => json!({ "op": "buildingconstruction" }),
            OngoingPayload::BuildingUpdate { .. } => json!({ "op": "buildingupdate" }),
        };

        let mut res = Map::new();
        res.insert("id".into(), json!(op.id()));
        res.insert("height".into(), json!(op.height()));
        if let Some(c) = op.character_id() {
            res.insert("character".into(), json!(c));
        }
        if let Some(b) = op.building_id() {
            res.insert("building".into(), json!(b));
        }
        res.insert("operation".into(), operation);
        Value::Object(res)
    }

    /// Regions modified at or after the given height.
    pub fn regions(&self, since_height: u64) -> Value {
        let regions = RegionsTable::new(self.db, self.ctx.height());
        let mut res = Vec::new();
        for id in regions.query_modified_since(since_height) {
            let r = regions.get_by_id(id);
            let data = r.data();
            let mut obj = Map::new();
            obj.insert("id".into(), json!(id));
            obj.insert("resourceleft".into(), json!(r.resource_left()));
            if let Some(c) = data.prospecting_character {
                obj.insert("prospectingcharacter".into(), json!(c));
            }
            if let Some(p) = &data.prospection {
                obj.insert(
                    "prospection".into(),
                    json!({
                        "name": p.name,
                        "height": p.height,
                        "resource": p.resource,
                    }),
                );
            }
            res.push(Value::Object(obj));
        }
        json!(res)
    }

    /// The full public state.
    pub fn full_state(&self) -> Value {
        let accounts = AccountsTable::new(self.db);
        let account_values: Vec<Value> = accounts
            .query_initialised()
            .iter()
            .map(|name| self.account_json(name))
            .collect();

        let characters = CharacterTable::new(self.db);
        let character_values: Vec<Value> = characters
            .query_all()
            .into_iter()
            .map(|id| self.character_json(&characters.get_by_id(id).unwrap()))
            .collect();

        let buildings = BuildingsTable::new(self.db);
        let building_values: Vec<Value> = buildings
            .query_all()
            .into_iter()
            .map(|id| self.building_json(&buildings.get_by_id(id).unwrap()))
            .collect();

        let loot = GroundLootTable::new(self.db);
        let loot_values: Vec<Value> = loot
            .query_non_empty()
            .into_iter()
            .map(|pos| {
                let l = loot.get_by_coord(pos);
                json!({
                    "position": { "x": pos.x, "y": pos.y },
                    "inventory": inventory_json(&l.inventory()),
                })
            })
            .collect();

        let inventories = BuildingInventoriesTable::new(self.db);
        let inventory_values: Vec<Value> = inventories
            .query_all()
            .into_iter()
            .map(|(building, account)| {
                let inv = inventories.get(building, &account);
                json!({
                    "building": building,
                    "account": account,
                    "inventory": inventory_json(&inv.inventory()),
                })
            })
            .collect();

        let ongoings = OngoingsTable::new(self.db);
        let ongoing_values: Vec<Value> = ongoings
            .query_all()
            .into_iter()
            .map(|id| self.ongoing_json(id))
            .collect();

        let orders = DexOrderTable::new(self.db);
        let order_values: Vec<Value> = orders
            .query_all()
            .into_iter()
            .map(|id| {
                let o = orders.get_by_id(id).unwrap();
                let side = match o.order_type() {
                    crate::db::dex::OrderType::Bid => "bid",
                    crate::db::dex::OrderType::Ask => "ask",
                };
                json!({
                    "id": o.id(),
                    "building": o.building(),
                    "account": o.account(),
                    "side": side,
                    "item": o.item(),
                    "quantity": o.quantity(),
                    "price": o.price(),
                })
            })
            .collect();

        let counts = ItemCounts::new(self.db);
        let mut prizes = Map::new();
        for (name, found) in counts.query_all() {
            prizes.insert(name, json!(found));
        }

        let supply = MoneySupply::new(self.db);
        let mut money = Map::new();
        for (name, amount) in supply.query_all() {
            money.insert(name, json!(amount));
        }

        json!({
            "accounts": account_values,
            "characters": character_values,
            "buildings": building_values,
            "groundloot": loot_values,
            "buildinginventories": inventory_values,
            "ongoings": ongoing_values,
            "orders": order_values,
            "regions": self.regions(0),
            "prizes": prizes,
            "moneysupply": money,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};
    use crate::db::records::Faction;
    use crate::hex::HexCoord;
    use crate::map::BaseMap;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    #[test]
    fn state_projection_is_idempotent() {
        let db = test_db();
        {
            let accounts = AccountsTable::new(&db);
            let mut a = accounts.create_new("domob");
            a.set_faction(Faction::Red);
            a.add_balance(42);
        }
        {
            let characters = CharacterTable::new(&db);
            let mut c = characters.create_new("domob", Faction::Red);
            c.set_position(HexCoord::new(3, -2));
            c.mutate_data().vehicle = "rv st".to_owned();
        }

        let params = Params::for_chain(Chain::Regtest);
        let map = BaseMap::new();
        let ctx = Context::new(Chain::Regtest, &params, &map, 10, 0);
        let gsj = GameStateJson::new(&db, &ctx);

        let first = gsj.full_state();
        let second = gsj.full_state();
        assert_eq!(first, second);

        assert_eq!(first["accounts"][0]["name"], "domob");
        assert_eq!(first["accounts"][0]["balance"], 42);
        assert_eq!(first["characters"][0]["owner"], "domob");
        assert_eq!(first["characters"][0]["position"]["x"], 3);
    }

    #[test]
    fn uninitialised_accounts_are_hidden() {
        let db = test_db();
        {
            let accounts = AccountsTable::new(&db);
            accounts.create_new("fresh");
        }
        let params = Params::for_chain(Chain::Regtest);
        let map = BaseMap::new();
        let ctx = Context::new(Chain::Regtest, &params, &map, 10, 0);
        let state = GameStateJson::new(&db, &ctx).full_state();
        assert_eq!(state["accounts"].as_array().unwrap().len(), 0);
    }
}
