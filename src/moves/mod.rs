//! Per-block move parsing and dispatch.
//!
//! Validation is strict silent rejection: a malformed or unauthorised
//! sub-command is logged at WARN (with the offending JSON) and dropped,
//! while the rest of the same move still executes.  The ordering of
//! sub-commands within a move is fixed and consensus-relevant.

pub mod admin;
pub mod json;

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::amounts::{Amount, ChiAmount, QuantityProduct};
use crate::buildings::{
    can_place_building, leave_building, maybe_start_building_construction, update_building_stats,
};
use crate::burnsale::compute_burnsale_amount;
use crate::context::Context;
use crate::db::accounts::{Account, AccountsTable};
use crate::db::buildings::{Building, BuildingsTable};
use crate::db::characters::{Character, CharacterTable};
use crate::db::counts::MoneySupply;
use crate::db::inventories::{BuildingInventoriesTable, GroundLootTable};
use crate::db::ongoings::OngoingsTable;
use crate::db::records::{BuildingConfig, Faction, Hp, Inventory, Movement, OngoingPayload};
use crate::db::Database;
use crate::dynobstacles::DynObstacles;
use crate::fitments::{check_vehicle_fitments, derive_character_stats};
use crate::forks::Fork;
use crate::market::DexProcessor;
use crate::mining::stop_mining;
use crate::movement::{stop_character, MAX_CHOSEN_SPEED};
use crate::prospecting::can_prospect_region;
use crate::rng::BlockRng;
use crate::services::ServiceProcessor;
use crate::spawn::spawn_character;
use crate::waypoints::decode_waypoints;
use json::{chi_amount_from_json, coin_amount_from_json, id_from_json, quantity_from_json};

/// Maximum owner-configurable service fee, in percent.
const MAX_SERVICE_FEE_PERCENT: u64 = 1_000;

/// Maximum owner-configurable DEX fee, in basis points.
const MAX_DEX_FEE_BPS: u64 = 3_000;

/// vCHI airdrop for each newly created character.
fn vchi_airdrop(ctx: &Context<'_>) -> Amount {
    ctx.params().vchi_airdrop
}

/// A parsed coin (vc) operation.
#[derive(Default)]
struct CoinTransferBurn {
    minted: Amount,
    burnt: Amount,
    transfers: BTreeMap<String, Amount>,
}

pub struct MoveProcessor<'a, 'c> {
    db: &'a Database,
    dyn_obstacles: &'c mut DynObstacles,
    rng: &'c mut BlockRng,
    ctx: &'c Context<'c>,
}

impl<'a, 'c> MoveProcessor<'a, 'c> {
    pub fn new(
        db: &'a Database,
        dyn_obstacles: &'c mut DynObstacles,
        rng: &'c mut BlockRng,
        ctx: &'c Context<'c>,
    ) -> Self {
        Self {
            db,
            dyn_obstacles,
            rng,
            ctx,
        }
    }

    fn accounts(&self) -> AccountsTable<'a> {
        AccountsTable::new(self.db)
    }

    fn characters(&self) -> CharacterTable<'a> {
        CharacterTable::new(self.db)
    }

    fn buildings(&self) -> BuildingsTable<'a> {
        BuildingsTable::new(self.db)
    }

    /// Processes the block's full move array, in input order.
    pub fn process_all(&mut self, moves: &Value) {
        let arr = moves.as_array().expect("moves must be an array");
        info!(count = arr.len(), "processing moves");
        for m in arr {
            self.process_one(m);
        }
    }

    /// Processes the admin command array.  Only god-mode commands exist,
    /// and they are honoured only on chains with god mode enabled.
    pub fn process_admin(&mut self, admin: &Value) {
        let arr = admin.as_array().expect("admin must be an array");
        for cmd in arr {
            let cmd = cmd.get("cmd").cloned().unwrap_or(Value::Null);
            if !cmd.is_object() {
                continue;
            }
            admin::handle_god_mode(self.db, self.ctx, cmd.get("god").unwrap_or(&Value::Null));
        }
    }

    fn extract_move_basics(
        &self,
        move_obj: &Value,
    ) -> Option<(String, Value, ChiAmount, ChiAmount)> {
        let mv = move_obj.get("move").cloned().unwrap_or(Value::Null);
        if !mv.is_object() {
            warn!(%move_obj, "move is not an object");
            return None;
        }

        let name = move_obj
            .get("name")
            .and_then(Value::as_str)
            .expect("block move without name")
            .to_owned();

        let mut paid_to_dev = 0;
        let mut burnt = 0;
        if let Some(out) = move_obj.get("out").and_then(Value::as_object) {
            if let Some(val) = out.get(self.ctx.params().dev_addr) {
                paid_to_dev = chi_amount_from_json(val).expect("invalid dev-payment amount");
            }
            if let Some(val) = out.get(self.ctx.params().burn_addr) {
                burnt = chi_amount_from_json(val).expect("invalid burn amount");
            }
        }

        Some((name, mv, paid_to_dev, burnt))
    }

    fn process_one(&mut self, move_obj: &Value) {
        let (name, mv, mut paid_to_dev, mut burnt_chi) = match self.extract_move_basics(move_obj) {
            Some(parts) => parts,
            None => return,
        };

        // Everyone who ever sent a move has an (at least uninitialised)
        // account row.
        if self.accounts().get_by_name(&name).is_none() {
            debug!(%name, "creating uninitialised account");
            let _ = self.accounts().create_new(&name);
        }

        // Coin transfers run before all game operations and are valid even
        // for uninitialised accounts; vCHI works as a currency on its own.
        self.try_coin_operation(&name, &mv, &mut burnt_chi);

        // Before the game world exists, nothing else processes.
        if !self.ctx.fork_active(Fork::GameStart) {
            return;
        }

        // DEX operations are independent of account initialisation.
        self.try_dex_operations(&name, &mv);

        // Account updates come first so that choosing a faction and acting
        // on it can happen within a single move.
        self.try_account_update(&name, mv.get("a").unwrap_or(&Value::Null));

        if !self.accounts().get_by_name(&name).unwrap().is_initialised() {
            debug!(%name, "account not initialised, skipping rest of move");
            return;
        }

        // Updates before creations: a newly created character can never be
        // updated in the same move (its ID would have to be predicted).
        self.try_character_updates(&name, &mv);
        self.try_character_creation(&name, &mv, &mut paid_to_dev);

        self.try_building_updates(&name, &mv);
        self.try_service_operations(&name, &mv);

        if paid_to_dev > 0 || burnt_chi > 0 {
            warn!(%name, paid_to_dev, burnt_chi, "unspent CHI left at end of move");
        }
    }

    /* ******************************************************************** */

    fn parse_coin_transfer_burn(
        &self,
        a: &Account<'_>,
        mv: &Value,
        burnt_chi: &mut ChiAmount,
    ) -> Option<CoinTransferBurn> {
        let cmd = match mv.get("vc").and_then(Value::as_object) {
            Some(c) => c,
            None => return None,
        };

        let mut op = CoinTransferBurn::default();
        let mut balance = a.balance();
        let mut total: Amount = 0;

        match cmd.get("m") {
            Some(mint) if mint.as_object().map(|o| o.is_empty()).unwrap_or(false) => {
                let sold_before = MoneySupply::new(self.db).get("burnsale");
                op.minted = compute_burnsale_amount(burnt_chi, sold_before, self.ctx);
                balance += op.minted;
            }
            Some(mint) if !mint.is_null() => {
                warn!(%mint, "invalid mint command");
            }
            _ => (),
        }

        if let Some(burn) = cmd.get("b") {
            match coin_amount_from_json(burn) {
                Some(amount) if total + amount <= balance => {
                    op.burnt = amount;
                    total += amount;
                }
                Some(amount) => {
                    warn!(
                        name = a.name(),
                        amount, balance, "cannot burn more than the balance"
                    );
                }
                None => warn!(%burn, "invalid burn amount"),
            }
        }

        if let Some(transfers) = cmd.get("t").and_then(Value::as_object) {
            for (to, val) in transfers {
                let amount = match coin_amount_from_json(val) {
                    Some(x) => x,
                    None => {
                        warn!(from = a.name(), %to, %val, "invalid coin transfer");
                        continue;
                    }
                };
                if total + amount > balance {
                    warn!(from = a.name(), %to, amount, "transfer exceeds balance");
                    continue;
                }
                // Self transfers are ignored and do not consume balance.
                if to == a.name() {
                    continue;
                }
                total += amount;
                let prev = op.transfers.insert(to.clone(), amount);
                assert!(prev.is_none(), "duplicate transfer recipient {to}");
            }
        }

        assert!(total <= balance);
        if total > 0 || op.minted > 0 {
            Some(op)
        } else {
            None
        }
    }

    fn try_coin_operation(&mut self, name: &str, mv: &Value, burnt_chi: &mut ChiAmount) {
        let accounts = self.accounts();
        let mut a = accounts.get_by_name(name).unwrap();

        let op = match self.parse_coin_transfer_burn(&a, mv, burnt_chi) {
            Some(op) => op,
            None => return,
        };

        if op.minted > 0 {
            info!(name, minted = op.minted, "burnsale mint");
            a.add_balance(op.minted);
            a.mutate_data().burnsale_balance += op.minted;
            MoneySupply::new(self.db).increment("burnsale", op.minted);
        }

        if op.burnt > 0 {
            info!(name, burnt = op.burnt, "burning coins");
            a.add_balance(-op.burnt);
        }

        for (to, amount) in &op.transfers {
            debug!(name, %to, amount, "coin transfer");
            a.add_balance(-amount);
            let mut recipient = accounts.get_or_create(to);
            recipient.add_balance(*amount);
        }
    }

    /* ******************************************************************** */

    fn try_dex_operations(&mut self, name: &str, mv: &Value) {
        let cmds = match mv.get("x").and_then(Value::as_array) {
            Some(c) => c,
            None => return,
        };
        let proc = DexProcessor::new(self.db, self.ctx);
        for op in cmds {
            let accounts = self.accounts();
            let mut a = accounts.get_by_name(name).unwrap();
            proc.process(&mut a, op);
        }
    }

    fn try_service_operations(&mut self, name: &str, mv: &Value) {
        let cmds = match mv.get("s").and_then(Value::as_array) {
            Some(c) => c,
            None => return,
        };
        let proc = ServiceProcessor::new(self.db, self.ctx);
        for op in cmds {
            let accounts = self.accounts();
            let mut a = accounts.get_by_name(name).unwrap();
            proc.process(&mut a, op);
        }
    }

    /* ******************************************************************** */

    fn try_account_update(&mut self, name: &str, upd: &Value) {
        if !upd.is_object() {
            return;
        }
        let init = upd.get("init").unwrap_or(&Value::Null);
        if !init.is_object() {
            return;
        }

        let accounts = self.accounts();
        let mut a = accounts.get_by_name(name).unwrap();
        if a.is_initialised() {
            warn!(name, "account is already initialised");
            return;
        }

        let faction = match init.get("faction").and_then(Value::as_str) {
            Some(f) => Faction::from_move_str(f),
            None => {
                warn!(name, %init, "account initialisation without faction");
                return;
            }
        };
        if !faction.is_player() {
            warn!(name, %init, "invalid faction for account");
            return;
        }
        if init.as_object().unwrap().len() != 1 {
            warn!(name, %init, "account initialisation with extra fields");
            return;
        }

        a.set_faction(faction);
        info!(name, faction = faction.to_move_str(), "account initialised");
    }

    /* ******************************************************************** */

    fn try_character_creation(&mut self, name: &str, mv: &Value, paid_to_dev: &mut ChiAmount) {
        let cmd = match mv.get("nc").and_then(Value::as_array) {
            Some(c) => c,
            None => return,
        };

        let faction = {
            let accounts = self.accounts();
            let a = accounts.get_by_name(name).unwrap();
            assert!(a.is_initialised());
            a.faction()
        };

        for cur in cmd {
            match cur.as_object() {
                Some(o) if o.is_empty() => (),
                _ => {
                    warn!(%cur, "invalid character creation entry");
                    continue;
                }
            }

            let cost = self.ctx.params().character_cost;
            if *paid_to_dev < cost {
                warn!(name, paid = *paid_to_dev, cost, "character not paid for");
                return;
            }

            if self.characters().count_for_owner(name) >= self.ctx.params().character_limit {
                warn!(name, "character limit reached");
                return;
            }

            {
                let characters = self.characters();
                let _c = spawn_character(name, faction, &characters, self.ctx);
            }
            {
                let accounts = self.accounts();
                let mut a = accounts.get_by_name(name).unwrap();
                a.add_balance(vchi_airdrop(self.ctx));
            }
            *paid_to_dev -= cost;
        }
    }

    fn try_character_updates(&mut self, name: &str, mv: &Value) {
        let cmd = mv.get("c").cloned().unwrap_or(Value::Null);
        let ops: Vec<Value> = if let Some(arr) = cmd.as_array() {
            arr.clone()
        } else if cmd.is_object() {
            vec![cmd]
        } else {
            return;
        };

        for op in &ops {
            if !op.is_object() {
                warn!(%op, "character update entry is not an object");
                continue;
            }

            let id_or_ids = op.get("id").cloned().unwrap_or(Value::Null);
            let ids: Vec<Value> = if id_or_ids.is_null() {
                warn!(%op, "missing ID in character update");
                continue;
            } else if let Some(arr) = id_or_ids.as_array() {
                arr.clone()
            } else {
                vec![id_or_ids]
            };

            for id_val in &ids {
                let id = match id_from_json(id_val) {
                    Some(id) => id,
                    None => {
                        warn!(%id_val, "invalid character ID");
                        continue;
                    }
                };

                let characters = self.characters();
                let mut c = match characters.get_by_id(id) {
                    Some(c) => c,
                    None => {
                        warn!(id, "character does not exist");
                        continue;
                    }
                };
                if c.owner() != name {
                    warn!(id, name, owner = c.owner(), "character owned by someone else");
                    continue;
                }

                self.perform_character_update(&mut c, op);
            }
        }
    }

    /// Applies one update object to one character.  The sub-command order
    /// here is consensus-relevant and documented inline.
    fn perform_character_update(&mut self, c: &mut Character<'a>, upd: &Value) {
        self.maybe_transfer_character(c, upd);
        self.maybe_start_prospecting(c, upd);

        // Vehicle before fitments, so a new vehicle can be fitted in the
        // same move; both before pickups/drops so a cargo fitment counts
        // right away.
        self.maybe_change_vehicle(c, upd);
        self.maybe_set_fitments(c, upd);

        // Mining before waypoints: a move doing both must not end up
        // moving and mining at the same time.
        self.maybe_start_mining(c, upd);

        // Speed after waypoints, because it is only valid while moving.
        self.maybe_set_waypoints(c, upd);
        self.maybe_extend_waypoints(c, upd);
        self.maybe_set_speed(c, upd);

        // Founding a building puts the character inside the foundation; it
        // may drop construction materials right after.
        self.maybe_found_building(c, upd);

        // Drop before pickup, so cargo can be freed first.
        self.maybe_drop_loot(c, upd.get("drop").unwrap_or(&Value::Null));
        self.maybe_pickup_loot(c, upd.get("pu").unwrap_or(&Value::Null));

        // Enter before exit: sending both is equivalent to just entering.
        self.maybe_enter_building(c, upd);
        self.maybe_exit_building(c, upd);
    }

    fn maybe_transfer_character(&mut self, c: &mut Character<'_>, upd: &Value) {
        let send_to = match upd.get("send").and_then(Value::as_str) {
            Some(s) => s,
            None => return,
        };

        if self.characters().count_for_owner(send_to) >= self.ctx.params().character_limit {
            warn!(id = c.id(), send_to, "recipient is at the character limit");
            return;
        }

        let accounts = self.accounts();
        match accounts.get_by_name(send_to) {
            Some(a) if a.is_initialised() => {
                if a.faction() != c.faction() {
                    warn!(id = c.id(), send_to, "recipient has a different faction");
                    return;
                }
            }
            _ => {
                warn!(id = c.id(), send_to, "recipient account is not initialised");
                return;
            }
        }

        debug!(id = c.id(), from = c.owner(), to = send_to, "transferring character");
        c.set_owner(send_to);
    }

    fn maybe_start_prospecting(&mut self, c: &mut Character<'_>, upd: &Value) {
        let cmd = match upd.get("prospect") {
            Some(v) => v,
            None => return,
        };
        match cmd.as_object() {
            Some(o) if o.is_empty() => (),
            _ => {
                warn!(id = c.id(), %cmd, "invalid prospecting command");
                return;
            }
        }

        let blocks = match c.data().prospecting_blocks {
            Some(b) => {
                assert!(b > 0);
                b
            }
            None => {
                warn!(id = c.id(), "character cannot prospect");
                return;
            }
        };
        if c.is_busy() {
            warn!(id = c.id(), "busy character cannot prospect");
            return;
        }
        if c.is_in_building() {
            warn!(id = c.id(), "character in building cannot prospect");
            return;
        }

        let region_id = self.ctx.map().region_id(&c.position());
        let regions = crate::db::regions::RegionsTable::new(self.db, self.ctx.height());
        {
            let r = regions.get_by_id(region_id);
            if !can_prospect_region(c, &r, self.ctx) {
                return;
            }
        }

        info!(id = c.id(), region_id, "starting prospection");
        {
            let mut r = regions.get_by_id(region_id);
            let data = r.mutate_data();
            data.prospecting_character = Some(c.id());
            // Re-prospecting clears the previous result.
            data.prospection = None;
        }

        stop_character(c);
        stop_mining(c);

        let ongoings = OngoingsTable::new(self.db);
        let mut op = ongoings.create_new(self.ctx.height() + u64::from(blocks));
        op.set_character_id(c.id());
        op.set_payload(OngoingPayload::Prospection);
        c.mutate_data().ongoing = Some(op.id());
    }

    fn maybe_start_mining(&mut self, c: &mut Character<'_>, upd: &Value) {
        let cmd = match upd.get("mine") {
            Some(v) => v,
            None => return,
        };
        match cmd.as_object() {
            Some(o) if o.is_empty() => (),
            _ => {
                warn!(id = c.id(), %cmd, "invalid mining command");
                return;
            }
        }

        if c.data().mining.is_none() {
            warn!(id = c.id(), "character cannot mine");
            return;
        }
        if c.is_busy() || c.is_in_building() {
            warn!(id = c.id(), "character cannot mine right now");
            return;
        }
        if c.data().movement.is_some() {
            warn!(id = c.id(), "cannot mine while moving");
            return;
        }

        let region_id = self.ctx.map().region_id(&c.position());
        let regions = crate::db::regions::RegionsTable::new(self.db, self.ctx.height());
        let r = regions.get_by_id(region_id);
        if r.data().prospection.is_none() {
            warn!(id = c.id(), region_id, "region is not prospected");
            return;
        }
        if r.resource_left() == 0 {
            warn!(id = c.id(), region_id, "region has no resources left");
            return;
        }

        debug!(id = c.id(), region_id, "mining activated");
        c.mutate_data().mining.as_mut().unwrap().active = true;
    }

    fn maybe_set_waypoints(&mut self, c: &mut Character<'_>, upd: &Value) {
        let wp_val = match upd.get("wp") {
            Some(v) => v,
            None => return,
        };

        // Explicit null stops the movement.
        let wp = if wp_val.is_null() {
            Vec::new()
        } else {
            let encoded = match wp_val.as_str() {
                Some(s) => s,
                None => {
                    warn!(id = c.id(), %wp_val, "expected encoded waypoint string");
                    return;
                }
            };
            if c.is_busy() {
                warn!(id = c.id(), "busy character cannot set waypoints");
                return;
            }
            if c.is_in_building() {
                warn!(id = c.id(), "character in building cannot set waypoints");
                return;
            }
            match decode_waypoints(encoded) {
                Some(wp) => wp,
                None => {
                    warn!(id = c.id(), "invalid waypoint encoding");
                    return;
                }
            }
        };

        stop_character(c);
        stop_mining(c);

        if wp.is_empty() {
            return;
        }

        if c.data().speed == 0 {
            warn!(id = c.id(), "ignoring waypoints for zero-speed character");
            return;
        }

        c.mutate_data().movement = Some(Movement {
            waypoints: wp,
            chosen_speed: None,
        });
    }

    fn maybe_extend_waypoints(&mut self, c: &mut Character<'_>, upd: &Value) {
        let encoded = match upd.get("wpx").and_then(Value::as_str) {
            Some(s) => s,
            None => return,
        };

        // Extension is only valid while the character is actually moving;
        // that keeps invariants like "not moving while mining" intact
        // without re-checking them here.
        if c.data()
            .movement
            .as_ref()
            .map(|m| m.waypoints.is_empty())
            .unwrap_or(true)
        {
            warn!(id = c.id(), "cannot extend waypoints while not moving");
            return;
        }

        let wp = match decode_waypoints(encoded) {
            Some(wp) => wp,
            None => {
                warn!(id = c.id(), "invalid waypoint extension encoding");
                return;
            }
        };

        c.mutate_data()
            .movement
            .as_mut()
            .unwrap()
            .waypoints
            .extend(wp);
    }

    fn maybe_set_speed(&mut self, c: &mut Character<'_>, upd: &Value) {
        let val = match upd.get("speed") {
            Some(v) => v,
            None => return,
        };
        let speed = match val.as_u64() {
            Some(s) => s,
            None => return,
        };

        if c.data().movement.is_none() {
            warn!(id = c.id(), "cannot set speed while not moving");
            return;
        }
        if speed == 0 || speed > MAX_CHOSEN_SPEED {
            warn!(id = c.id(), speed, "invalid chosen speed");
            return;
        }

        c.mutate_data().movement.as_mut().unwrap().chosen_speed = Some(speed);
    }

    fn has_full_hp(c: &Character<'_>) -> bool {
        let hp = *c.hp();
        let max = c.regen_data().max_hp;
        hp.armour >= max.armour && hp.shield >= max.shield
    }

    fn maybe_change_vehicle(&mut self, c: &mut Character<'_>, upd: &Value) {
        let vehicle = match upd.get("v").and_then(Value::as_str) {
            Some(v) => v.to_owned(),
            None => return,
        };

        if !Self::has_full_hp(c) {
            warn!(id = c.id(), "cannot change vehicle without full HP");
            return;
        }
        if !c.is_in_building() {
            warn!(id = c.id(), "vehicle change only inside buildings");
            return;
        }
        let building_id = c.building_id();
        if self.buildings().get_by_id(building_id).unwrap().is_foundation() {
            warn!(id = c.id(), "cannot change vehicle in a foundation");
            return;
        }

        if self
            .ctx
            .roconfig()
            .item_or_null(&vehicle)
            .and_then(|i| i.vehicle.as_ref())
            .is_none()
        {
            warn!(id = c.id(), %vehicle, "invalid vehicle");
            return;
        }

        let inventories = BuildingInventoriesTable::new(self.db);
        if inventories
            .get(building_id, c.owner())
            .inventory()
            .get(&vehicle)
            == 0
        {
            warn!(id = c.id(), %vehicle, "vehicle not owned in this building");
            return;
        }

        debug!(id = c.id(), %vehicle, "changing vehicle");
        let mut inv = inventories.get(building_id, c.owner());

        // Inventory and fitments drop into the building inventory first.
        Self::drop_all_inventory(c, inv.mutate_inventory());
        Self::remove_all_fitments(c, inv.mutate_inventory());

        let old_vehicle = c.data().vehicle.clone();
        inv.mutate_inventory().add(&old_vehicle, 1);
        inv.mutate_inventory().add(&vehicle, -1);
        c.mutate_data().vehicle = vehicle;

        derive_character_stats(c, self.ctx);
    }

    fn drop_all_inventory(c: &mut Character<'_>, inv: &mut Inventory) {
        let items = c.inventory().clone();
        for (item, count) in &items.fungible {
            inv.add(item, *count as i64);
        }
        c.mutate_inventory().clear();
    }

    fn remove_all_fitments(c: &mut Character<'_>, inv: &mut Inventory) {
        let fitments = c.data().fitments.clone();
        for f in &fitments {
            inv.add(f, 1);
        }
        c.mutate_data().fitments.clear();
    }

    fn maybe_set_fitments(&mut self, c: &mut Character<'_>, upd: &Value) {
        let cmd = match upd.get("fit").and_then(Value::as_array) {
            Some(a) => a,
            None => return,
        };

        if !Self::has_full_hp(c) {
            warn!(id = c.id(), "cannot change fitments without full HP");
            return;
        }
        if !c.is_in_building() {
            warn!(id = c.id(), "fitment change only inside buildings");
            return;
        }
        let building_id = c.building_id();
        if self.buildings().get_by_id(building_id).unwrap().is_foundation() {
            warn!(id = c.id(), "cannot change fitments in a foundation");
            return;
        }

        let mut fitments = Vec::new();
        for f in cmd {
            let item = match f.as_str() {
                Some(s) => s.to_owned(),
                None => {
                    warn!(id = c.id(), %f, "fitment entry is not a string");
                    return;
                }
            };
            if self
                .ctx
                .roconfig()
                .item_or_null(&item)
                .and_then(|i| i.fitment.as_ref())
                .is_none()
            {
                warn!(id = c.id(), %item, "invalid fitment");
                return;
            }
            fitments.push(item);
        }

        // Availability check counts existing fitments as available, since
        // they are removed before the new set goes on.
        let mut needed: BTreeMap<String, i64> = BTreeMap::new();
        for f in &fitments {
            *needed.entry(f.clone()).or_insert(0) += 1;
        }
        for f in &c.data().fitments {
            *needed.entry(f.clone()).or_insert(0) -= 1;
        }
        let inventories = BuildingInventoriesTable::new(self.db);
        {
            let inv = inventories.get(building_id, c.owner());
            for (item, count) in &needed {
                if *count > inv.inventory().get(item) {
                    warn!(id = c.id(), %item, "fitment items not available");
                    return;
                }
            }
        }

        if !check_vehicle_fitments(&c.data().vehicle.clone(), &fitments, self.ctx) {
            warn!(id = c.id(), "fitments do not fit the vehicle");
            return;
        }

        debug!(id = c.id(), ?fitments, "changing fitments");
        let mut inv = inventories.get(building_id, c.owner());
        Self::drop_all_inventory(c, inv.mutate_inventory());
        Self::remove_all_fitments(c, inv.mutate_inventory());
        for f in &fitments {
            inv.mutate_inventory().add(f, -1);
            c.mutate_data().fitments.push(f.clone());
        }

        derive_character_stats(c, self.ctx);
    }

    fn maybe_found_building(&mut self, c: &mut Character<'_>, upd: &Value) {
        let build = match upd.get("fb").and_then(Value::as_object) {
            Some(b) => b,
            None => return,
        };
        if build.len() != 2 {
            warn!(id = c.id(), "invalid found-building command");
            return;
        }

        let building_type = match build.get("t").and_then(Value::as_str) {
            Some(t) => t.to_owned(),
            None => {
                warn!(id = c.id(), "found-building without type");
                return;
            }
        };
        let rotation = match build.get("rot").and_then(Value::as_u64) {
            Some(r) if r <= 5 => r as u32,
            _ => {
                warn!(id = c.id(), "found-building with invalid rotation");
                return;
            }
        };

        if c.is_busy() || c.is_in_building() {
            warn!(id = c.id(), "character cannot found a building now");
            return;
        }

        let ro_building = match self.ctx.roconfig().building_or_null(&building_type) {
            Some(b) => b,
            None => {
                warn!(id = c.id(), %building_type, "unknown building type");
                return;
            }
        };
        let construction = match &ro_building.construction {
            Some(cons) => cons,
            None => {
                warn!(id = c.id(), %building_type, "building cannot be constructed");
                return;
            }
        };
        if let Some(faction) = &construction.faction {
            if Faction::from_move_str(faction) != c.faction() {
                warn!(id = c.id(), %building_type, "faction-restricted building");
                return;
            }
        }

        for (item, needed) in &construction.foundation {
            if c.inventory().get(item) < *needed as i64 {
                warn!(id = c.id(), %item, "missing foundation materials");
                return;
            }
        }

        // The founder itself is in the way of the new building; it enters
        // the foundation automatically, so take it off the overlay first.
        let pos = c.position();
        self.dyn_obstacles.remove_vehicle(pos);
        if !can_place_building(&building_type, rotation, &pos, self.dyn_obstacles, self.ctx) {
            warn!(id = c.id(), %building_type, %pos, "cannot place building here");
            self.dyn_obstacles.add_vehicle(pos, c.faction());
            return;
        }

        info!(id = c.id(), %building_type, %pos, "founding building");
        let buildings = self.buildings();
        let mut b = buildings.create_new(&building_type, c.owner(), c.faction());
        b.set_centre(pos);
        {
            let data = b.mutate_data();
            data.foundation = true;
            data.shape_rotation = rotation;
            data.age_data.founded_height = self.ctx.height();
        }
        update_building_stats(&mut b, self.ctx);
        let max = b.regen_data().max_hp;
        *b.mutate_hp() = Hp::from_max(&max);

        let foundation = construction.foundation.clone();
        for (item, needed) in &foundation {
            c.mutate_inventory().add(item, -(*needed as i64));
        }

        // The founder is inside the foundation now; the vehicle was
        // already removed from the overlay above.
        stop_character(c);
        stop_mining(c);
        c.clear_target();
        c.mutate_data().enter_building = None;
        c.set_building_id(b.id());

        let shape = self
            .dyn_obstacles
            .add_building(&building_type, rotation, &pos);
        assert!(shape.is_some(), "placement re-check failed");
    }

    /// Moves fungible items between two inventories, clamping to what the
    /// source holds and (optionally) to a space budget on the receiver.
    fn move_fungible(
        &self,
        items: &BTreeMap<String, i64>,
        from: &mut Inventory,
        to: &mut Inventory,
        max_space: Option<i64>,
    ) {
        let cfg = self.ctx.roconfig();
        let mut used_space = QuantityProduct::default();

        for (item, wanted) in items {
            let available = from.get(item);
            let mut count = *wanted;
            if count > available {
                warn!(%item, count, available, "moving more than available");
                count = available;
            }

            if let Some(max_space) = max_space {
                let item_space = cfg.item(item).space as i64;
                if item_space > 0 {
                    let space_left = max_space - used_space.extract();
                    assert!(space_left >= 0);
                    let max_for_space = space_left / item_space;
                    if count > max_for_space {
                        warn!(%item, count, max_for_space, "not enough space to move items");
                        count = max_for_space;
                    }
                    used_space.add_product(count, item_space);
                }
            }

            if count == 0 {
                continue;
            }
            from.add(item, -count);
            to.add(item, count);
        }
    }

    /// Parses the {"f": {item: qty}} form of drop/pickup commands.
    fn parse_fungible_set(&self, cmd: &Value) -> BTreeMap<String, i64> {
        let obj = match cmd.as_object() {
            Some(o) => o,
            None => return BTreeMap::new(),
        };
        let fungible = match obj.get("f").and_then(Value::as_object) {
            Some(f) => f,
            None => {
                warn!(%cmd, "no fungible entry in item command");
                return BTreeMap::new();
            }
        };
        if obj.len() != 1 {
            warn!(%cmd, "extra fields in item command");
            return BTreeMap::new();
        }

        let mut res = BTreeMap::new();
        for (item, val) in fungible {
            if self.ctx.roconfig().item_or_null(item).is_none() {
                warn!(%item, "invalid fungible item");
                continue;
            }
            match quantity_from_json(val) {
                Some(q) => {
                    res.insert(item.clone(), q);
                }
                None => warn!(%item, %val, "invalid fungible amount"),
            }
        }
        res
    }

    fn maybe_drop_loot(&mut self, c: &mut Character<'_>, cmd: &Value) {
        let items = self.parse_fungible_set(cmd);
        if items.is_empty() {
            return;
        }

        if c.is_in_building() {
            let building_id = c.building_id();
            let buildings = self.buildings();
            let mut b = buildings.get_by_id(building_id).unwrap();
            if b.is_foundation() {
                // Move from the character into the construction inventory.
                let mut source = c.inventory().clone();
                let mut target = b.data().construction_inventory.clone();
                self.move_fungible(&items, &mut source, &mut target, None);
                *c.mutate_inventory() = source;
                b.mutate_data().construction_inventory = target;

                // New materials may complete the recipe.
                maybe_start_building_construction(&mut b, self.db, self.ctx);
            } else {
                let inventories = BuildingInventoriesTable::new(self.db);
                let mut inv = inventories.get(building_id, c.owner());
                let mut source = c.inventory().clone();
                let mut target = inv.inventory().clone();
                self.move_fungible(&items, &mut source, &mut target, None);
                *c.mutate_inventory() = source;
                *inv.mutate_inventory() = target;
            }
        } else {
            let loot = GroundLootTable::new(self.db);
            let mut ground = loot.get_by_coord(c.position());
            let mut source = c.inventory().clone();
            let mut target = ground.inventory().clone();
            self.move_fungible(&items, &mut source, &mut target, None);
            *c.mutate_inventory() = source;
            *ground.mutate_inventory() = target;
        }
    }

    fn maybe_pickup_loot(&mut self, c: &mut Character<'_>, cmd: &Value) {
        let items = self.parse_fungible_set(cmd);
        if items.is_empty() {
            return;
        }

        let free_cargo = c.free_cargo_space();
        if c.is_in_building() {
            let building_id = c.building_id();
            let buildings = self.buildings();
            let b = buildings.get_by_id(building_id).unwrap();
            if b.is_foundation() {
                warn!(id = c.id(), building_id, "cannot pick up in a foundation");
                return;
            }
            let inventories = BuildingInventoriesTable::new(self.db);
            let mut inv = inventories.get(building_id, c.owner());
            let mut source = inv.inventory().clone();
            let mut target = c.inventory().clone();
            self.move_fungible(&items, &mut source, &mut target, Some(free_cargo));
            *inv.mutate_inventory() = source;
            *c.mutate_inventory() = target;
        } else {
            let loot = GroundLootTable::new(self.db);
            let mut ground = loot.get_by_coord(c.position());
            let mut source = ground.inventory().clone();
            let mut target = c.inventory().clone();
            self.move_fungible(&items, &mut source, &mut target, Some(free_cargo));
            *ground.mutate_inventory() = source;
            *c.mutate_inventory() = target;
        }
    }

    fn maybe_enter_building(&mut self, c: &mut Character<'_>, upd: &Value) {
        let val = match upd.get("eb") {
            Some(v) => v,
            None => return,
        };

        if c.is_in_building() {
            warn!(id = c.id(), "already inside a building");
            return;
        }

        // Null cancels a pending enter intent.
        if val.is_null() {
            c.mutate_data().enter_building = None;
            return;
        }

        let building_id = match id_from_json(val) {
            Some(id) => id,
            None => {
                warn!(id = c.id(), %val, "not a building ID");
                return;
            }
        };
        let b = match self.buildings().get_by_id(building_id) {
            Some(b) => b,
            None => {
                warn!(id = c.id(), building_id, "building does not exist");
                return;
            }
        };
        if b.faction() != Faction::Ancient && b.faction() != c.faction() {
            warn!(id = c.id(), building_id, "cannot enter foreign-faction building");
            return;
        }

        debug!(id = c.id(), building_id, "wants to enter building");
        c.mutate_data().enter_building = Some(building_id);
    }

    fn maybe_exit_building(&mut self, c: &mut Character<'_>, upd: &Value) {
        let val = match upd.get("xb") {
            Some(v) => v,
            None => return,
        };
        match val.as_object() {
            Some(o) if o.is_empty() => (),
            _ => {
                warn!(id = c.id(), "invalid exit-building command");
                return;
            }
        }

        if c.is_busy() {
            warn!(id = c.id(), "busy character cannot exit");
            return;
        }
        if !c.is_in_building() {
            warn!(id = c.id(), "character is not in a building");
            return;
        }

        let buildings = self.buildings();
        leave_building(&buildings, c, self.rng, self.dyn_obstacles, self.ctx);
    }

    /* ******************************************************************** */

    fn try_building_updates(&mut self, name: &str, mv: &Value) {
        let cmd = mv.get("b").cloned().unwrap_or(Value::Null);
        let ops: Vec<Value> = if let Some(arr) = cmd.as_array() {
            arr.clone()
        } else if cmd.is_object() {
            vec![cmd]
        } else {
            return;
        };

        for op in &ops {
            if !op.is_object() {
                warn!(%op, "building update entry is not an object");
                continue;
            }
            let id = match op.get("id").map(id_from_json) {
                Some(Some(id)) => id,
                _ => {
                    warn!(%op, "invalid ID in building update");
                    continue;
                }
            };

            let buildings = self.buildings();
            let mut b = match buildings.get_by_id(id) {
                Some(b) => b,
                None => {
                    warn!(id, "building does not exist");
                    continue;
                }
            };
            if b.faction() == Faction::Ancient {
                warn!(id, name, "ancient buildings cannot be updated");
                continue;
            }
            if b.owner() != name {
                warn!(id, name, owner = b.owner(), "building owned by someone else");
                continue;
            }

            self.try_building_update(&mut b, op);
        }
    }

    fn try_building_update(&mut self, b: &mut Building<'_>, upd: &Value) {
        let mut new_config = BuildingConfig::default();
        let mut updated = false;

        if let Some(val) = upd.get("sf").and_then(Value::as_u64) {
            if val > MAX_SERVICE_FEE_PERCENT {
                warn!(id = b.id(), val, "service fee too high");
            } else {
                new_config.service_fee_percent = val as u32;
                updated = true;
            }
        }
        if let Some(val) = upd.get("xf").and_then(Value::as_u64) {
            if val > MAX_DEX_FEE_BPS {
                warn!(id = b.id(), val, "DEX fee too high");
            } else {
                new_config.dex_fee_bps = val as u32;
                updated = true;
            }
        }

        if updated {
            let delay = self.ctx.params().building_update_delay;
            info!(id = b.id(), delay, "scheduling building config update");
            let ongoings = OngoingsTable::new(self.db);
            let mut op = ongoings.create_new(self.ctx.height() + delay);
            op.set_building_id(b.id());
            op.set_payload(OngoingPayload::BuildingUpdate { new_config });
        }

        self.maybe_transfer_building(b, upd);
    }

    fn maybe_transfer_building(&mut self, b: &mut Building<'_>, upd: &Value) {
        let send_to = match upd.get("send").and_then(Value::as_str) {
            Some(s) => s,
            None => return,
        };

        let accounts = self.accounts();
        match accounts.get_by_name(send_to) {
            Some(a) if a.is_initialised() => {
                if a.faction() != b.faction() {
                    warn!(id = b.id(), send_to, "recipient has a different faction");
                    return;
                }
            }
            _ => {
                warn!(id = b.id(), send_to, "recipient account is not initialised");
                return;
            }
        }

        debug!(id = b.id(), to = send_to, "transferring building");
        b.set_owner(send_to);
    }
}
