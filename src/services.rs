//! Building service menu: armour repair, blueprint copying and item
//! construction.
//!
//! Each operation charges a base coin cost (burnt) plus the building's
//! configured service fee (paid to the owner).  Inputs are consumed up
//! front; the result is delivered by an ongoing operation at the deadline
//! block.

use serde_json::Value;
use tracing::{info, warn};

use crate::amounts::Amount;
use crate::context::Context;
use crate::db::accounts::{Account, AccountsTable};
use crate::db::buildings::BuildingsTable;
use crate::db::characters::CharacterTable;
use crate::db::inventories::BuildingInventoriesTable;
use crate::db::ongoings::OngoingsTable;
use crate::db::records::{Faction, IdT, OngoingPayload};
use crate::db::Database;
use crate::moves::json::{id_from_json, quantity_from_json};

/// A parsed service operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceOperation {
    /// Restore a character's armour to its maximum.
    ArmourRepair { building: IdT, character: IdT },
    /// Copy a blueprint original `num` times.
    BlueprintCopy {
        building: IdT,
        original: String,
        num: u64,
    },
    /// Construct `num` items from a blueprint and raw materials.
    ItemConstruction {
        building: IdT,
        output: String,
        num: u64,
    },
}

impl ServiceOperation {
    /// Parses one entry of the "s" command array.
    pub fn parse(data: &Value) -> Option<ServiceOperation> {
        let obj = data.as_object()?;
        let building = id_from_json(obj.get("b")?)?;
        let op_type = obj.get("t")?.as_str()?;

        match op_type {
            "fix" => {
                if obj.len() != 3 {
                    return None;
                }
                let character = id_from_json(obj.get("c")?)?;
                Some(ServiceOperation::ArmourRepair {
                    building,
                    character,
                })
            }
            "cp" => {
                if obj.len() != 4 {
                    return None;
                }
                let original = obj.get("i")?.as_str()?.to_owned();
                let num = quantity_from_json(obj.get("n")?)? as u64;
                Some(ServiceOperation::BlueprintCopy {
                    building,
                    original,
                    num,
                })
            }
            "bld" => {
                if obj.len() != 4 {
                    return None;
                }
                let output = obj.get("i")?.as_str()?.to_owned();
                let num = quantity_from_json(obj.get("n")?)? as u64;
                Some(ServiceOperation::ItemConstruction {
                    building,
                    output,
                    num,
                })
            }
            _ => None,
        }
    }
}

pub struct ServiceProcessor<'a, 'c> {
    db: &'a Database,
    ctx: &'c Context<'c>,
}

impl<'a, 'c> ServiceProcessor<'a, 'c> {
    pub fn new(db: &'a Database, ctx: &'c Context<'c>) -> Self {
        Self { db, ctx }
    }

    /// Checks the building is operational and returns its owner fee data:
    /// (owner fee percent, owner name or None for ancient).
    fn building_fee_data(&self, building: IdT) -> Option<(u32, Option<String>)> {
        let buildings = BuildingsTable::new(self.db);
        let b = buildings.get_by_id(building)?;
        if b.is_foundation() {
            warn!(building, "service operation in foundation");
            return None;
        }
        let fee = b.data().config.service_fee_percent;
        let owner = if b.faction() == Faction::Ancient {
            assert_eq!(fee, 0, "ancient building with service fee");
            None
        } else {
            Some(b.owner().to_owned())
        };
        Some((fee, owner))
    }

    /// Total cost of an operation with base cost `base`: the base is burnt
    /// and the owner fee (rounded down) goes to the building owner.
    fn fee_split(base: Amount, fee_percent: u32) -> (Amount, Amount) {
        let owner = base * i64::from(fee_percent) / 100;
        (base, owner)
    }

    /// Charges the account; returns false (without charging) if the
    /// balance does not cover base plus fee.
    fn charge(
        &self,
        account: &mut Account<'_>,
        base: Amount,
        fee_percent: u32,
        owner: &Option<String>,
    ) -> bool {
        let (burnt, owner_fee) = Self::fee_split(base, fee_percent);
        let total = burnt + owner_fee;
        if account.balance() < total {
            warn!(
                account = account.name(),
                total,
                balance = account.balance(),
                "cannot afford service operation"
            );
            return false;
        }
        account.add_balance(-total);
        if owner_fee > 0 {
            let owner = owner.as_ref().expect("owner fee in ancient building");
            if owner == account.name() {
                account.add_balance(owner_fee);
            } else {
                let accounts = AccountsTable::new(self.db);
                let mut a = accounts.get_by_name(owner).unwrap();
                a.add_balance(owner_fee);
            }
        }
        true
    }

    fn process_armour_repair(&self, account: &mut Account<'_>, building: IdT, character: IdT) {
        let (fee_percent, owner) = match self.building_fee_data(building) {
            Some(d) => d,
            None => return,
        };

        let characters = CharacterTable::new(self.db);
        let mut c = match characters.get_by_id(character) {
            Some(c) => c,
            None => {
                warn!(character, "repair of unknown character");
                return;
            }
        };
        if c.owner() != account.name() {
            warn!(character, by = account.name(), "repair of foreign character");
            return;
        }
        if !c.is_in_building() || c.building_id() != building {
            warn!(character, building, "character is not inside the building");
            return;
        }
        if c.is_busy() {
            warn!(character, "busy character cannot be repaired");
            return;
        }

        let missing = i64::from(c.regen_data().max_hp.armour) - i64::from(c.hp().armour);
        if missing <= 0 {
            warn!(character, "nothing to repair");
            return;
        }

        // One coin per ten missing HP, rounded up.
        let base = (missing + 9) / 10;
        if !self.charge(account, base, fee_percent, &owner) {
            return;
        }

        let blocks = ((missing + 99) / 100).max(1) as u64;
        info!(character, missing, blocks, "starting armour repair");
        let ongoings = OngoingsTable::new(self.db);
        let mut op = ongoings.create_new(self.ctx.height() + blocks);
        op.set_character_id(character);
        op.set_building_id(building);
        op.set_payload(OngoingPayload::ArmourRepair);
        c.mutate_data().ongoing = Some(op.id());
    }

    fn process_blueprint_copy(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        original: &str,
        num: u64,
    ) {
        let (fee_percent, owner) = match self.building_fee_data(building) {
            Some(d) => d,
            None => return,
        };

        let bp = match self
            .ctx
            .roconfig()
            .item_or_null(original)
            .and_then(|i| i.blueprint.as_ref())
        {
            Some(bp) if bp.original => bp,
            _ => {
                warn!(original, "not a copyable blueprint original");
                return;
            }
        };

        let inventories = BuildingInventoriesTable::new(self.db);
        if inventories.get(building, account.name()).inventory().get(original) < 1 {
            warn!(account = account.name(), original, "blueprint not available");
            return;
        }

        let base = bp.copy_cost * num as i64;
        if !self.charge(account, base, fee_percent, &owner) {
            return;
        }

        // The original goes into escrow for the duration of the copy.
        {
            let mut inv = inventories.get(building, account.name());
            inv.mutate_inventory().add(original, -1);
        }

        let blocks = u64::from(bp.copy_blocks) * num;
        info!(account = account.name(), original, num, blocks, "copying blueprint");
        let ongoings = OngoingsTable::new(self.db);
        let mut op = ongoings.create_new(self.ctx.height() + blocks);
        op.set_building_id(building);
        op.set_payload(OngoingPayload::BlueprintCopy {
            account: account.name().to_owned(),
            original_type: original.to_owned(),
            copy_type: bp.copy_type.clone(),
            num_copies: num,
        });
    }

    fn process_item_construction(
        &self,
        account: &mut Account<'_>,
        building: IdT,
        output: &str,
        num: u64,
    ) {
        let (fee_percent, owner) = match self.building_fee_data(building) {
            Some(d) => d,
            None => return,
        };

        let construction = match self
            .ctx
            .roconfig()
            .item_or_null(output)
            .and_then(|i| i.construction.as_ref())
        {
            Some(c) => c,
            None => {
                warn!(output, "item cannot be constructed");
                return;
            }
        };

        // A blueprint for the output is required: an original is kept in
        // escrow and returned, a copy is consumed.
        let cfg = self.ctx.roconfig();
        let mut blueprint_original = None;
        let mut blueprint_copy = None;
        for (name, item) in &cfg.items {
            if let Some(bp) = &item.blueprint {
                if bp.for_item == output {
                    if bp.original {
                        blueprint_original = Some(name.clone());
                    } else {
                        blueprint_copy = Some(name.clone());
                    }
                }
            }
        }

        let inventories = BuildingInventoriesTable::new(self.db);
        let inv_snapshot = inventories.get(building, account.name()).inventory().clone();

        let used_blueprint = if blueprint_original
            .as_ref()
            .map(|b| inv_snapshot.get(b) > 0)
            .unwrap_or(false)
        {
            (blueprint_original.unwrap(), true)
        } else if blueprint_copy
            .as_ref()
            .map(|b| inv_snapshot.get(b) > 0)
            .unwrap_or(false)
        {
            (blueprint_copy.unwrap(), false)
        } else {
            warn!(account = account.name(), output, "no blueprint available");
            return;
        };

        for (input, per_item) in &construction.inputs {
            let needed = (*per_item * num) as i64;
            if inv_snapshot.get(input) < needed {
                warn!(
                    account = account.name(),
                    %input, needed, "missing construction inputs"
                );
                return;
            }
        }

        let base = construction.cost * num as i64;
        if !self.charge(account, base, fee_percent, &owner) {
            return;
        }

        {
            let mut inv = inventories.get(building, account.name());
            for (input, per_item) in &construction.inputs {
                inv.mutate_inventory().add(input, -((*per_item * num) as i64));
            }
            inv.mutate_inventory().add(&used_blueprint.0, -1);
        }

        let blocks = u64::from(construction.blocks) * num;
        info!(account = account.name(), output, num, blocks, "starting construction");
        let ongoings = OngoingsTable::new(self.db);
        let mut op = ongoings.create_new(self.ctx.height() + blocks);
        op.set_building_id(building);
        op.set_payload(OngoingPayload::ItemConstruction {
            account: account.name().to_owned(),
            output_type: output.to_owned(),
            num_items: num,
            original_type: used_blueprint.1.then(|| used_blueprint.0.clone()),
        });
    }

    /// Parses, validates and executes one service sub-command.
    pub fn process(&self, account: &mut Account<'_>, raw: &Value) {
        let op = match ServiceOperation::parse(raw) {
            Some(op) => op,
            None => {
                warn!(%raw, "malformed service operation");
                return;
            }
        };

        match op {
            ServiceOperation::ArmourRepair {
                building,
                character,
            } => self.process_armour_repair(account, building, character),
            ServiceOperation::BlueprintCopy {
                building,
                original,
                num,
            } => self.process_blueprint_copy(account, building, &original, num),
            ServiceOperation::ItemConstruction {
                building,
                output,
                num,
            } => self.process_item_construction(account, building, &output, num),
        }
    }
}
