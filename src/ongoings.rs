//! The ongoing-operations scheduler.
//!
//! Operations queue by target height; each block drains its height bucket
//! in ascending ID order and dispatches on the payload variant.  An entry
//! with a target height strictly below the current block means a block was
//! skipped, which is a program-logic fault.

use tracing::info;

use crate::buildings::finish_building_construction;
use crate::context::Context;
use crate::db::buildings::BuildingsTable;
use crate::db::characters::CharacterTable;
use crate::db::inventories::BuildingInventoriesTable;
use crate::db::ongoings::OngoingsTable;
use crate::db::records::OngoingPayload;
use crate::db::regions::RegionsTable;
use crate::db::Database;
use crate::prospecting::finish_prospecting;
use crate::rng::BlockRng;

/// Processes all operations due at the current height.
pub fn process_all_ongoings(db: &Database, rng: &mut BlockRng, ctx: &Context<'_>) {
    let ongoings = OngoingsTable::new(db);
    let due = ongoings.query_for_height(ctx.height());
    if due.is_empty() {
        return;
    }
    info!(height = ctx.height(), count = due.len(), "processing ongoing operations");

    let buildings = BuildingsTable::new(db);
    let characters = CharacterTable::new(db);
    let inventories = BuildingInventoriesTable::new(db);
    let regions = RegionsTable::new(db, ctx.height());

    for op_id in due {
        let op = ongoings.get_by_id(op_id).unwrap();
        assert_eq!(
            op.height(),
            ctx.height(),
            "ongoing operation {op_id} missed its deadline"
        );

        let payload = op.payload().clone();
        let character_id = op.character_id();
        let building_id = op.building_id();
        drop(op);

        match payload {
            OngoingPayload::Prospection => {
                let cid = character_id.expect("prospection without character");
                let mut c = characters.get_by_id(cid).expect("dangling character");
                assert_eq!(c.data().ongoing, Some(op_id));
                finish_prospecting(&mut c, db, &regions, rng, ctx);
                c.mutate_data().ongoing = None;
            }

            OngoingPayload::ArmourRepair => {
                let cid = character_id.expect("repair without character");
                let mut c = characters.get_by_id(cid).expect("dangling character");
                assert_eq!(c.data().ongoing, Some(op_id));
                info!(character = cid, "armour repair finished");
                let max = c.regen_data().max_hp.armour;
                c.mutate_hp().armour = max;
                c.mutate_data().ongoing = None;
            }

            OngoingPayload::BlueprintCopy {
                account,
                original_type,
                copy_type,
                num_copies,
            } => {
                let bid = building_id.expect("blueprint copy without building");
                info!(%account, building = bid, "blueprint copy finished");
                let mut inv = inventories.get(bid, &account);
                inv.mutate_inventory().add(&original_type, 1);
                inv.mutate_inventory().add(&copy_type, num_copies as i64);
            }

            OngoingPayload::ItemConstruction {
                account,
                output_type,
                num_items,
                original_type,
            } => {
                let bid = building_id.expect("construction without building");
                info!(%account, building = bid, %output_type, "item construction finished");
                let mut inv = inventories.get(bid, &account);
                inv.mutate_inventory().add(&output_type, num_items as i64);
                if let Some(orig) = original_type {
                    inv.mutate_inventory().add(&orig, 1);
                }
            }

            OngoingPayload::BuildingConstruction => {
                let bid = building_id.expect("building construction without building");
                let mut b = buildings.get_by_id(bid).expect("dangling building");
                finish_building_construction(&mut b, ctx);
            }

            OngoingPayload::BuildingUpdate { new_config } => {
                let bid = building_id.expect("building update without building");
                let mut b = buildings.get_by_id(bid).expect("dangling building");
                info!(building = bid, "applying scheduled config update");
                b.mutate_data().config = new_config;
            }
        }

        if let Some(cid) = character_id {
            let c = characters.get_by_id(cid).expect("dangling character");
            assert!(!c.is_busy(), "character {cid} still busy after its operation");
        }
    }

    ongoings.delete_for_height(ctx.height());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Chain, Params};
    use crate::db::records::{BuildingConfig, Faction};
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

        fn ctx(&self, height: u64) -> Context<'_> {
            Context::new(Chain::Regtest, &self.params, &self.map, height, 0)
        }
    }

    fn run(db: &Database, setup: &Setup, height: u64) {
        let ctx = setup.ctx(height);
        let mut rng = BlockRng::from_bytes(format!("ongoing {height}").as_bytes());
        process_all_ongoings(db, &mut rng, &ctx);
    }

    #[test]
    fn armour_repair_completes() {
        let db = test_db();
        let setup = Setup::new();
        let characters = CharacterTable::new(&db);
        let cid = {
            let mut c = characters.create_new("domob", Faction::Red);
            c.set_building_id(7);
            c.mutate_data().vehicle = "rv st".to_owned();
            c.mutate_regen_data().max_hp.armour = 100;
            c.mutate_hp().armour = 10;
            c.id()
        };

        let ongoings = OngoingsTable::new(&db);
        {
            let mut op = ongoings.create_new(105);
            op.set_character_id(cid);
            op.set_payload(OngoingPayload::ArmourRepair);
            let op_id = op.id();
            let mut c = characters.get_by_id(cid).unwrap();
            c.mutate_data().ongoing = Some(op_id);
        }

        // Nothing happens before the deadline.
        run(&db, &setup, 104);
        assert_eq!(characters.get_by_id(cid).unwrap().hp().armour, 10);

        run(&db, &setup, 105);
        let c = characters.get_by_id(cid).unwrap();
        assert_eq!(c.hp().armour, 100);
        assert!(!c.is_busy());
        drop(c);
        assert!(ongoings.query_all().is_empty());
    }

    #[test]
    fn blueprint_copy_and_construction_credit_outputs() {
        let db = test_db();
        let setup = Setup::new();
        let ongoings = OngoingsTable::new(&db);

        {
            let mut op = ongoings.create_new(50);
            op.set_building_id(3);
            op.set_payload(OngoingPayload::BlueprintCopy {
                account: "domob".to_owned(),
                original_type: "lf gun bpo".to_owned(),
                copy_type: "lf gun bpc".to_owned(),
                num_copies: 2,
            });
        }
        {
            let mut op = ongoings.create_new(50);
            op.set_building_id(3);
            op.set_payload(OngoingPayload::ItemConstruction {
                account: "domob".to_owned(),
                output_type: "lf gun".to_owned(),
                num_items: 3,
                original_type: Some("lf gun bpo".to_owned()),
            });
        }

        run(&db, &setup, 50);

        let inventories = BuildingInventoriesTable::new(&db);
        let inv = inventories.get(3, "domob");
        assert_eq!(inv.inventory().get("lf gun bpo"), 2, "originals returned");
        assert_eq!(inv.inventory().get("lf gun bpc"), 2);
        assert_eq!(inv.inventory().get("lf gun"), 3);
    }

    #[test]
    fn building_construction_and_config_update() {
        let db = test_db();
        let setup = Setup::new();
        let buildings = BuildingsTable::new(&db);
        let bid = {
            let mut b = buildings.create_new("turret", "domob", Faction::Red);
            b.set_centre(HexCoord::new(0, 0));
            b.mutate_data().foundation = true;
            b.id()
        };

        let ongoings = OngoingsTable::new(&db);
        {
            let mut op = ongoings.create_new(60);
            op.set_building_id(bid);
            op.set_payload(OngoingPayload::BuildingConstruction);
        }
        {
            let mut op = ongoings.create_new(60);
            op.set_building_id(bid);
            op.set_payload(OngoingPayload::BuildingUpdate {
                new_config: BuildingConfig {
                    service_fee_percent: 42,
                    dex_fee_bps: 77,
                },
            });
        }

        run(&db, &setup, 60);

        let b = buildings.get_by_id(bid).unwrap();
        assert!(!b.is_foundation());
        assert_eq!(b.data().age_data.finished_height, Some(60));
        assert_eq!(b.data().combat_data.attacks.len(), 1, "attacks unlocked");
        assert_eq!(b.data().config.service_fee_percent, 42);
        assert_eq!(b.data().config.dex_fee_bps, 77);
    }

    #[test]
    #[should_panic(expected = "missed its deadline")]
    fn stale_operations_are_a_fault() {
        let db = test_db();
        let setup = Setup::new();
        let ongoings = OngoingsTable::new(&db);
        {
            let mut op = ongoings.create_new(10);
            op.set_building_id(1);
            op.set_payload(OngoingPayload::BuildingConstruction);
        }
        run(&db, &setup, 11);
    }
}
