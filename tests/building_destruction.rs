//! Destroying a building: everything inside accumulates and drops to the
//! ground at the centre with per-unit probability.

mod common;

use aurora_gsp::db::buildings::BuildingsTable;
use aurora_gsp::db::characters::CharacterTable;
use aurora_gsp::db::inventories::GroundLootTable;
use aurora_gsp::db::records::{Attack, Damage, Faction, TargetId};
use aurora_gsp::hex::HexCoord;
use common::TestGame;

/// Sets up a red attacker about to destroy a green turret that holds a
/// construction inventory and a character with cargo.  Returns
/// (attacker, building, inside character).
fn setup(game: &mut TestGame) -> (i64, i64, i64) {
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    let centre = HexCoord::new(2_000, 0);
    let building = {
        let buildings = BuildingsTable::new(game.db());
        let mut b = buildings.create_new("turret", "green", Faction::Green);
        b.set_centre(centre);
        b.mutate_regen_data().max_hp.armour = 10;
        b.mutate_hp().armour = 10;
        b.mutate_data().foundation = true;
        b.mutate_data().construction_inventory.add("raw a", 10);
        b.mutate_data().construction_inventory.add("raw b", 5);
        b.id()
    };

    let inside = {
        let characters = CharacterTable::new(game.db());
        let mut c = characters.create_new("green", Faction::Green);
        c.set_building_id(building);
        c.mutate_data().vehicle = "gv st".to_owned();
        c.mutate_data().cargo_space = 10_000;
        c.mutate_inventory().add("raw a", 100);
        c.id()
    };

    let attacker = game.create_character("red", Faction::Red, HexCoord::new(2_003, 0));
    {
        let characters = CharacterTable::new(game.db());
        let mut c = characters.get_by_id(attacker).unwrap();
        c.mutate_data().combat_data.attacks.push(Attack {
            range: Some(10),
            damage: Some(Damage {
                min: 500,
                max: 500,
                ..Default::default()
            }),
            ..Default::default()
        });
        c.set_target(TargetId::building(building));
    }

    (attacker, building, inside)
}

#[test]
fn destroyed_building_drops_a_share_of_its_contents() {
    let mut game = TestGame::new();
    let (_, building, inside) = setup(&mut game);
    let centre = HexCoord::new(2_000, 0);

    game.process_empty_block();

    // Building and the character inside it are gone.
    assert!(BuildingsTable::new(game.db()).get_by_id(building).is_none());
    assert!(CharacterTable::new(game.db()).get_by_id(inside).is_none());

    // Drops appear at the centre.  Of 110 "raw a" and 5 "raw b" units,
    // each drops independently with 30% probability; the exact counts are
    // seed-determined, so check bounds that hold for any plausible
    // realisation of the fixed seed.
    let loot = GroundLootTable::new(game.db());
    let ground = loot.get_by_coord(centre);
    let raw_a = ground.inventory().get("raw a");
    let raw_b = ground.inventory().get("raw b");
    assert!(raw_a <= 110 && raw_b <= 5);
    assert!(
        (10..=60).contains(&raw_a),
        "110 units at 30% dropped {raw_a}, far outside expectation"
    );
}

#[test]
fn destruction_is_deterministic_across_replays() {
    let run = || {
        let mut game = TestGame::new();
        setup(&mut game);
        game.process_empty_block();
        let loot = GroundLootTable::new(game.db());
        let ground = loot.get_by_coord(HexCoord::new(2_000, 0));
        let raw_a = ground.inventory().get("raw a");
        let raw_b = ground.inventory().get("raw b");
        (raw_a, raw_b)
    };

    assert_eq!(run(), run());
}
