//! Building services through full blocks: armour repair and blueprint
//! copying resolve via the ongoing-operation queue.

mod common;

use aurora_gsp::db::characters::CharacterTable;
use aurora_gsp::db::inventories::BuildingInventoriesTable;
use aurora_gsp::db::records::Faction;
use common::TestGame;
use serde_json::json;

fn setup(game: &mut TestGame) -> i64 {
    game.process_moves(json!([
        TestGame::build_move("domob", json!({"a": {"init": {"faction": "r"}}})),
    ]));
    game.process_admin(json!({
        "build": [{"t": "depot", "rot": 0, "c": {"x": 2000, "y": 0}, "o": "domob"}],
        "giftcoins": {"domob": 10_000},
    }));
    1_001
}

#[test]
fn armour_repair_takes_blocks() {
    let mut game = TestGame::new();
    let building = setup(&mut game);

    let id = {
        let characters = CharacterTable::new(game.db());
        let mut c = characters.create_new("domob", Faction::Red);
        c.set_building_id(building);
        c.mutate_data().vehicle = "rv st".to_owned();
        c.mutate_regen_data().max_hp.armour = 1_000;
        c.mutate_hp().armour = 550;
        c.id()
    };

    game.process_moves(json!([
        TestGame::build_move("domob", json!({"s": [{"b": building, "t": "fix", "c": id}]})),
    ]));

    // 450 missing HP: 45 coins burnt, five blocks of work.
    assert_eq!(game.balance_of("domob"), 10_000 - 45);
    {
        let characters = CharacterTable::new(game.db());
        let c = characters.get_by_id(id).unwrap();
        assert!(c.is_busy());
        assert_eq!(c.hp().armour, 550, "repair has not finished yet");
    }

    for _ in 0..4 {
        game.process_empty_block();
    }
    {
        let characters = CharacterTable::new(game.db());
        assert!(characters.get_by_id(id).unwrap().is_busy());
    }
    game.process_empty_block();

    let characters = CharacterTable::new(game.db());
    let c = characters.get_by_id(id).unwrap();
    assert_eq!(c.hp().armour, 1_000);
    assert!(!c.is_busy());
}

#[test]
fn blueprint_copy_round_trip() {
    let mut game = TestGame::new();
    let building = setup(&mut game);

    game.process_admin(json!({
        "drop": [
            {"fungible": {"lf gun bpo": 1}, "building": {"id": building, "a": "domob"}},
        ],
    }));

    game.process_moves(json!([
        TestGame::build_move(
            "domob",
            json!({"s": [{"b": building, "t": "cp", "i": "lf gun bpo", "n": 2}]})
        ),
    ]));

    // Ten blocks of copying (two copies at five blocks each).
    let inventories = BuildingInventoriesTable::new(game.db());
    assert_eq!(
        inventories.get(building, "domob").inventory().get("lf gun bpo"),
        0,
        "original escrowed during the copy"
    );
    drop(inventories);

    for _ in 0..10 {
        game.process_empty_block();
    }

    let inventories = BuildingInventoriesTable::new(game.db());
    let inv = inventories.get(building, "domob");
    assert_eq!(inv.inventory().get("lf gun bpo"), 1, "original returned");
    assert_eq!(inv.inventory().get("lf gun bpc"), 2);
}

#[test]
fn construction_delivers_items() {
    let mut game = TestGame::new();
    let building = setup(&mut game);

    game.process_admin(json!({
        "drop": [
            {
                "fungible": {"lf gun bpc": 1, "raw a": 3, "raw b": 2},
                "building": {"id": building, "a": "domob"},
            },
        ],
    }));

    game.process_moves(json!([
        TestGame::build_move(
            "domob",
            json!({"s": [{"b": building, "t": "bld", "i": "lf gun", "n": 1}]})
        ),
    ]));

    for _ in 0..10 {
        game.process_empty_block();
    }

    let inventories = BuildingInventoriesTable::new(game.db());
    let inv = inventories.get(building, "domob");
    assert_eq!(inv.inventory().get("lf gun"), 1);
    assert_eq!(inv.inventory().get("lf gun bpc"), 0, "copy consumed");
    assert_eq!(inv.inventory().get("raw a"), 0);
}
