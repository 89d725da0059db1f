//! Gain-HP (syphon) reconciliation: drained HP are only credited when the
//! victim can pay every drainer in full.

mod common;

use aurora_gsp::db::characters::CharacterTable;
use aurora_gsp::db::records::{Attack, Damage, Faction, TargetId};
use aurora_gsp::hex::HexCoord;
use common::TestGame;

fn add_syphon(game: &TestGame, id: i64, dmg: u32) {
    let characters = CharacterTable::new(game.db());
    let mut c = characters.get_by_id(id).unwrap();
    c.mutate_data().combat_data.attacks.push(Attack {
        range: Some(10),
        gain_hp: true,
        damage: Some(Damage {
            min: dmg,
            max: dmg,
            armour_percent: Some(0),
            ..Default::default()
        }),
        ..Default::default()
    });
}

fn setup_shield(game: &TestGame, id: i64, shield: u32, max_shield: u32) {
    let characters = CharacterTable::new(game.db());
    let mut c = characters.get_by_id(id).unwrap();
    c.mutate_regen_data().max_hp.shield = max_shield;
    c.mutate_hp().shield = shield;
}

fn set_target(game: &TestGame, id: i64, target: i64) {
    let characters = CharacterTable::new(game.db());
    let mut c = characters.get_by_id(id).unwrap();
    c.set_target(TargetId::character(target));
}

fn shield_of(game: &TestGame, id: i64) -> u32 {
    CharacterTable::new(game.db())
        .get_by_id(id)
        .unwrap()
        .hp()
        .shield
}

#[test]
fn multi_drainer_with_insufficient_hp_gains_nothing() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    let a = game.create_character("red", Faction::Red, HexCoord::new(2_000, 0));
    let b = game.create_character("red", Faction::Red, HexCoord::new(2_001, 0));
    let victim = game.create_character("green", Faction::Green, HexCoord::new(2_002, 0));

    add_syphon(&game, a, 10);
    add_syphon(&game, b, 8);
    setup_shield(&game, a, 5, 50);
    setup_shield(&game, b, 5, 50);

    // The victim has only 15 shield and no armour: the drains kill it.
    setup_shield(&game, victim, 15, 15);
    {
        let characters = CharacterTable::new(game.db());
        let mut c = characters.get_by_id(victim).unwrap();
        c.mutate_regen_data().max_hp.armour = 0;
        c.mutate_hp().armour = 0;
    }

    set_target(&game, a, victim);
    set_target(&game, b, victim);

    game.process_empty_block();

    // The victim died and neither drainer was credited.
    assert!(CharacterTable::new(game.db()).get_by_id(victim).is_none());
    assert_eq!(shield_of(&game, a), 5);
    assert_eq!(shield_of(&game, b), 5);
}

#[test]
fn single_drainer_is_credited() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    let a = game.create_character("red", Faction::Red, HexCoord::new(2_000, 0));
    let victim = game.create_character("green", Faction::Green, HexCoord::new(2_002, 0));

    add_syphon(&game, a, 10);
    setup_shield(&game, a, 5, 50);
    setup_shield(&game, victim, 40, 40);

    set_target(&game, a, victim);
    game.process_empty_block();

    // Drained 10 from a surviving victim: fully credited.
    assert_eq!(shield_of(&game, victim), 30);
    assert_eq!(shield_of(&game, a), 15);
}

#[test]
fn gained_hp_clamp_at_own_maximum() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    let a = game.create_character("red", Faction::Red, HexCoord::new(2_000, 0));
    let victim = game.create_character("green", Faction::Green, HexCoord::new(2_002, 0));

    add_syphon(&game, a, 10);
    setup_shield(&game, a, 45, 50);
    setup_shield(&game, victim, 40, 40);

    set_target(&game, a, victim);
    game.process_empty_block();

    assert_eq!(shield_of(&game, a), 50, "gain clamps at the maximum");
}
