//! Target selection across blocks: two opposing characters acquire each
//! other while in range and drop their targets once apart.

mod common;

use aurora_gsp::db::characters::CharacterTable;
use aurora_gsp::db::records::{Attack, Damage, Faction, TargetId};
use aurora_gsp::hex::HexCoord;
use common::TestGame;

fn arm_character(game: &TestGame, id: i64, range: u32) {
    let characters = CharacterTable::new(game.db());
    let mut c = characters.get_by_id(id).unwrap();
    c.mutate_data().combat_data.attacks.push(Attack {
        range: Some(range),
        damage: Some(Damage {
            min: 1,
            max: 1,
            ..Default::default()
        }),
        ..Default::default()
    });
}

fn target_of(game: &TestGame, id: i64) -> Option<TargetId> {
    CharacterTable::new(game.db())
        .get_by_id(id)
        .unwrap()
        .target()
}

#[test]
fn characters_acquire_and_lose_targets() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    // Far away from any safe zone, at L1 distance 5.
    let red = game.create_character("red", Faction::Red, HexCoord::new(2_000, 0));
    let green = game.create_character("green", Faction::Green, HexCoord::new(2_005, 0));
    arm_character(&game, red, 5);
    arm_character(&game, green, 5);

    game.process_empty_block();
    assert_eq!(target_of(&game, red), Some(TargetId::character(green)));
    assert_eq!(target_of(&game, green), Some(TargetId::character(red)));

    // Move the green character out to distance 6; the next block's target
    // selection clears both sides.
    {
        let characters = CharacterTable::new(game.db());
        let mut c = characters.get_by_id(green).unwrap();
        c.set_position(HexCoord::new(2_006, 0));
    }
    game.process_empty_block();
    assert_eq!(target_of(&game, red), None);
    assert_eq!(target_of(&game, green), None);
}

#[test]
fn no_targets_inside_safe_zones() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    // (900, 900) is the neutral no-combat zone.
    let red = game.create_character("red", Faction::Red, HexCoord::new(900, 900));
    let green = game.create_character("green", Faction::Green, HexCoord::new(901, 900));
    arm_character(&game, red, 5);
    arm_character(&game, green, 5);

    game.process_empty_block();
    assert_eq!(target_of(&game, red), None);
    assert_eq!(target_of(&game, green), None);
}

#[test]
fn closest_candidate_wins() {
    let mut game = TestGame::new();
    game.create_account("red", Faction::Red);
    game.create_account("green", Faction::Green);

    let red = game.create_character("red", Faction::Red, HexCoord::new(2_000, 0));
    let near = game.create_character("green", Faction::Green, HexCoord::new(2_002, 0));
    let _far = game.create_character("green", Faction::Green, HexCoord::new(2_004, 0));
    arm_character(&game, red, 5);

    game.process_empty_block();
    assert_eq!(target_of(&game, red), Some(TargetId::character(near)));
}
