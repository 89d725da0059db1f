//! Shared harness for the end-to-end engine tests.
//!
//! Drives a regtest `Game` on an in-memory store.  State setup goes either
//! through real moves / god-mode admin commands or directly through the
//! table APIs; after each block the full cross-table validation runs.

#![allow(dead_code)]

use serde_json::{json, Value};

use aurora_gsp::config::Chain;
use aurora_gsp::db::accounts::AccountsTable;
use aurora_gsp::db::characters::CharacterTable;
use aurora_gsp::db::records::{Faction, IdT};
use aurora_gsp::db::Database;
use aurora_gsp::hex::HexCoord;
use aurora_gsp::logic::{validate_state_slow, Game};
use aurora_gsp::statejson::GameStateJson;

pub struct TestGame {
    pub game: Game,
    height: u64,
}

impl TestGame {
    pub fn new() -> TestGame {
        let db = Database::open_in_memory().expect("in-memory database");
        let game = Game::new(db, Chain::Regtest);
        game.initialise_state().expect("state initialisation");
        TestGame { game, height: 100 }
    }

    pub fn db(&self) -> &Database {
        self.game.db()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Processes a block with the given moves and admin commands at the
    /// next height, then validates the state.
    pub fn process_block(&mut self, moves: Value, admin: Value) {
        self.height += 1;
        let block = json!({
            "block": {
                "height": self.height,
                "timestamp": 1_500_000_000 + self.height as i64,
                "hash": format!("test block hash {}", self.height),
            },
            "moves": moves,
            "admin": admin,
        });
        self.game.update_state(&block);

        let ctx = self.game.context(self.height, 0);
        validate_state_slow(self.db(), &ctx);
    }

    pub fn process_empty_block(&mut self) {
        self.process_block(json!([]), json!([]));
    }

    pub fn process_moves(&mut self, moves: Value) {
        self.process_block(moves, json!([]));
    }

    pub fn process_admin(&mut self, god: Value) {
        self.process_block(json!([]), json!([{ "cmd": { "god": god } }]));
    }

    /// One move envelope for the given account.
    pub fn build_move(name: &str, mv: Value) -> Value {
        json!({ "name": name, "out": {}, "move": mv })
    }

    /// Creates an account directly, already initialised to a faction.
    pub fn create_account(&self, name: &str, faction: Faction) {
        let accounts = AccountsTable::new(self.db());
        let mut a = accounts.create_new(name);
        a.set_faction(faction);
    }

    /// Creates a bare on-map character for direct-state tests.  Vehicle
    /// stats are left to the caller.
    pub fn create_character(&self, owner: &str, faction: Faction, pos: HexCoord) -> IdT {
        let characters = CharacterTable::new(self.db());
        let mut c = characters.create_new(owner, faction);
        c.set_position(pos);
        c.mutate_data().vehicle = "rv st".to_owned();
        c.mutate_regen_data().max_hp.armour = 100;
        c.mutate_hp().armour = 100;
        c.id()
    }

    pub fn balance_of(&self, name: &str) -> i64 {
        AccountsTable::new(self.db())
            .get_by_name(name)
            .unwrap()
            .balance()
    }

    pub fn full_state(&self) -> Value {
        let ctx = self.game.context(self.height, 0);
        GameStateJson::new(self.db(), &ctx).full_state()
    }
}
