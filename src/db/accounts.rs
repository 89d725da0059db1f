//! Account rows: faction, coin balance, fame and kill counters.

use tracing::debug;

use super::lazy::LazyRecord;
use super::records::{AccountData, Faction};
use super::tracker::TrackerGuard;
use super::Database;
use crate::amounts::{Amount, MAX_COIN_AMOUNT};

/// Maximum fame value.
pub const MAX_FAME: i64 = 9_999;

/// Write-back handle for one account row.
pub struct Account<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    name: String,
    faction: Faction,
    balance: Amount,
    fame: i64,
    kills: i64,
    proto: LazyRecord<AccountData>,
    is_new: bool,
    dirty: bool,
}

impl<'a> Account<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    /// An account is initialised once it picked a player faction; before
    /// that only a subset of operations is allowed.
    pub fn is_initialised(&self) -> bool {
        self.faction.is_player()
    }

    pub fn set_faction(&mut self, f: Faction) {
        assert_eq!(
            self.faction,
            Faction::Invalid,
            "account {} already has a faction",
            self.name
        );
        assert!(f.is_player(), "cannot initialise account to {f:?}");
        self.faction = f;
        self.dirty = true;
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn add_balance(&mut self, delta: Amount) {
        let updated = self.balance + delta;
        assert!(
            (0..=MAX_COIN_AMOUNT).contains(&updated),
            "balance of {} out of range: {updated}",
            self.name
        );
        self.balance = updated;
        self.dirty = true;
    }

    pub fn fame(&self) -> i64 {
        self.fame
    }

    pub fn set_fame(&mut self, fame: i64) {
        assert!((0..=MAX_FAME).contains(&fame), "fame out of range: {fame}");
        self.fame = fame;
        self.dirty = true;
    }

    pub fn kills(&self) -> i64 {
        self.kills
    }

    pub fn set_kills(&mut self, kills: i64) {
        assert!(kills >= 0);
        self.kills = kills;
        self.dirty = true;
    }

    pub fn data(&self) -> std::cell::Ref<'_, AccountData> {
        self.proto.get()
    }

    pub fn mutate_data(&mut self) -> &mut AccountData {
        self.proto.mutate()
    }
}

impl Drop for Account<'_> {
    fn drop(&mut self) {
        if self.is_new {
            debug!(name = %self.name, "inserting new account");
            self.db
                .prepare(
                    r#"
                    INSERT INTO `accounts`
                        (`name`, `faction`, `balance`, `fame`, `kills`, `proto`)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .execute((
                    &self.name,
                    self.faction.to_db(),
                    self.balance,
                    self.fame,
                    self.kills,
                    self.proto.serialised(),
                ))
                .expect("failed to insert account");
            return;
        }

        if !self.dirty && !self.proto.is_dirty() {
            return;
        }

        self.db
            .prepare(
                r#"
                UPDATE `accounts`
                    SET `faction` = ?2, `balance` = ?3, `fame` = ?4,
                        `kills` = ?5, `proto` = ?6
                    WHERE `name` = ?1
                "#,
            )
            .execute((
                &self.name,
                self.faction.to_db(),
                self.balance,
                self.fame,
                self.kills,
                self.proto.serialised(),
            ))
            .expect("failed to update account");
    }
}

/// Table object handing out account handles.
pub struct AccountsTable<'a> {
    db: &'a Database,
}

impl<'a> AccountsTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a fresh, uninitialised account entry.
    pub fn create_new(&self, name: &str) -> Account<'a> {
        Account {
            db: self.db,
            _tracker: self.db.track_handle("account", name),
            name: name.to_owned(),
            faction: Faction::Invalid,
            balance: 0,
            fame: 100,
            kills: 0,
            proto: LazyRecord::new_default(),
            is_new: true,
            dirty: false,
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<Account<'a>> {
        let tracker = self.db.track_handle("account", name);
        let mut stmt = self.db.prepare(
            r#"
            SELECT `name`, `faction`, `balance`, `fame`, `kills`, `proto`
                FROM `accounts` WHERE `name` = ?1
            "#,
        );
        let mut rows = stmt.query((name,)).expect("account query failed");
        let row = match rows.next().expect("account row read failed") {
            Some(row) => row,
            None => return None,
        };

        Some(Account {
            db: self.db,
            _tracker: tracker,
            name: row.get(0).unwrap(),
            faction: Faction::from_db(row.get(1).unwrap()),
            balance: row.get(2).unwrap(),
            fame: row.get(3).unwrap(),
            kills: row.get(4).unwrap(),
            proto: LazyRecord::from_bytes(row.get(5).unwrap()),
            is_new: false,
            dirty: false,
        })
    }

    /// Convenience for "get existing or create uninitialised".
    pub fn get_or_create(&self, name: &str) -> Account<'a> {
        match self.get_by_name(name) {
            Some(a) => a,
            None => self.create_new(name),
        }
    }

    /// Names of all initialised accounts, ordered by name.
    pub fn query_initialised(&self) -> Vec<String> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `name` FROM `accounts`
                WHERE `faction` IN (1, 2, 3)
                ORDER BY `name`
            "#,
        );
        let rows = stmt
            .query_map((), |row| row.get::<_, String>(0))
            .expect("account query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// Names of all accounts, ordered by name.
    pub fn query_all(&self) -> Vec<String> {
        let mut stmt = self
            .db
            .prepare("SELECT `name` FROM `accounts` ORDER BY `name`");
        let rows = stmt
            .query_map((), |row| row.get::<_, String>(0))
            .expect("account query failed");
        rows.map(|r| r.unwrap()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    #[test]
    fn create_and_reload() {
        let db = test_db();
        let accounts = AccountsTable::new(&db);

        {
            let mut a = accounts.create_new("domob");
            assert!(!a.is_initialised());
            a.set_faction(Faction::Red);
            a.add_balance(50);
        }

        let a = accounts.get_by_name("domob").unwrap();
        assert!(a.is_initialised());
        assert_eq!(a.faction(), Faction::Red);
        assert_eq!(a.balance(), 50);
        assert_eq!(a.fame(), 100);
        assert_eq!(a.kills(), 0);

        assert!(accounts.get_by_name("other").is_none());
    }

    #[test]
    fn untouched_handles_do_not_write() {
        let db = test_db();
        let accounts = AccountsTable::new(&db);
        {
            let mut a = accounts.create_new("domob");
            a.add_balance(10);
        }
        {
            let _a = accounts.get_by_name("domob").unwrap();
        }
        assert_eq!(accounts.get_by_name("domob").unwrap().balance(), 10);
    }

    #[test]
    fn initialised_query_skips_fresh_accounts() {
        let db = test_db();
        let accounts = AccountsTable::new(&db);
        accounts.create_new("foo");
        {
            let mut a = accounts.create_new("bar");
            a.set_faction(Faction::Blue);
        }
        assert_eq!(accounts.query_initialised(), vec!["bar".to_owned()]);
        assert_eq!(
            accounts.query_all(),
            vec!["bar".to_owned(), "foo".to_owned()]
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn balance_cannot_go_negative() {
        let db = test_db();
        let accounts = AccountsTable::new(&db);
        let mut a = accounts.create_new("domob");
        a.add_balance(-1);
    }

    #[test]
    #[should_panic(expected = "conflicting handle")]
    fn duplicate_handles_fail() {
        let db = test_db();
        let accounts = AccountsTable::new(&db);
        {
            let mut a = accounts.create_new("domob");
            a.add_balance(1);
        }
        let _first = accounts.get_by_name("domob");
        let _second = accounts.get_by_name("domob");
    }
}
