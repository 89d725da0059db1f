//! Process-wide counters: prospecting-prize item counts and money supply.

use super::Database;
use crate::amounts::Amount;

/// How many of each (prize) item have been found so far.
pub struct ItemCounts<'a> {
    db: &'a Database,
}

impl<'a> ItemCounts<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get_found(&self, name: &str) -> u32 {
        self.db
            .prepare("SELECT `found` FROM `item_counts` WHERE `name` = ?1")
            .query_row((name,), |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn increment_found(&self, name: &str) {
        let cur = self.get_found(name);
        self.db
            .prepare("INSERT OR REPLACE INTO `item_counts` (`name`, `found`) VALUES (?1, ?2)")
            .execute((name, cur + 1))
            .expect("failed to update item count");
    }

    /// All counters, ordered by name.
    pub fn query_all(&self) -> Vec<(String, u32)> {
        let mut stmt = self
            .db
            .prepare("SELECT `name`, `found` FROM `item_counts` ORDER BY `name`");
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("item count query failed");
        rows.map(|r| r.unwrap()).collect()
    }
}

/// Tracked vCHI entering the game economy (burnsale mints, god-mode gifts).
pub struct MoneySupply<'a> {
    db: &'a Database,
}

impl<'a> MoneySupply<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> Amount {
        self.db
            .prepare("SELECT `amount` FROM `money_supply` WHERE `name` = ?1")
            .query_row((key,), |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn increment(&self, key: &str, value: Amount) {
        assert!(value >= 0, "money supply decrement for {key}");
        let cur = self.get(key);
        self.db
            .prepare("INSERT OR REPLACE INTO `money_supply` (`name`, `amount`) VALUES (?1, ?2)")
            .execute((key, cur + value))
            .expect("failed to update money supply");
    }

    pub fn query_all(&self) -> Vec<(String, Amount)> {
        let mut stmt = self
            .db
            .prepare("SELECT `name`, `amount` FROM `money_supply` ORDER BY `name`");
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("money supply query failed");
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
    fn item_counts() {
        let db = test_db();
        let counts = ItemCounts::new(&db);
        assert_eq!(counts.get_found("gold prize"), 0);
        counts.increment_found("gold prize");
        counts.increment_found("gold prize");
        counts.increment_found("silver prize");
        assert_eq!(counts.get_found("gold prize"), 2);
        assert_eq!(counts.get_found("silver prize"), 1);
        assert_eq!(
            counts.query_all(),
            vec![("gold prize".to_owned(), 2), ("silver prize".to_owned(), 1)]
        );
    }

    #[test]
    fn money_supply() {
        let db = test_db();
        let supply = MoneySupply::new(&db);
        assert_eq!(supply.get("burnsale"), 0);
        supply.increment("burnsale", 500);
        supply.increment("burnsale", 100);
        supply.increment("gifted", 42);
        assert_eq!(supply.get("burnsale"), 600);
        assert_eq!(supply.get("gifted"), 42);
    }
}
