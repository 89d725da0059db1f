//! Rolling per-victim attacker lists.
//!
//! For each character victim we keep the set of character attackers that
//! damaged it recently; entries carry the height of the latest hit and are
//! pruned once older than the configured window.  This feeds fame updates
//! on kills.

use std::collections::BTreeSet;

use tracing::debug;

use super::records::IdT;
use super::Database;

pub struct DamageLists<'a> {
    db: &'a Database,
    height: u64,
}

impl<'a> DamageLists<'a> {
    pub fn new(db: &'a Database, height: u64) -> Self {
        Self { db, height }
    }

    /// Records that `attacker` damaged `victim` in the current block.
    /// Repeated hits refresh the entry's height.
    pub fn add_entry(&self, victim: IdT, attacker: IdT) {
        self.db
            .prepare(
                r#"
                INSERT OR REPLACE INTO `damage_lists`
                    (`victim`, `attacker`, `height`) VALUES (?1, ?2, ?3)
                "#,
            )
            .execute((victim, attacker, self.height))
            .expect("failed to record damage entry");
    }

    /// Drops all entries older than the given number of blocks.
    pub fn remove_old(&self, blocks: u64) {
        if self.height < blocks {
            return;
        }
        let cutoff = self.height - blocks;
        let removed = self
            .db
            .prepare("DELETE FROM `damage_lists` WHERE `height` <= ?1")
            .execute((cutoff,))
            .expect("failed to prune damage lists");
        if removed > 0 {
            debug!(removed, cutoff, "pruned damage list entries");
        }
    }

    /// Removes all entries referencing a character that no longer exists.
    pub fn remove_character(&self, id: IdT) {
        self.db
            .prepare("DELETE FROM `damage_lists` WHERE `victim` = ?1 OR `attacker` = ?1")
            .execute((id,))
            .expect("failed to remove character from damage lists");
    }

    /// The set of attackers recorded for the given victim.
    pub fn get_attackers(&self, victim: IdT) -> BTreeSet<IdT> {
        let mut stmt = self.db.prepare(
            "SELECT `attacker` FROM `damage_lists` WHERE `victim` = ?1 ORDER BY `attacker`",
        );
        let rows = stmt
            .query_map((victim,), |row| row.get::<_, IdT>(0))
            .expect("damage list query failed");
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
    fn entries_and_attackers() {
        let db = test_db();
        let dl = DamageLists::new(&db, 100);
        dl.add_entry(1, 2);
        dl.add_entry(1, 3);
        dl.add_entry(2, 3);
        assert_eq!(dl.get_attackers(1), BTreeSet::from([2, 3]));
        assert_eq!(dl.get_attackers(2), BTreeSet::from([3]));
        assert!(dl.get_attackers(3).is_empty());
    }

    #[test]
    fn pruning_respects_refreshes() {
        let db = test_db();
        DamageLists::new(&db, 100).add_entry(1, 2);
        DamageLists::new(&db, 105).add_entry(1, 3);
        // Entry (1, 2) is refreshed at height 110.
        DamageLists::new(&db, 110).add_entry(1, 2);

        let dl = DamageLists::new(&db, 115);
        dl.remove_old(10);
        assert_eq!(dl.get_attackers(1), BTreeSet::from([2]));
    }

    #[test]
    fn character_removal() {
        let db = test_db();
        let dl = DamageLists::new(&db, 100);
        dl.add_entry(1, 2);
        dl.add_entry(2, 1);
        dl.add_entry(2, 3);
        dl.remove_character(1);
        assert!(dl.get_attackers(1).is_empty());
        assert_eq!(dl.get_attackers(2), BTreeSet::from([3]));
    }
}
