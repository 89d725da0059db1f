//! Ground loot (keyed by coordinate) and per-account building inventories.
//!
//! Both kinds are absent-iff-empty: the handle inserts the row when loot
//! first appears, and deletes it when a mutation empties the inventory.

use rusqlite::Row;
use tracing::trace;

use super::lazy::LazyRecord;
use super::records::{IdT, Inventory};
use super::tracker::TrackerGuard;
use super::Database;
use crate::hex::HexCoord;

/// Loot lying on the ground at one coordinate.
pub struct GroundLoot<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    pos: HexCoord,
    inventory: LazyRecord<Inventory>,
    is_new: bool,
}

impl<'a> GroundLoot<'a> {
    pub fn position(&self) -> HexCoord {
        self.pos
    }

    pub fn inventory(&self) -> std::cell::Ref<'_, Inventory> {
        self.inventory.get()
    }

    pub fn mutate_inventory(&mut self) -> &mut Inventory {
        self.inventory.mutate()
    }
}

impl Drop for GroundLoot<'_> {
    fn drop(&mut self) {
        if !self.inventory.is_dirty() {
            return;
        }
        let empty = self.inventory.get().is_empty();

        if self.is_new {
            if empty {
                return;
            }
            trace!(pos = %self.pos, "inserting ground loot");
            self.db
                .prepare("INSERT INTO `ground_loot` (`x`, `y`, `inventory`) VALUES (?1, ?2, ?3)")
                .execute((self.pos.x, self.pos.y, self.inventory.serialised()))
                .expect("failed to insert ground loot");
            return;
        }

        if empty {
            trace!(pos = %self.pos, "removing emptied ground loot");
            self.db
                .prepare("DELETE FROM `ground_loot` WHERE `x` = ?1 AND `y` = ?2")
                .execute((self.pos.x, self.pos.y))
                .expect("failed to delete ground loot");
            return;
        }

        self.db
            .prepare("UPDATE `ground_loot` SET `inventory` = ?3 WHERE `x` = ?1 AND `y` = ?2")
            .execute((self.pos.x, self.pos.y, self.inventory.serialised()))
            .expect("failed to update ground loot");
    }
}

pub struct GroundLootTable<'a> {
    db: &'a Database,
}

impl<'a> GroundLootTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Loot handle for the given coordinate; a fresh empty one if there is
    /// nothing there yet.
    pub fn get_by_coord(&self, pos: HexCoord) -> GroundLoot<'a> {
        let tracker = self.db.track_handle("ground loot", format!("{pos}"));
        let mut stmt = self
            .db
            .prepare("SELECT `inventory` FROM `ground_loot` WHERE `x` = ?1 AND `y` = ?2");
        let mut rows = stmt.query((pos.x, pos.y)).expect("loot query failed");
        match rows.next().expect("loot row read failed") {
            Some(row) => GroundLoot {
                db: self.db,
                _tracker: tracker,
                pos,
                inventory: LazyRecord::from_bytes(row.get(0).unwrap()),
                is_new: false,
            },
            None => GroundLoot {
                db: self.db,
                _tracker: tracker,
                pos,
                inventory: LazyRecord::new_default(),
                is_new: true,
            },
        }
    }

    /// All non-empty loot piles, ordered by coordinate.
    pub fn query_non_empty(&self) -> Vec<HexCoord> {
        let mut stmt = self
            .db
            .prepare("SELECT `x`, `y` FROM `ground_loot` ORDER BY `x`, `y`");
        let rows = stmt
            .query_map((), |row| Ok(HexCoord::new(row.get(0)?, row.get(1)?)))
            .expect("loot query failed");
        rows.map(|r| r.unwrap()).collect()
    }
}

/* ************************************************************************ */

/// Inventory of one account inside one building.
pub struct BuildingInventory<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    building: IdT,
    account: String,
    inventory: LazyRecord<Inventory>,
    is_new: bool,
}

impl<'a> BuildingInventory<'a> {
    fn from_row(db: &'a Database, row: &Row<'_>) -> BuildingInventory<'a> {
        let building: IdT = row.get(0).unwrap();
        let account: String = row.get(1).unwrap();
        let tracker = db.track_handle("building inv", format!("{building}/{account}"));
        BuildingInventory {
            db,
            _tracker: tracker,
            building,
            account,
            inventory: LazyRecord::from_bytes(row.get(2).unwrap()),
            is_new: false,
        }
    }

    pub fn building_id(&self) -> IdT {
        self.building
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn inventory(&self) -> std::cell::Ref<'_, Inventory> {
        self.inventory.get()
    }

    pub fn mutate_inventory(&mut self) -> &mut Inventory {
        self.inventory.mutate()
    }
}

impl Drop for BuildingInventory<'_> {
    fn drop(&mut self) {
        if !self.inventory.is_dirty() {
            return;
        }
        let empty = self.inventory.get().is_empty();

        if self.is_new {
            if empty {
                return;
            }
            self.db
                .prepare(
                    r#"
                    INSERT INTO `building_inventories`
                        (`building`, `account`, `inventory`) VALUES (?1, ?2, ?3)
                    "#,
                )
                .execute((self.building, &self.account, self.inventory.serialised()))
                .expect("failed to insert building inventory");
            return;
        }

        if empty {
            self.db
                .prepare(
                    "DELETE FROM `building_inventories` WHERE `building` = ?1 AND `account` = ?2",
                )
                .execute((self.building, &self.account))
                .expect("failed to delete building inventory");
            return;
        }

        self.db
            .prepare(
                r#"
                UPDATE `building_inventories` SET `inventory` = ?3
                    WHERE `building` = ?1 AND `account` = ?2
                "#,
            )
            .execute((self.building, &self.account, self.inventory.serialised()))
            .expect("failed to update building inventory");
    }
}

pub struct BuildingInventoriesTable<'a> {
    db: &'a Database,
}

impl<'a> BuildingInventoriesTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, building: IdT, account: &str) -> BuildingInventory<'a> {
        let tracker = self
            .db
            .track_handle("building inv", format!("{building}/{account}"));
        let mut stmt = self.db.prepare(
            r#"
            SELECT `building`, `account`, `inventory`
                FROM `building_inventories`
                WHERE `building` = ?1 AND `account` = ?2
            "#,
        );
        let mut rows = stmt
            .query((building, account))
            .expect("inventory query failed");
        match rows.next().expect("inventory row read failed") {
            Some(row) => {
                drop(tracker);
                BuildingInventory::from_row(self.db, row)
            }
            None => BuildingInventory {
                db: self.db,
                _tracker: tracker,
                building,
                account: account.to_owned(),
                inventory: LazyRecord::new_default(),
                is_new: true,
            },
        }
    }

    /// (building, account) keys of all inventories, ordered.
    pub fn query_all(&self) -> Vec<(IdT, String)> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `building`, `account` FROM `building_inventories`
                ORDER BY `building`, `account`
            "#,
        );
        let rows = stmt
            .query_map((), |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("inventory query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// Accounts with an inventory in the given building, ordered.
    pub fn query_for_building(&self, building: IdT) -> Vec<String> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `account` FROM `building_inventories`
                WHERE `building` = ?1 ORDER BY `account`
            "#,
        );
        let rows = stmt
            .query_map((building,), |row| row.get::<_, String>(0))
            .expect("inventory query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// Drops all inventories of a destroyed building.
    pub fn remove_building(&self, building: IdT) {
        self.db
            .prepare("DELETE FROM `building_inventories` WHERE `building` = ?1")
            .execute((building,))
            .expect("failed to remove building inventories");
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
    fn ground_loot_absent_iff_empty() {
        let db = test_db();
        let tbl = GroundLootTable::new(&db);
        let pos = HexCoord::new(3, -2);

        assert!(tbl.query_non_empty().is_empty());
        {
            let mut loot = tbl.get_by_coord(pos);
            loot.mutate_inventory().add("raw a", 5);
        }
        assert_eq!(tbl.query_non_empty(), vec![pos]);
        {
            let loot = tbl.get_by_coord(pos);
            assert_eq!(loot.inventory().get("raw a"), 5);
        }
        {
            let mut loot = tbl.get_by_coord(pos);
            loot.mutate_inventory().add("raw a", -5);
        }
        assert!(tbl.query_non_empty().is_empty());
    }

    #[test]
    fn new_empty_loot_is_not_inserted() {
        let db = test_db();
        let tbl = GroundLootTable::new(&db);
        {
            let mut loot = tbl.get_by_coord(HexCoord::new(0, 0));
            // Touching without net change still leaves it empty.
            loot.mutate_inventory().add("raw a", 1);
            loot.mutate_inventory().add("raw a", -1);
        }
        assert!(tbl.query_non_empty().is_empty());
    }

    #[test]
    fn building_inventories_lifecycle() {
        let db = test_db();
        let tbl = BuildingInventoriesTable::new(&db);

        {
            let mut inv = tbl.get(10, "domob");
            inv.mutate_inventory().add("raw b", 2);
        }
        {
            let mut inv = tbl.get(10, "andy");
            inv.mutate_inventory().add("raw b", 1);
        }
        {
            let mut inv = tbl.get(11, "domob");
            inv.mutate_inventory().add("raw c", 7);
        }

        assert_eq!(
            tbl.query_all(),
            vec![
                (10, "andy".to_owned()),
                (10, "domob".to_owned()),
                (11, "domob".to_owned()),
            ]
        );
        assert_eq!(
            tbl.query_for_building(10),
            vec!["andy".to_owned(), "domob".to_owned()]
        );

        tbl.remove_building(10);
        assert_eq!(tbl.query_all(), vec![(11, "domob".to_owned())]);
        assert_eq!(tbl.get(11, "domob").inventory().get("raw c"), 7);
    }
}
