//! Store adapter and entity tables.
//!
//! `Database` wraps the SQLite connection with cached prepared statements
//! and the monotone ID pools.  Each entity kind has a table object handing
//! out scoped, move-only handles; a handle synchronises its changes back to
//! the store when dropped, and the process-wide tracker guarantees that no
//! two live mutable handles alias the same row.

pub mod accounts;
pub mod buildings;
pub mod characters;
pub mod counts;
pub mod damage_lists;
pub mod dex;
pub mod fighter;
pub mod inventories;
pub mod lazy;
pub mod ongoings;
pub mod records;
pub mod regions;
pub mod schema;
pub mod targets;
pub mod tracker;

use rusqlite::{CachedStatement, Connection, OpenFlags};

use crate::errors::StoreResult;
use records::IdT;
use tracker::{HandleTracker, TrackerGuard};

/// Connection wrapper giving typed access to the game-state database.
pub struct Database {
    conn: Connection,
    handles: HandleTracker,
}

impl Database {
    pub fn open(path: &std::path::Path) -> StoreResult<Database> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Ok(Self::from_connection(conn))
    }

    /// In-memory instance, used by tests and the pending-state preview.
    pub fn open_in_memory() -> StoreResult<Database> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Database {
        conn.set_prepared_statement_cache_capacity(256);
        Database {
            conn,
            handles: HandleTracker::new(),
        }
    }

    /// Prepares (or reuses) a statement.  Preparation failures are
    /// programming faults: the SQL is entirely static.
    pub fn prepare(&self, sql: &str) -> CachedStatement<'_> {
        self.conn
            .prepare_cached(sql)
            .unwrap_or_else(|e| panic!("failed to prepare statement: {e}\n{sql}"))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates all tables and seeds the ID pools.
    pub fn setup_schema(&self) -> StoreResult<()> {
        schema::setup(&self.conn)
    }

    /// Registers a live handle for the given (kind, key) pair.  Panics if
    /// one is already active.
    pub fn track_handle(&self, kind: &'static str, key: impl ToString) -> TrackerGuard<'_> {
        self.handles.acquire(kind, key.to_string())
    }

    fn pool_next(&self, pool: &str) -> IdT {
        let cur: IdT = self
            .prepare("SELECT `next` FROM `id_pool` WHERE `name` = ?1")
            .query_row((pool,), |row| row.get(0))
            .unwrap_or_else(|e| panic!("missing id pool {pool}: {e}"));
        self.prepare("UPDATE `id_pool` SET `next` = `next` + 1 WHERE `name` = ?1")
            .execute((pool,))
            .expect("failed to bump id pool");
        cur
    }

    /// Next ID from the main entity pool.
    pub fn next_id(&self) -> IdT {
        self.pool_next("entity")
    }

    /// Next ID from the log pool (trade history), kept separate so log rows
    /// do not perturb entity identity assignment in replays.
    pub fn next_log_id(&self) -> IdT {
        self.pool_next("log")
    }

    /// Makes sure the next entity ID handed out is above `n`.  Used after
    /// state initialisation so replays assign stable IDs.
    pub fn reserve_ids_up_to(&self, n: IdT) {
        self.prepare("UPDATE `id_pool` SET `next` = MAX(`next`, ?1 + 1) WHERE `name` = 'entity'")
            .execute((n,))
            .expect("failed to reserve ids");
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
    fn id_pools_are_monotone_and_separate() {
        let db = test_db();
        assert_eq!(db.next_id(), 1);
        assert_eq!(db.next_id(), 2);
        assert_eq!(db.next_log_id(), 1);
        assert_eq!(db.next_id(), 3);
        assert_eq!(db.next_log_id(), 2);
    }

    #[test]
    fn reserving_skips_ids() {
        let db = test_db();
        assert_eq!(db.next_id(), 1);
        db.reserve_ids_up_to(1_000);
        assert_eq!(db.next_id(), 1_001);
        // Reserving below the current value is a no-op.
        db.reserve_ids_up_to(10);
        assert_eq!(db.next_id(), 1_002);
    }

    #[test]
    fn schema_setup_is_idempotent() {
        let db = test_db();
        db.setup_schema().unwrap();
        assert_eq!(db.next_id(), 1);
    }

    #[test]
    fn state_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");

        {
            let db = Database::open(&path).unwrap();
            db.setup_schema().unwrap();
            assert_eq!(db.next_id(), 1);
            assert_eq!(db.next_id(), 2);
        }

        let db = Database::open(&path).unwrap();
        db.setup_schema().unwrap();
        assert_eq!(db.next_id(), 3, "id pool persisted across reopen");
    }
}
