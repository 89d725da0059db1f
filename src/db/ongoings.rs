//! Ongoing-operation rows: actions queued for a future block height.

use rusqlite::Row;
use tracing::debug;

use super::lazy::LazyRecord;
use super::records::{IdT, OngoingPayload};
use super::tracker::TrackerGuard;
use super::Database;

/// Serialisable wrapper around the payload; the variant tag is what the
/// scheduler dispatches on.
#[derive(
    Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
pub struct OngoingProto {
    pub payload: OngoingPayload,
}

impl Default for OngoingProto {
    fn default() -> Self {
        Self {
            payload: OngoingPayload::Prospection,
        }
    }
}

/// Write-back handle for one ongoing operation.
pub struct OngoingOperation<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    id: IdT,
    height: u64,
    character: Option<IdT>,
    building: Option<IdT>,
    proto: LazyRecord<OngoingProto>,
    is_new: bool,
    dirty_fields: bool,
}

impl<'a> OngoingOperation<'a> {
    fn from_row(db: &'a Database, row: &Row<'_>) -> OngoingOperation<'a> {
        let id: IdT = row.get(0).unwrap();
        let tracker = db.track_handle("ongoing", id);
        OngoingOperation {
            db,
            _tracker: tracker,
            id,
            height: row.get(1).unwrap(),
            character: row.get(2).unwrap(),
            building: row.get(3).unwrap(),
            proto: LazyRecord::from_bytes(row.get(4).unwrap()),
            is_new: false,
            dirty_fields: false,
        }
    }

    pub fn id(&self) -> IdT {
        self.id
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn set_height(&mut self, height: u64) {
        self.height = height;
        self.dirty_fields = true;
    }

    pub fn character_id(&self) -> Option<IdT> {
        self.character
    }

    pub fn set_character_id(&mut self, id: IdT) {
        self.character = Some(id);
        self.dirty_fields = true;
    }

    pub fn building_id(&self) -> Option<IdT> {
        self.building
    }

    pub fn set_building_id(&mut self, id: IdT) {
        self.building = Some(id);
        self.dirty_fields = true;
    }

    pub fn payload(&self) -> std::cell::Ref<'_, OngoingPayload> {
        std::cell::Ref::map(self.proto.get(), |p| &p.payload)
    }

    pub fn set_payload(&mut self, payload: OngoingPayload) {
        self.proto.mutate().payload = payload;
    }
}

impl Drop for OngoingOperation<'_> {
    fn drop(&mut self) {
        if !self.is_new && !self.dirty_fields && !self.proto.is_dirty() {
            return;
        }

        debug!(id = self.id, height = self.height, "ongoing write-back");
        self.db
            .prepare(
                r#"
                INSERT OR REPLACE INTO `ongoing_operations`
                    (`id`, `height`, `character`, `building`, `proto`)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .execute((
                self.id,
                self.height,
                self.character,
                self.building,
                self.proto.serialised(),
            ))
            .expect("failed to write ongoing operation");
    }
}

pub struct OngoingsTable<'a> {
    db: &'a Database,
}

impl<'a> OngoingsTable<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Creates a new operation scheduled initially for the given height.
    pub fn create_new(&self, height: u64) -> OngoingOperation<'a> {
        let id = self.db.next_id();
        OngoingOperation {
            db: self.db,
            _tracker: self.db.track_handle("ongoing", id),
            id,
            height,
            character: None,
            building: None,
            proto: LazyRecord::new_default(),
            is_new: true,
            dirty_fields: false,
        }
    }

    pub fn get_by_id(&self, id: IdT) -> Option<OngoingOperation<'a>> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `id`, `height`, `character`, `building`, `proto`
                FROM `ongoing_operations` WHERE `id` = ?1
            "#,
        );
        let mut rows = stmt.query((id,)).expect("ongoing query failed");
        rows.next()
            .expect("ongoing row read failed")
            .map(|row| OngoingOperation::from_row(self.db, row))
    }

    /// All operations due at or before the given height, in ascending ID
    /// order.  Entries strictly below the height indicate a missed block
    /// and are a program-logic fault, checked by the scheduler.
    pub fn query_for_height(&self, height: u64) -> Vec<IdT> {
        let mut stmt = self.db.prepare(
            r#"
            SELECT `id` FROM `ongoing_operations`
                WHERE `height` <= ?1 ORDER BY `id`
            "#,
        );
        let rows = stmt
            .query_map((height,), |row| row.get::<_, IdT>(0))
            .expect("ongoing query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn query_all(&self) -> Vec<IdT> {
        let mut stmt = self
            .db
            .prepare("SELECT `id` FROM `ongoing_operations` ORDER BY `id`");
        let rows = stmt
            .query_map((), |row| row.get::<_, IdT>(0))
            .expect("ongoing query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn query_for_building(&self, building: IdT) -> Vec<IdT> {
        let mut stmt = self.db.prepare(
            "SELECT `id` FROM `ongoing_operations` WHERE `building` = ?1 ORDER BY `id`",
        );
        let rows = stmt
            .query_map((building,), |row| row.get::<_, IdT>(0))
            .expect("ongoing query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    pub fn delete_for_height(&self, height: u64) {
        self.db
            .prepare("DELETE FROM `ongoing_operations` WHERE `height` <= ?1")
            .execute((height,))
            .expect("failed to delete processed operations");
    }

    pub fn delete_for_character(&self, character: IdT) {
        self.db
            .prepare("DELETE FROM `ongoing_operations` WHERE `character` = ?1")
            .execute((character,))
            .expect("failed to delete character operations");
    }

    pub fn delete_for_building(&self, building: IdT) {
        self.db
            .prepare("DELETE FROM `ongoing_operations` WHERE `building` = ?1")
            .execute((building,))
            .expect("failed to delete building operations");
    }

    pub fn delete_by_id(&self, id: IdT) {
        self.db
            .prepare("DELETE FROM `ongoing_operations` WHERE `id` = ?1")
            .execute((id,))
            .expect("failed to delete operation");
    }
}
