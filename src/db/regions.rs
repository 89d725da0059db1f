//! Region rows: prospection state and remaining resource reserve.
//!
//! Regions exist lazily: reading an untouched region yields a default
//! handle that is only inserted once modified.  Every write also bumps the
//! last-modified-height column, which feeds incremental state dissemination
//! via `query_modified_since`.

use tracing::trace;

use super::lazy::LazyRecord;
use super::records::RegionData;
use super::tracker::TrackerGuard;
use super::Database;
use crate::map::RegionId;

/// Write-back handle for one region row.
pub struct Region<'a> {
    db: &'a Database,
    _tracker: TrackerGuard<'a>,
    id: RegionId,
    height: u64,
    resource_left: i64,
    proto: LazyRecord<RegionData>,
    dirty_fields: bool,
}

impl<'a> Region<'a> {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn data(&self) -> std::cell::Ref<'_, RegionData> {
        self.proto.get()
    }

    pub fn mutate_data(&mut self) -> &mut RegionData {
        self.proto.mutate()
    }

    pub fn resource_left(&self) -> i64 {
        self.resource_left
    }

    pub fn set_resource_left(&mut self, left: i64) {
        assert!(left >= 0, "negative resource reserve for region {}", self.id);
        self.resource_left = left;
        self.dirty_fields = true;
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        if !self.dirty_fields && !self.proto.is_dirty() {
            return;
        }

        trace!(id = self.id, "region write-back");
        self.db
            .prepare(
                r#"
                INSERT OR REPLACE INTO `regions`
                    (`id`, `modifiedheight`, `resourceleft`, `proto`)
                    VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .execute((
                self.id,
                self.height,
                self.resource_left,
                self.proto.serialised(),
            ))
            .expect("failed to write region");
    }
}

/// Table object for regions.  Carries the current block height so that
/// write-backs can maintain the modified-height column automatically.
pub struct RegionsTable<'a> {
    db: &'a Database,
    height: u64,
}

impl<'a> RegionsTable<'a> {
    pub fn new(db: &'a Database, height: u64) -> Self {
        Self { db, height }
    }

    pub fn get_by_id(&self, id: RegionId) -> Region<'a> {
        let tracker = self.db.track_handle("region", id);
        let mut stmt = self.db.prepare(
            "SELECT `resourceleft`, `proto` FROM `regions` WHERE `id` = ?1",
        );
        let mut rows = stmt.query((id,)).expect("region query failed");
        match rows.next().expect("region row read failed") {
            Some(row) => Region {
                db: self.db,
                _tracker: tracker,
                id,
                height: self.height,
                resource_left: row.get(0).unwrap(),
                proto: LazyRecord::from_bytes(row.get(1).unwrap()),
                dirty_fields: false,
            },
            None => Region {
                db: self.db,
                _tracker: tracker,
                id,
                height: self.height,
                resource_left: 0,
                proto: LazyRecord::new_default(),
                dirty_fields: false,
            },
        }
    }

    /// IDs of all regions with a database row, ordered.
    pub fn query_all(&self) -> Vec<RegionId> {
        let mut stmt = self.db.prepare("SELECT `id` FROM `regions` ORDER BY `id`");
        let rows = stmt
            .query_map((), |row| row.get::<_, RegionId>(0))
            .expect("region query failed");
        rows.map(|r| r.unwrap()).collect()
    }

    /// IDs of regions modified at or after the given height, ordered.
    pub fn query_modified_since(&self, height: u64) -> Vec<RegionId> {
        let mut stmt = self.db.prepare(
            "SELECT `id` FROM `regions` WHERE `modifiedheight` >= ?1 ORDER BY `id`",
        );
        let rows = stmt
            .query_map((height,), |row| row.get::<_, RegionId>(0))
            .expect("region query failed");
        rows.map(|r| r.unwrap()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::Prospection;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.setup_schema().unwrap();
        db
    }

    #[test]
    fn untouched_regions_are_not_persisted() {
        let db = test_db();
        let regions = RegionsTable::new(&db, 5);
        {
            let r = regions.get_by_id(100);
            assert_eq!(r.resource_left(), 0);
            assert!(r.data().prospection.is_none());
        }
        assert!(regions.query_all().is_empty());
    }

    #[test]
    fn writes_update_modified_height() {
        let db = test_db();
        {
            let regions = RegionsTable::new(&db, 5);
            let mut r = regions.get_by_id(100);
            r.set_resource_left(42);
        }
        {
            let regions = RegionsTable::new(&db, 9);
            let mut r = regions.get_by_id(200);
            r.mutate_data().prospection = Some(Prospection {
                name: "domob".to_owned(),
                height: 9,
                resource: "raw a".to_owned(),
            });
        }

        let regions = RegionsTable::new(&db, 10);
        assert_eq!(regions.query_all(), vec![100, 200]);
        assert_eq!(regions.query_modified_since(6), vec![200]);
        assert_eq!(regions.query_modified_since(0), vec![100, 200]);
        assert_eq!(regions.get_by_id(100).resource_left(), 42);
    }

    #[test]
    fn rereading_keeps_data() {
        let db = test_db();
        let regions = RegionsTable::new(&db, 7);
        {
            let mut r = regions.get_by_id(1);
            r.set_resource_left(10);
            r.mutate_data().prospecting_character = Some(4);
        }
        let r = regions.get_by_id(1);
        assert_eq!(r.resource_left(), 10);
        assert_eq!(r.data().prospecting_character, Some(4));
    }
}
