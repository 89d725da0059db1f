//! Lazy deserialisation wrapper for blob-stored records.
//!
//! The record stays as raw bytes until first read and tracks whether it was
//! modified.  On write-back, an unmodified record reuses its original bytes
//! verbatim, so round-tripping is byte-stable regardless of encoder
//! details.

use std::cell::{Ref, RefCell};

use serde::de::DeserializeOwned;
use serde::Serialize;

enum Inner<T> {
    /// Raw bytes from the database, not yet decoded.
    Unparsed(Vec<u8>),
    Parsed {
        msg: T,
        dirty: bool,
        /// Original encoding, kept for byte-stable clean write-back.
        original: Option<Vec<u8>>,
    },
}

pub struct LazyRecord<T> {
    inner: RefCell<Inner<T>>,
}

impl<T: Default + Serialize + DeserializeOwned> LazyRecord<T> {
    /// Wraps raw database bytes; nothing is decoded yet.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            inner: RefCell::new(Inner::Unparsed(data)),
        }
    }

    /// A fresh, default-valued record (for newly created entities).
    pub fn new_default() -> Self {
        Self {
            inner: RefCell::new(Inner::Parsed {
                msg: T::default(),
                dirty: false,
                original: None,
            }),
        }
    }

    fn ensure_parsed(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Inner::Unparsed(data) = &mut *inner {
            let bytes = std::mem::take(data);
            let msg: T = bincode::deserialize(&bytes)
                .unwrap_or_else(|e| panic!("undecodable record blob in database: {e}"));
            *inner = Inner::Parsed {
                msg,
                dirty: false,
                original: Some(bytes),
            };
        }
    }

    /// Read-only access, decoding on first use.
    pub fn get(&self) -> Ref<'_, T> {
        self.ensure_parsed();
        Ref::map(self.inner.borrow(), |inner| match inner {
            Inner::Parsed { msg, .. } => msg,
            Inner::Unparsed(_) => unreachable!("record still unparsed"),
        })
    }

    /// Mutable access; marks the record dirty.
    pub fn mutate(&mut self) -> &mut T {
        self.ensure_parsed();
        match self.inner.get_mut() {
            Inner::Parsed { msg, dirty, .. } => {
                *dirty = true;
                msg
            }
            Inner::Unparsed(_) => unreachable!("record still unparsed"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        match &*self.inner.borrow() {
            Inner::Unparsed(_) => false,
            Inner::Parsed {
                dirty, original, ..
            } => *dirty || original.is_none(),
        }
    }

    /// Serialised form for binding into a statement.  Clean records return
    /// the exact bytes they were loaded from.
    pub fn serialised(&self) -> Vec<u8> {
        match &*self.inner.borrow() {
            Inner::Unparsed(data) => data.clone(),
            Inner::Parsed {
                msg,
                dirty,
                original,
            } => {
                if !dirty {
                    if let Some(orig) = original {
                        return orig.clone();
                    }
                }
                bincode::serialize(msg).expect("record encoding failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::{CharacterData, Inventory};

    #[test]
    fn default_record_round_trip() {
        let rec: LazyRecord<Inventory> = LazyRecord::new_default();
        assert!(rec.get().is_empty());
        assert!(!rec.is_dirty() || rec.serialised().len() > 0);

        let decoded: Inventory = bincode::deserialize(&rec.serialised()).unwrap();
        assert_eq!(decoded, Inventory::default());
    }

    #[test]
    fn clean_records_keep_original_bytes() {
        let mut orig: LazyRecord<Inventory> = LazyRecord::new_default();
        orig.mutate().add("raw a", 3);
        let bytes = orig.serialised();

        let rec: LazyRecord<Inventory> = LazyRecord::from_bytes(bytes.clone());
        assert!(!rec.is_dirty());
        // Reading does not dirty the record, and write-back is byte-stable.
        assert_eq!(rec.get().get("raw a"), 3);
        assert!(!rec.is_dirty());
        assert_eq!(rec.serialised(), bytes);
    }

    #[test]
    fn mutation_marks_dirty_and_reencodes() {
        let mut orig: LazyRecord<Inventory> = LazyRecord::new_default();
        orig.mutate().add("raw a", 3);
        let bytes = orig.serialised();

        let mut rec: LazyRecord<Inventory> = LazyRecord::from_bytes(bytes.clone());
        rec.mutate().add("raw b", 1);
        assert!(rec.is_dirty());
        let updated = rec.serialised();
        assert_ne!(updated, bytes);

        let decoded: Inventory = bincode::deserialize(&updated).unwrap();
        assert_eq!(decoded.get("raw a"), 3);
        assert_eq!(decoded.get("raw b"), 1);
    }

    #[test]
    fn larger_record_types_encode() {
        let mut rec: LazyRecord<CharacterData> = LazyRecord::new_default();
        rec.mutate().vehicle = "rv st".to_owned();
        rec.mutate().fitments.push("lf gun".to_owned());
        let decoded: CharacterData = bincode::deserialize(&rec.serialised()).unwrap();
        assert_eq!(decoded.vehicle, "rv st");
        assert_eq!(decoded.fitments, vec!["lf gun".to_owned()]);
    }
}
