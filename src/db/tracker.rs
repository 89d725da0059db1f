//! Registry enforcing that at most one mutable handle exists at any moment
//! for a given (entity kind, key) pair.
//!
//! Aliasing write-back handles would observe stale data or silently lose
//! updates, so a duplicate acquisition is treated as a program-logic fault.
//! The set is mutex-protected because read-only state views may run on
//! other threads, but mutable handles only ever come from the block
//! processor's thread.

use std::collections::BTreeSet;

use parking_lot::Mutex;

pub struct HandleTracker {
    active: Mutex<BTreeSet<(&'static str, String)>>,
}

impl HandleTracker {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn acquire(&self, kind: &'static str, key: String) -> TrackerGuard<'_> {
        let mut active = self.active.lock();
        let inserted = active.insert((kind, key.clone()));
        assert!(inserted, "conflicting handle for {kind} {key}");
        TrackerGuard {
            tracker: self,
            kind,
            key,
        }
    }

    fn release(&self, kind: &'static str, key: &str) {
        let mut active = self.active.lock();
        let removed = active.remove(&(kind, key.to_owned()));
        assert!(removed, "releasing untracked handle for {kind} {key}");
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl Default for HandleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII registration of one live handle.
pub struct TrackerGuard<'a> {
    tracker: &'a HandleTracker,
    kind: &'static str,
    key: String,
}

impl Drop for TrackerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(self.kind, &self.key);
    }
}
