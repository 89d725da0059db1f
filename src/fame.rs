//! Fame bookkeeping on kills.
//!
//! The rolling damage lists record which characters hit which victims
//! recently.  On every character kill, the victim loses fame and the
//! attackers within one fame level of it gain a share.  All deltas are
//! summed over the whole block and applied at the end (clamped to the fame
//! range), so the outcome does not depend on kill ordering.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::context::Context;
use crate::db::accounts::{AccountsTable, MAX_FAME};
use crate::db::characters::CharacterTable;
use crate::db::damage_lists::DamageLists;
use crate::db::records::{IdT, TargetId, TargetKind};
use crate::db::Database;

/// Fame transferred (at most) per kill.
const FAME_PER_KILL: i64 = 100;

pub struct FameUpdater<'a, 'c> {
    db: &'a Database,
    ctx: &'c Context<'c>,
    dl: DamageLists<'a>,
    /// Scheduled fame deltas per account, applied in `finish`.
    deltas: BTreeMap<String, i64>,
    finished: bool,
}

impl<'a, 'c> FameUpdater<'a, 'c> {
    pub fn new(db: &'a Database, ctx: &'c Context<'c>) -> Self {
        Self {
            db,
            ctx,
            dl: DamageLists::new(db, ctx.height()),
            deltas: BTreeMap::new(),
            finished: false,
        }
    }

    pub fn damage_lists(&self) -> &DamageLists<'a> {
        &self.dl
    }

    /// Prunes damage-list entries that fell out of the rolling window.
    /// Called once at block start.
    pub fn prune_damage_lists(&self) {
        self.dl.remove_old(self.ctx.params().damage_list_blocks);
    }

    /// Fame level of a player: the bracket deciding whether an attacker is
    /// "in range" of a victim.
    fn level(fame: i64) -> i64 {
        (fame / 1_000).min(8)
    }

    fn update_for_character_kill(&mut self, victim: IdT) {
        debug!(victim, "updating fame for kill");
        let characters = CharacterTable::new(self.db);
        let accounts = AccountsTable::new(self.db);

        let victim_owner = characters
            .get_by_id(victim)
            .expect("killed character does not exist")
            .owner()
            .to_owned();
        let victim_fame = accounts.get_by_name(&victim_owner).unwrap().fame();
        let victim_level = Self::level(victim_fame);

        // Distinct accounts behind the attacking characters.
        let mut owners = BTreeSet::new();
        for attacker in self.dl.get_attackers(victim) {
            let c = characters
                .get_by_id(attacker)
                .expect("attacker does not exist");
            owners.insert(c.owner().to_owned());
        }

        // First pass: count the kill for everyone, find in-range killers.
        let mut in_range = Vec::new();
        for owner in &owners {
            let mut a = accounts.get_by_name(owner).unwrap();
            a.set_kills(a.kills() + 1);

            let level = Self::level(a.fame());
            if (level - victim_level).abs() <= 1 {
                in_range.push(owner.clone());
            }
        }

        if in_range.is_empty() {
            return;
        }

        let fame_lost = victim_fame.min(FAME_PER_KILL);
        let fame_per_killer = fame_lost / in_range.len() as i64;
        info!(
            victim,
            fame_lost,
            killers = in_range.len(),
            "fame redistribution"
        );

        for owner in &in_range {
            *self.deltas.entry(owner.clone()).or_insert(0) += fame_per_killer;
        }
        *self.deltas.entry(victim_owner).or_insert(0) -= fame_lost;
    }

    /// Updates fame for the given killed fighter.  Building kills carry no
    /// fame.
    pub fn update_for_kill(&mut self, target: &TargetId) {
        if target.kind != TargetKind::Character {
            return;
        }
        self.update_for_character_kill(target.id);
    }

    /// Applies all scheduled deltas, clamped into the valid fame range.
    pub fn finish(mut self) {
        self.finished = true;
        let accounts = AccountsTable::new(self.db);
        for (name, delta) in std::mem::take(&mut self.deltas) {
            let mut a = accounts.get_by_name(&name).unwrap();
            let fame = (a.fame() + delta).clamp(0, MAX_FAME);
            debug!(%name, delta, fame, "applying fame delta");
            a.set_fame(fame);
        }
    }
}

impl Drop for FameUpdater<'_, '_> {
    fn drop(&mut self) {
        // Losing scheduled deltas silently would corrupt consensus state.
        assert!(
            self.finished || self.deltas.is_empty(),
            "fame updater dropped with unapplied deltas"
        );
    }
}
