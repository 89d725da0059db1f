//! Per-block combat processing.
//!
//! Three sub-phases run in consensus order: damage application (with
//! gain-HP reconciliation and self-destruct cascades), kill processing, and
//! HP regeneration.  Target selection runs separately at the end of the
//! block pipeline and feeds the next block's damage phase.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, trace};

use crate::context::Context;
use crate::db::characters::CharacterTable;
use crate::db::damage_lists::DamageLists;
use crate::db::fighter::{Fighter, FighterTable};
use crate::db::inventories::{BuildingInventoriesTable, GroundLootTable};
use crate::db::ongoings::OngoingsTable;
use crate::db::records::{
    Attack, CombatEffects, Damage, Hp, HpPair, Inventory, OngoingPayload, StatModifier, TargetId,
    TargetKind,
};
use crate::db::regions::RegionsTable;
use crate::db::targets::{TargetFinder, Targeting};
use crate::db::{buildings::BuildingsTable, Database};
use crate::fame::FameUpdater;
use crate::hex::{CoordT, HexCoord};
use crate::rng::BlockRng;

/// Chance (in percent) that an inventory unit inside a destroyed building
/// drops on the ground instead of being destroyed.
const BUILDING_INVENTORY_DROP_PERCENT: u64 = 30;

/// Modifications to combat stats of one entity, combining low-HP boosts and
/// received effects.
#[derive(Clone, Debug, Default)]
struct CombatModifier {
    damage: StatModifier,
    range: StatModifier,
}

/// Computes the modifier in force for a given entity.
fn compute_modifier(f: &Fighter<'_>) -> CombatModifier {
    let mut modifier = CombatModifier::default();

    let cd = f.combat_data();
    let hp = f.hp();
    let max_hp = f.regen_data().max_hp;

    for boost in &cd.low_hp_boosts {
        // hp / max > p / 100 iff 100 hp > p max
        if 100 * hp.armour > boost.max_hp_percent * max_hp.armour {
            continue;
        }
        modifier.damage.add(&boost.damage);
        modifier.range.add(&boost.range);
    }

    modifier.range.add(&f.effects().range);
    modifier
}

/* ************************************************************************ */

/// Runs target selection for one fighter.
fn select_target(
    targets: &TargetFinder<'_>,
    rng: &mut BlockRng,
    ctx: &Context<'_>,
    mut f: Fighter<'_>,
) {
    let pos = f.combat_position();
    if ctx.map().is_no_combat(&pos) {
        trace!(?pos, "fighter in no-combat zone, clearing target");
        f.clear_target();
        return;
    }

    let own_id = f.id_as_target();
    let (hostile_range, friendly_range) = {
        let cd = f.combat_data();
        (cd.attack_range(false), cd.attack_range(true))
    };

    // Fighters with any hostile attack pick among enemies; pure support
    // entities pick among friendlies.
    let (base_range, targeting) = match (hostile_range, friendly_range) {
        (Some(r), _) => (r, Targeting::Enemies),
        (None, Some(r)) => (r, Targeting::Friendlies),
        (None, None) => return,
    };

    let modifier = compute_modifier(&f);
    let range = modifier.range.apply(i64::from(base_range)) as CoordT;

    let mut closest_range = CoordT::MAX;
    let mut closest_targets: Vec<TargetId> = Vec::new();
    targets.process_l1_targets(&pos, range, f.faction(), targeting, |c, id| {
        if *id == own_id {
            return;
        }
        if ctx.map().is_no_combat(c) {
            trace!(?id, "candidate in no-combat zone ignored");
            return;
        }

        let cur_dist = HexCoord::distance_l1(&pos, c);
        if closest_targets.is_empty() || cur_dist < closest_range {
            closest_range = cur_dist;
            closest_targets = vec![*id];
            return;
        }
        if cur_dist == closest_range {
            closest_targets.push(*id);
        }
    });

    if closest_targets.is_empty() {
        f.clear_target();
        return;
    }

    trace!(
        candidates = closest_targets.len(),
        range = closest_range,
        "picking target"
    );
    let ind = rng.next_int(closest_targets.len() as u64) as usize;
    f.set_target(closest_targets[ind]);
}

/// Target selection for all fighters; feeds next block's damage phase.
pub fn find_combat_targets(db: &Database, rng: &mut BlockRng, ctx: &Context<'_>) {
    let fighters = FighterTable::new(db);
    let targets = TargetFinder::new(db);
    fighters.process_with_attacks(|f| select_target(&targets, rng, ctx, f));
}

/* ************************************************************************ */

/// Computes the damage done vs shield and armour for a damage roll and the
/// target's remaining HP, honouring the shield/armour percentages.  Always
/// rounds toward zero so the total never exceeds the roll.
fn compute_damage(dmg: u32, spec: &Damage, hp: &Hp) -> HpPair {
    let mut done = HpPair::default();
    let mut dmg = u64::from(dmg);

    let shield_percent = u64::from(spec.shield_percent.unwrap_or(100));
    let armour_percent = u64::from(spec.armour_percent.unwrap_or(100));

    let available_for_shield = dmg * shield_percent / 100;
    done.shield = available_for_shield.min(u64::from(hp.shield)) as u32;

    // If the shield was not emptied, the armour is not touched even if some
    // base damage is left over.
    if done.shield < hp.shield {
        return done;
    }

    if done.shield > 0 {
        let base_done_shield = u64::from(done.shield) * 100 / shield_percent;
        assert!(base_done_shield <= dmg);
        dmg -= base_done_shield;
    }

    let available_for_armour = dmg * armour_percent / 100;
    done.armour = available_for_armour.min(u64::from(hp.armour)) as u32;

    done
}

struct DamageProcessor<'a, 'c> {
    db: &'a Database,
    dl: &'c DamageLists<'a>,
    rng: &'c mut BlockRng,
    ctx: &'c Context<'c>,

    /// Pre-computed modifiers for all shooters, so that intra-block HP
    /// changes cannot retroactively change a shooter's low-HP boost.
    modifiers: BTreeMap<TargetId, CombatModifier>,

    /// Effects being applied by this block's hits.  Written back only after
    /// all damage and self-destruct processing, so the original pre-block
    /// effects stay in force throughout.
    new_effects: BTreeMap<TargetId, CombatEffects>,

    /// Per (target, attacker): shield/armour drained with gain-HP attacks.
    /// Credited only after reconciliation.
    gain_hp_drained: BTreeMap<TargetId, BTreeMap<TargetId, HpPair>>,

    /// Consolidated dead set across self-destruct rounds.
    already_dead: BTreeSet<TargetId>,
}

impl<'a, 'c> DamageProcessor<'a, 'c> {
    fn new(
        db: &'a Database,
        dl: &'c DamageLists<'a>,
        rng: &'c mut BlockRng,
        ctx: &'c Context<'c>,
    ) -> Self {
        Self {
            db,
            dl,
            rng,
            ctx,
            modifiers: BTreeMap::new(),
            new_effects: BTreeMap::new(),
            gain_hp_drained: BTreeMap::new(),
            already_dead: BTreeSet::new(),
        }
    }

    /// Rolls the damage of one attack, with the modifier applied to the
    /// min/max before rolling.
    fn roll_attack_damage(&mut self, dmg: &Damage, modifier: &StatModifier) -> u32 {
        let min = modifier.apply_u32(dmg.min);
        let max = modifier.apply_u32(dmg.max);
        assert!(min <= max, "inverted damage range after modifier");
        min + self.rng.next_int(u64::from(max - min) + 1) as u32
    }

    /// Applies a fixed damage amount to a target.  Returns what was done to
    /// shield and armour; adds the target to `new_dead` if this killed it.
    fn apply_damage(
        &mut self,
        dmg: u32,
        attacker_id: TargetId,
        spec: &Damage,
        target: &mut Fighter<'_>,
        new_dead: &mut BTreeSet<TargetId>,
    ) -> HpPair {
        assert!(!self.ctx.map().is_no_combat(&target.combat_position()));

        let target_id = target.id_as_target();
        let recv_modifier = target.combat_data().received_damage_modifier;
        let dmg = recv_modifier.apply_u32(dmg);

        if dmg == 0 {
            return HpPair::default();
        }
        if self.already_dead.contains(&target_id) {
            trace!(?target_id, "target already dead from a previous round");
            return HpPair::default();
        }

        if attacker_id.kind == TargetKind::Character && target_id.kind == TargetKind::Character {
            self.dl.add_entry(target_id.id, attacker_id.id);
        }

        let done = compute_damage(dmg, spec, &target.hp());
        let hp = target.mutate_hp();
        hp.shield -= done.shield;
        hp.armour -= done.armour;

        trace!(
            ?target_id,
            shield = done.shield,
            armour = done.armour,
            "damage done"
        );
        if done.shield + done.armour > 0 && hp.armour + hp.shield == 0 {
            // Partial milli-HP do not save the target; they just must not
            // have silently reached a full point.
            assert!(hp.mhp.shield < 1_000 && hp.mhp.armour < 1_000);
            let inserted = new_dead.insert(target_id);
            assert!(inserted, "target {target_id:?} was already dead");
        }

        done
    }

    /// High-level damage application for real attacks, which also records
    /// gain-HP drains for later reconciliation.
    fn apply_attack_damage(
        &mut self,
        dmg: u32,
        attacker_id: TargetId,
        attack: &Attack,
        target: &mut Fighter<'_>,
        new_dead: &mut BTreeSet<TargetId>,
    ) {
        let spec = match &attack.damage {
            Some(d) => *d,
            None => return,
        };
        let done = self.apply_damage(dmg, attacker_id, &spec, target, new_dead);

        if attack.gain_hp {
            let drained = self
                .gain_hp_drained
                .entry(target.id_as_target())
                .or_default()
                .entry(attacker_id)
                .or_default();
            drained.armour += done.armour;
            drained.shield += done.shield;
        }
    }

    /// Accumulates the non-damage effects of a hit into `new_effects`.
    fn apply_effects(&mut self, attack: &Attack, target: &Fighter<'_>) {
        let effects = match &attack.effects {
            Some(e) => e,
            None => return,
        };
        assert!(!self.ctx.map().is_no_combat(&target.combat_position()));

        let entry = self.new_effects.entry(target.id_as_target()).or_default();
        if let Some(speed) = &effects.speed {
            entry.speed.add(speed);
        }
        if let Some(range) = &effects.range {
            entry.range.add(range);
        }
    }

    /// Deals the damage of one fighter to its target (or AoE victims).
    /// Only attacks with `gain_hp` matching the flag are processed.
    fn deal_damage(&mut self, f: Fighter<'_>, for_gain_hp: bool, new_dead: &mut BTreeSet<TargetId>) {
        let pos = f.combat_position();
        assert!(!self.ctx.map().is_no_combat(&pos));

        let own_id = f.id_as_target();
        let target = f.target().expect("fighter processed without target");
        let fighters = FighterTable::new(self.db);
        let target_pos = fighters.get_for_target(&target).combat_position();
        let target_dist = HexCoord::distance_l1(&pos, &target_pos);

        let modifier = self.modifiers.get(&own_id).expect("missing modifier").clone();
        let attacks: Vec<Attack> = f.combat_data().attacks.clone();
        let faction = f.faction();
        drop(f);

        for attack in &attacks {
            if attack.gain_hp != for_gain_hp {
                continue;
            }

            // Unless this is an attacker-centred AoE attack, the primary
            // target must be within this attack's range.
            if let Some(range) = attack.range {
                if i64::from(target_dist) > modifier.range.apply(i64::from(range)) {
                    continue;
                }
            }

            let dmg = match &attack.damage {
                Some(d) => self.roll_attack_damage(d, &modifier.damage),
                None => 0,
            };

            if let Some(area) = attack.area {
                let centre = if attack.range.is_some() { target_pos } else { pos };
                let area = modifier.range.apply(i64::from(area)) as CoordT;
                let targeting = if attack.friendlies {
                    Targeting::Friendlies
                } else {
                    Targeting::Enemies
                };

                let mut victims = Vec::new();
                TargetFinder::new(self.db).process_l1_targets(
                    &centre,
                    area,
                    faction,
                    targeting,
                    |_, id| {
                        if *id != own_id {
                            victims.push(*id);
                        }
                    },
                );
                for id in victims {
                    let mut t = fighters.get_for_target(&id);
                    if self.ctx.map().is_no_combat(&t.combat_position()) {
                        trace!(?id, "no AoE damage in safe zone");
                        continue;
                    }
                    self.apply_attack_damage(dmg, own_id, attack, &mut t, new_dead);
                    self.apply_effects(attack, &t);
                }
            } else {
                let mut t = fighters.get_for_target(&target);
                self.apply_attack_damage(dmg, own_id, attack, &mut t, new_dead);
                self.apply_effects(attack, &t);
            }
        }
    }

    /// Applies all self-destructs of a killed fighter.
    fn process_self_destructs(&mut self, f: Fighter<'_>, new_dead: &mut BTreeSet<TargetId>) {
        let pos = f.combat_position();
        assert!(!self.ctx.map().is_no_combat(&pos));

        // The killed fighter has zero HP, so all low-HP boosts apply.
        assert_eq!(f.hp().armour, 0);
        assert_eq!(f.hp().shield, 0);
        let modifier = compute_modifier(&f);

        let own_id = f.id_as_target();
        let self_destructs = f.combat_data().self_destructs.clone();
        let faction = f.faction();
        drop(f);

        let fighters = FighterTable::new(self.db);
        for sd in &self_destructs {
            let dmg = self.roll_attack_damage(&sd.damage, &modifier.damage);
            debug!(?own_id, dmg, "self-destruct damage");

            let area = modifier.range.apply(i64::from(sd.area)) as CoordT;
            let mut victims = Vec::new();
            TargetFinder::new(self.db).process_l1_targets(
                &pos,
                area,
                faction,
                Targeting::Enemies,
                |_, id| victims.push(*id),
            );
            for id in victims {
                let mut t = fighters.get_for_target(&id);
                if self.ctx.map().is_no_combat(&t.combat_position()) {
                    continue;
                }
                self.apply_damage(dmg, own_id, &sd.damage, &mut t, new_dead);
            }
        }
    }

    fn process(&mut self) {
        let fighters = FighterTable::new(self.db);

        self.modifiers.clear();
        fighters.process_with_target(|f| {
            let modifier = compute_modifier(&f);
            let prev = self.modifiers.insert(f.id_as_target(), modifier);
            assert!(prev.is_none(), "duplicate fighter in modifier pass");
        });

        let mut new_dead = BTreeSet::new();

        // Gain-HP attacks first: normal attacks must not remove shield HP
        // before a syphon can drain them.
        fighters.process_with_target(|f| self.deal_damage(f, true, &mut new_dead));

        // Reconcile drained HP now, before normal attacks may bring shields
        // to zero.  If several attackers drained one target and it cannot
        // pay everyone in full, no attacker gains anything from it.
        let mut gained_hp: BTreeMap<TargetId, HpPair> = BTreeMap::new();
        let drained = std::mem::take(&mut self.gain_hp_drained);
        for (target_id, attackers) in &drained {
            assert!(!attackers.is_empty());
            let t = fighters.get_for_target(target_id);
            let t_hp = *t.hp();
            drop(t);

            for (attacker_id, drained) in attackers {
                // Only shield drains exist in the game; supporting armour
                // drains as well would make the shield/armour split depend
                // on processing order.
                assert_eq!(drained.armour, 0, "armour drain is not supported");
                assert!(drained.shield > 0);

                let mut gained = HpPair::default();
                if t_hp.armour > 0 || attackers.len() == 1 {
                    gained.armour = drained.armour;
                }
                if t_hp.shield > 0 || attackers.len() == 1 {
                    gained.shield = drained.shield;
                }

                if gained.armour > 0 || gained.shield > 0 {
                    let entry = gained_hp.entry(*attacker_id).or_default();
                    entry.armour += gained.armour;
                    entry.shield += gained.shield;
                }
            }
        }

        fighters.process_with_target(|f| self.deal_damage(f, false, &mut new_dead));

        // Self-destruct rounds: each round may kill more entities, which
        // self-destruct in the next round, until the dead set is stable.
        while !new_dead.is_empty() {
            for d in &new_dead {
                let inserted = self.already_dead.insert(*d);
                assert!(inserted, "target {d:?} died twice");
            }

            let to_process = std::mem::take(&mut new_dead);
            for d in &to_process {
                let f = fighters.get_for_target(d);
                self.process_self_destructs(f, &mut new_dead);
            }
        }

        // Credit gained HP to surviving attackers, up to their own maxima.
        for (id, gained) in &gained_hp {
            if self.already_dead.contains(id) {
                debug!(?id, "killed fighter does not receive drained HP");
                continue;
            }
            let mut f = fighters.get_for_target(id);
            let max_hp = f.regen_data().max_hp;
            let hp = f.mutate_hp();
            hp.armour = (hp.armour + gained.armour).min(max_hp.armour);
            hp.shield = (hp.shield + gained.shield).min(max_hp.shield);
        }

        // Swap over combat effects: clear everything persisted and write
        // the effects accumulated in this block's damage step.
        fighters.clear_all_effects();
        for (id, effects) in std::mem::take(&mut self.new_effects) {
            if !effects.is_neutral() {
                let mut f = fighters.get_for_target(&id);
                f.set_effects(effects);
            }
        }
    }
}

/// Deals all combat damage for the block; returns the set of killed
/// fighters.
pub fn deal_combat_damage(
    db: &Database,
    dl: &DamageLists<'_>,
    rng: &mut BlockRng,
    ctx: &Context<'_>,
) -> BTreeSet<TargetId> {
    let mut proc = DamageProcessor::new(db, dl, rng, ctx);
    proc.process();
    proc.already_dead
}

/* ************************************************************************ */

struct KillProcessor<'a, 'c> {
    db: &'a Database,
    rng: &'c mut BlockRng,
    ctx: &'c Context<'c>,
    dl: &'c DamageLists<'a>,
}

impl<'a, 'c> KillProcessor<'a, 'c> {
    /// Deletes a character from all tables.
    fn delete_character(&self, id: i64) {
        self.dl.remove_character(id);
        OngoingsTable::new(self.db).delete_for_character(id);
        CharacterTable::new(self.db).delete_by_id(id);
    }

    fn process_character(&mut self, id: i64) {
        let characters = CharacterTable::new(self.db);
        let c = characters.get_by_id(id).unwrap();
        let pos = c.position();

        // A prospecting victim releases the region it was working on.
        if let Some(op_id) = c.data().ongoing {
            let ongoings = OngoingsTable::new(self.db);
            let op = ongoings.get_by_id(op_id).expect("dangling ongoing");
            if *op.payload() == OngoingPayload::Prospection {
                let region_id = self.ctx.map().region_id(&pos);
                info!(character = id, region_id, "killed while prospecting");
                let regions = RegionsTable::new(self.db, self.ctx.height());
                let mut r = regions.get_by_id(region_id);
                assert_eq!(r.data().prospecting_character, Some(id));
                r.mutate_data().prospecting_character = None;
            }
        }

        // Everything carried drops at the last on-map position.
        if !c.inventory().is_empty() {
            info!(character = id, %pos, "dropping inventory of killed character");
            let loot = GroundLootTable::new(self.db);
            let mut ground = loot.get_by_coord(pos);
            let inv = c.inventory().clone();
            for (item, count) in &inv.fungible {
                ground.mutate_inventory().add(item, *count as i64);
            }
        }

        drop(c);
        self.delete_character(id);
    }

    fn process_building(&mut self, id: i64) {
        // Accumulate everything inside the building: account inventories,
        // inventories of characters inside (who die with it), recoverable
        // originals from in-progress operations, construction materials.
        let mut total_inv = Inventory::default();

        let inventories = BuildingInventoriesTable::new(self.db);
        for account in inventories.query_for_building(id) {
            let inv = inventories.get(id, &account);
            total_inv.extend_from(&inv.inventory());
        }

        let characters = CharacterTable::new(self.db);
        for cid in characters.query_for_building(id) {
            {
                let c = characters.get_by_id(cid).unwrap();
                total_inv.extend_from(&c.inventory());
            }
            self.delete_character(cid);
        }

        let ongoings = OngoingsTable::new(self.db);
        for op_id in ongoings.query_for_building(id) {
            let op = ongoings.get_by_id(op_id).unwrap();
            match &*op.payload() {
                OngoingPayload::BlueprintCopy { original_type, .. } => {
                    total_inv.add(original_type, 1);
                }
                OngoingPayload::ItemConstruction {
                    original_type: Some(orig),
                    ..
                } => {
                    total_inv.add(orig, 1);
                }
                _ => (),
            };
        }

        let buildings = BuildingsTable::new(self.db);
        let centre = {
            let b = buildings.get_by_id(id).unwrap();
            total_inv.extend_from(&b.data().construction_inventory);
            b.centre()
        };

        // Roll per unit; BTreeMap iteration keeps the rolls deterministic.
        let loot = GroundLootTable::new(self.db);
        let mut ground = loot.get_by_coord(centre);
        for (item, count) in &total_inv.fungible {
            let mut dropped: i64 = 0;
            for _ in 0..*count {
                if self
                    .rng
                    .probability_roll(BUILDING_INVENTORY_DROP_PERCENT, 100)
                {
                    dropped += 1;
                }
            }
            if dropped > 0 {
                debug!(building = id, %item, dropped, "dropping from destroyed building");
                ground.mutate_inventory().add(item, dropped);
            }
        }
        drop(ground);

        inventories.remove_building(id);
        ongoings.delete_for_building(id);
        buildings.delete_by_id(id);
    }
}

/// Processes all killed fighters in (kind, id) order.
pub fn process_kills(
    db: &Database,
    dl: &DamageLists<'_>,
    dead: &BTreeSet<TargetId>,
    rng: &mut BlockRng,
    ctx: &Context<'_>,
) {
    let mut proc = KillProcessor { db, rng, ctx, dl };
    for id in dead {
        match id.kind {
            TargetKind::Character => proc.process_character(id.id),
            TargetKind::Building => proc.process_building(id.id),
        }
    }
}

/* ************************************************************************ */

/// Regeneration for one HP type.  Returns the updated (full, milli) pair
/// and whether anything changed.
fn regenerate_hp_type(
    max: u32,
    mhp_rate: u32,
    old_cur: u32,
    old_milli: u32,
) -> Option<(u32, u32)> {
    assert!(old_cur < max || (old_cur == max && old_milli == 0));

    let mut milli = old_milli + mhp_rate;
    let mut cur = old_cur + milli / 1_000;
    milli %= 1_000;

    if cur >= max {
        cur = max;
        milli = 0;
    }

    if cur == old_cur && milli == old_milli {
        None
    } else {
        Some((cur, milli))
    }
}

fn regenerate_fighter_hp(mut f: Fighter<'_>) {
    let regen = *f.regen_data();
    let hp = *f.hp();

    if let Some((cur, milli)) = regenerate_hp_type(
        regen.max_hp.armour,
        regen.regeneration_mhp.armour,
        hp.armour,
        hp.mhp.armour,
    ) {
        let hp = f.mutate_hp();
        hp.armour = cur;
        hp.mhp.armour = milli;
    }

    let shield_rate = f
        .effects()
        .shield_regen
        .apply(i64::from(regen.regeneration_mhp.shield)) as u32;
    if let Some((cur, milli)) =
        regenerate_hp_type(regen.max_hp.shield, shield_rate, hp.shield, hp.mhp.shield)
    {
        let hp = f.mutate_hp();
        hp.shield = cur;
        hp.mhp.shield = milli;
    }
}

/// HP regeneration for all fighters flagged as able to regenerate.
pub fn regenerate_hp(db: &Database) {
    let fighters = FighterTable::new(db);
    fighters.process_for_regen(regenerate_fighter_hp);
}

/* ************************************************************************ */

/// The full damage / kill / regen phase of one block.
pub fn all_hp_updates(
    db: &Database,
    fame: &mut FameUpdater<'_, '_>,
    rng: &mut BlockRng,
    ctx: &Context<'_>,
) {
    let dead = deal_combat_damage(db, fame.damage_lists(), rng, ctx);
    if !dead.is_empty() {
        info!(count = dead.len(), "fighters killed in combat");
    }

    for id in &dead {
        fame.update_for_kill(id);
    }

    process_kills(db, fame.damage_lists(), &dead, rng, ctx);
    regenerate_hp(db);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_respects_shield_percent() {
        let hp = Hp {
            armour: 100,
            shield: 50,
            mhp: HpPair::default(),
        };

        // Plain damage reduces shield first.
        let done = compute_damage(30, &Damage::default(), &hp);
        assert_eq!(done, HpPair { armour: 0, shield: 30 });

        // More than the shield spills over into armour.
        let done = compute_damage(70, &Damage::default(), &hp);
        assert_eq!(done, HpPair { armour: 20, shield: 50 });

        // Zero shield percent skips shields entirely when none is left.
        let no_shield = Hp {
            armour: 100,
            shield: 0,
            mhp: HpPair::default(),
        };
        let spec = Damage {
            shield_percent: Some(0),
            ..Default::default()
        };
        let done = compute_damage(40, &spec, &no_shield);
        assert_eq!(done, HpPair { armour: 40, shield: 0 });

        // Shield percent discounts and blocks armour damage while the
        // shield is not emptied.
        let spec = Damage {
            shield_percent: Some(50),
            ..Default::default()
        };
        let done = compute_damage(60, &spec, &hp);
        assert_eq!(done, HpPair { armour: 0, shield: 30 });
    }

    #[test]
    fn damage_zero_is_noop() {
        let hp = Hp {
            armour: 10,
            shield: 10,
            mhp: HpPair::default(),
        };
        let done = compute_damage(0, &Damage::default(), &hp);
        assert_eq!(done, HpPair::default());
    }

    #[test]
    fn armour_percent_caps_spillover() {
        let hp = Hp {
            armour: 100,
            shield: 10,
            mhp: HpPair::default(),
        };
        let spec = Damage {
            armour_percent: Some(50),
            ..Default::default()
        };
        // 10 base damage empties the shield; 20 base remain, of which only
        // 50% can hit armour.
        let done = compute_damage(30, &spec, &hp);
        assert_eq!(done, HpPair { armour: 10, shield: 10 });
    }

    #[test]
    fn regen_accumulates_milli_hp() {
        // 500 mhp per block: one full HP every other block.
        assert_eq!(regenerate_hp_type(100, 500, 50, 0), Some((50, 500)));
        assert_eq!(regenerate_hp_type(100, 500, 50, 500), Some((51, 0)));

        // Clamping at max zeroes the accumulator.
        assert_eq!(regenerate_hp_type(100, 700, 99, 900), Some((100, 0)));

        // No change when rate is zero.
        assert_eq!(regenerate_hp_type(100, 0, 50, 0), None);
    }
}
