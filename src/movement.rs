//! Movement stepping.
//!
//! A moving character advances up to its effective speed in L1 steps per
//! block along the dense path toward its next waypoint.  Blocked steps
//! increment a counter and end the character's turn; too many blocked
//! turns in a row cancel the movement entirely.

use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::db::characters::{Character, CharacterTable};
use crate::db::Database;
use crate::dynobstacles::DynObstacles;

/// Maximum value for the chosen speed of a movement command.
pub const MAX_CHOSEN_SPEED: u64 = 1_000_000;

/// Cancels any movement of the character.
pub fn stop_character(c: &mut Character<'_>) {
    if c.data().movement.is_some() {
        trace!(id = c.id(), "stopping movement");
        c.mutate_data().movement = None;
    }
    if c.volatile_mv().blocked_turns != 0 {
        c.mutate_volatile_mv().blocked_turns = 0;
    }
}

/// Effective speed of the character for this block, in L1 steps.
fn effective_speed(c: &Character<'_>) -> u64 {
    let data = c.data();
    let base = match &data.movement {
        Some(m) => m.chosen_speed.unwrap_or(data.speed),
        None => data.speed,
    };
    let modified = data.effects.speed.apply(base as i64);
    modified.max(0) as u64
}

/// Steps one character for the block.  The dynamic overlay is updated in
/// lock-step so later characters see this one's new position.
fn process_character_movement(
    c: &mut Character<'_>,
    dyn_obstacles: &mut DynObstacles,
    ctx: &Context<'_>,
) {
    assert!(!c.is_busy(), "busy character {} is moving", c.id());
    let steps = effective_speed(c);
    trace!(id = c.id(), steps, "processing movement");

    enum Advance {
        NoPlan,
        Finished,
        Reached,
        Target(crate::hex::HexCoord),
    }

    let mut steps_left = steps;
    while steps_left > 0 {
        // Advance past any already-reached waypoints; an emptied list ends
        // the movement.  The decision is copied out first so no record
        // borrow is held across the mutation.
        let next_wp = loop {
            let advance = {
                let data = c.data();
                match &data.movement {
                    None => Advance::NoPlan,
                    Some(m) => match m.waypoints.first() {
                        None => Advance::Finished,
                        Some(wp) if *wp == c.position() => Advance::Reached,
                        Some(wp) => Advance::Target(*wp),
                    },
                }
            };
            match advance {
                Advance::NoPlan => return,
                Advance::Finished => {
                    debug!(id = c.id(), "movement finished");
                    stop_character(c);
                    return;
                }
                Advance::Reached => {
                    c.mutate_data()
                        .movement
                        .as_mut()
                        .unwrap()
                        .waypoints
                        .remove(0);
                }
                Advance::Target(wp) => break wp,
            }
        };

        let pos = c.position();
        let dest = *pos
            .path_to(&next_wp)
            .first()
            .expect("path to distinct waypoint is non-empty");

        if !ctx.map().is_passable(&dest) {
            // Waypoints leading off the map invalidate the whole plan.
            warn!(id = c.id(), %dest, "path leads into impassable terrain");
            stop_character(c);
            return;
        }

        if !dyn_obstacles.is_passable(&dest, c.faction()) {
            let blocked = c.volatile_mv().blocked_turns + 1;
            trace!(id = c.id(), %dest, blocked, "step is blocked");
            if blocked > ctx.params().blocked_turns_limit {
                debug!(id = c.id(), "blocked too long, clearing movement");
                stop_character(c);
            } else {
                c.mutate_volatile_mv().blocked_turns = blocked;
            }
            return;
        }

        dyn_obstacles.remove_vehicle(pos);
        dyn_obstacles.add_vehicle(dest, c.faction());
        c.set_position(dest);
        if c.volatile_mv().blocked_turns != 0 {
            c.mutate_volatile_mv().blocked_turns = 0;
        }
        steps_left -= 1;
    }
}

/// Moves all characters with an active movement plan, in ID order.
pub fn process_all_movement(db: &Database, dyn_obstacles: &mut DynObstacles, ctx: &Context<'_>) {
    let characters = CharacterTable::new(db);
    for id in characters.query_moving() {
        let mut c = characters.get_by_id(id).unwrap();
        process_character_movement(&mut c, dyn_obstacles, ctx);
    }
}
