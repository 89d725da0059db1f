//! Weighted resource detection for prospection results.
//!
//! Each configured resource area contributes its resources with a weight
//! that falls off linearly between a core and an outer radius around the
//! area centre.  Candidates are sorted by (resource, centre) before any
//! randomness is consumed, so the result is independent of configuration
//! ordering.

use tracing::trace;

use crate::amounts::Quantity;
use crate::config::RoConfig;
use crate::hex::{CoordT, HexCoord};
use crate::rng::BlockRng;

/// L1 radius around an area centre with full weight.
const CORE_RADIUS: CoordT = 400;

/// L1 radius where the weight has fallen off to zero.
const OUTER_RADIUS: CoordT = 1_000;

/// Base value for the resource weights.  Only relative weights matter, but
/// a large base keeps the integer fall-off arithmetic precise.
const BASE_WEIGHT: u64 = 100_000_000;

/// Linear fall-off of a value by distance: full inside the core radius,
/// down to 1 at the outer radius, 0 beyond.
pub fn fall_off(dist: CoordT, val: u64) -> u64 {
    if dist > OUTER_RADIUS {
        return 0;
    }
    if dist <= CORE_RADIUS {
        return val;
    }

    let mut interpol = (val - 1) as i64;
    interpol *= i64::from(OUTER_RADIUS - dist);
    interpol /= i64::from(OUTER_RADIUS - CORE_RADIUS);
    interpol += 1;

    assert!(interpol >= 1 && interpol as u64 <= val);
    interpol as u64
}

/// Picks the resource type and initial reserve revealed by prospecting at
/// the given position.
pub fn detect_resource(
    pos: &HexCoord,
    min_amount: u64,
    max_amount: u64,
    rng: &mut BlockRng,
) -> (String, Quantity) {
    // Gather all resources with non-zero weight, keyed by (type, centre)
    // for a deterministic order independent of config layout.
    let mut available: Vec<(String, HexCoord, CoordT, u64)> = Vec::new();
    for area in &RoConfig::get().resource_areas {
        let centre = area.centre_coord();
        let dist = HexCoord::distance_l1(pos, &centre);
        let weight = fall_off(dist, BASE_WEIGHT);
        if weight == 0 {
            continue;
        }
        for res in &area.resources {
            available.push((res.clone(), centre, dist, weight));
        }
    }
    available.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    available.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1);
    trace!(count = available.len(), "available resources");

    // Nothing in reach: an empty prospection result.
    if available.is_empty() {
        return ("raw a".to_owned(), 0);
    }

    let weights: Vec<u64> = available.iter().map(|a| a.3).collect();
    let picked = &available[rng.select_by_weight(&weights)];

    let base_amount = min_amount + rng.next_int(max_amount - min_amount + 1);
    let amount = fall_off(picked.2, base_amount);
    trace!(resource = %picked.0, base_amount, amount, "detected resource");

    (picked.0.clone(), amount as Quantity)
}
