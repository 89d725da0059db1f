//! Axial hex coordinates and the geometry helpers the engine needs:
//! L1 distance, neighbour and ring enumeration, 60-degree rotation and
//! principal-direction path stepping.

use serde::{Deserialize, Serialize};

/// Coordinate component type.  Signed and wide enough for any map we use.
pub type CoordT = i32;

/// A hex coordinate in axial representation.  The third cube coordinate is
/// implicit as `z = -x - y`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HexCoord {
    pub x: CoordT,
    pub y: CoordT,
}

/// The six principal directions, in fixed clockwise order.  The order is
/// consensus-relevant wherever paths or rings are enumerated.
pub const DIRECTIONS: [HexCoord; 6] = [
    HexCoord { x: 1, y: 0 },
    HexCoord { x: 1, y: -1 },
    HexCoord { x: 0, y: -1 },
    HexCoord { x: -1, y: 0 },
    HexCoord { x: -1, y: 1 },
    HexCoord { x: 0, y: 1 },
];

impl HexCoord {
    pub const fn new(x: CoordT, y: CoordT) -> Self {
        Self { x, y }
    }

    /// Implicit third cube coordinate.
    pub fn z(&self) -> CoordT {
        -self.x - self.y
    }

    /// L1 (hex grid) distance between two coordinates.
    pub fn distance_l1(a: &HexCoord, b: &HexCoord) -> CoordT {
        let dx = a.x - b.x;
        let dy = a.y - b.y;
        let dz = a.z() - b.z();
        (dx.abs() + dy.abs() + dz.abs()) / 2
    }

    pub fn add(&self, other: &HexCoord) -> HexCoord {
        HexCoord::new(self.x + other.x, self.y + other.y)
    }

    /// Rotates the coordinate clockwise around the origin by the given
    /// number of 60-degree steps.
    pub fn rotate_cw(&self, steps: u32) -> HexCoord {
        let mut x = self.x;
        let mut y = self.y;
        let mut z = self.z();
        for _ in 0..(steps % 6) {
            let (nx, ny, nz) = (-z, -x, -y);
            x = nx;
            y = ny;
            z = nz;
        }
        debug_assert_eq!(z, -x - y);
        HexCoord::new(x, y)
    }

    /// The six adjacent coordinates, in principal-direction order.
    pub fn neighbours(&self) -> impl Iterator<Item = HexCoord> + '_ {
        DIRECTIONS.iter().map(move |d| self.add(d))
    }

    /// Whether `to` lies exactly one principal step away.
    pub fn is_adjacent(&self, to: &HexCoord) -> bool {
        HexCoord::distance_l1(self, to) == 1
    }

    /// Decomposes the straight-line offset to `target` into a deterministic
    /// dense path of adjacent hexes, stepping first along the diagonal
    /// component and then along the remaining axis.  Returns all coordinates
    /// after `self` up to and including `target`.
    pub fn path_to(&self, target: &HexCoord) -> Vec<HexCoord> {
        let mut path = Vec::new();
        let mut cur = *self;
        while cur != *target {
            let dx = (target.x - cur.x).signum();
            let dy = (target.y - cur.y).signum();
            let step = if dx != 0 && dy != 0 && dx != dy {
                // Moving along a diagonal axis keeps the path dense while
                // strictly reducing the L1 distance.
                HexCoord::new(dx, dy)
            } else if dx != 0 {
                HexCoord::new(dx, 0)
            } else {
                HexCoord::new(0, dy)
            };
            cur = cur.add(&step);
            path.push(cur);
        }
        path
    }
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Iterator over all coordinates at exactly L1 distance `radius` from a
/// centre, in a fixed deterministic order.  Radius zero yields the centre.
pub struct L1Ring {
    centre: HexCoord,
    radius: CoordT,
}

impl L1Ring {
    pub fn new(centre: HexCoord, radius: CoordT) -> Self {
        assert!(radius >= 0, "negative ring radius {radius}");
        Self { centre, radius }
    }

    pub fn iter(&self) -> Vec<HexCoord> {
        if self.radius == 0 {
            return vec![self.centre];
        }

        // Start at the "east" corner and walk the six edges in order.
        let mut res = Vec::with_capacity(6 * self.radius as usize);
        let mut cur = self.centre.add(&HexCoord::new(self.radius, 0));
        for dir in [2usize, 3, 4, 5, 0, 1] {
            for _ in 0..self.radius {
                res.push(cur);
                cur = cur.add(&DIRECTIONS[dir]);
            }
        }
        debug_assert_eq!(cur, self.centre.add(&HexCoord::new(self.radius, 0)));
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l1_distance() {
        let origin = HexCoord::new(0, 0);
        assert_eq!(HexCoord::distance_l1(&origin, &origin), 0);
        assert_eq!(HexCoord::distance_l1(&origin, &HexCoord::new(3, 0)), 3);
        assert_eq!(HexCoord::distance_l1(&origin, &HexCoord::new(-2, 2)), 2);
        assert_eq!(HexCoord::distance_l1(&origin, &HexCoord::new(2, -5)), 5);
        assert_eq!(
            HexCoord::distance_l1(&HexCoord::new(-1, 7), &HexCoord::new(4, -3)),
            10
        );
    }

    #[test]
    fn rotation_cycles() {
        let c = HexCoord::new(3, -1);
        assert_eq!(c.rotate_cw(6), c);
        assert_eq!(c.rotate_cw(0), c);

        let mut cur = c;
        for _ in 0..6 {
            cur = cur.rotate_cw(1);
            assert_eq!(
                HexCoord::distance_l1(&HexCoord::new(0, 0), &cur),
                HexCoord::distance_l1(&HexCoord::new(0, 0), &c)
            );
        }
        assert_eq!(cur, c);
    }

    #[test]
    fn ring_sizes_and_distances() {
        let centre = HexCoord::new(2, -5);
        assert_eq!(L1Ring::new(centre, 0).iter(), vec![centre]);

        for radius in 1..5 {
            let tiles = L1Ring::new(centre, radius).iter();
            assert_eq!(tiles.len(), 6 * radius as usize);
            for t in &tiles {
                assert_eq!(HexCoord::distance_l1(&centre, t), radius);
            }
            let unique: std::collections::BTreeSet<_> = tiles.iter().collect();
            assert_eq!(unique.len(), tiles.len());
        }
    }

    #[test]
    fn paths_are_dense_and_reach_target() {
        let from = HexCoord::new(0, 0);
        for target in [
            HexCoord::new(5, 0),
            HexCoord::new(0, -4),
            HexCoord::new(3, -7),
            HexCoord::new(-2, 6),
            HexCoord::new(-3, -3),
        ] {
            let path = from.path_to(&target);
            assert_eq!(
                path.len() as CoordT,
                HexCoord::distance_l1(&from, &target),
                "path to {target} is not shortest"
            );
            let mut prev = from;
            for step in &path {
                assert!(prev.is_adjacent(step));
                prev = *step;
            }
            assert_eq!(prev, target);
        }
    }
}
