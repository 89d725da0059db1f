//! Waypoint list codec for moves.
//!
//! Waypoints travel in moves as base64 over a compact binary encoding:
//! zig-zag varints of the coordinate deltas between consecutive points.
//! Encoding then decoding is the identity for any waypoint list, and
//! decoding then encoding is the identity for well-formed strings.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::hex::{CoordT, HexCoord};

/// Hard cap on the number of waypoints in one command.
const MAX_WAYPOINTS: usize = 1_000;

fn zigzag(val: i64) -> u64 {
    ((val << 1) ^ (val >> 63)) as u64
}

fn unzigzag(val: u64) -> i64 {
    ((val >> 1) as i64) ^ -((val & 1) as i64)
}

fn push_varint(out: &mut Vec<u8>, mut val: u64) {
    loop {
        let byte = (val & 0x7f) as u8;
        val >>= 7;
        if val == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut val: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = *data.get(*pos)?;
        *pos += 1;
        val |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            // Reject non-canonical trailing zero bytes so that the
            // decode/encode round trip is exact.
            if byte == 0 && shift > 0 {
                return None;
            }
            return Some(val);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
}

/// Encodes a waypoint list into its base64 move representation.
pub fn encode_waypoints(wp: &[HexCoord]) -> String {
    let mut data = Vec::new();
    push_varint(&mut data, wp.len() as u64);
    let mut prev = HexCoord::new(0, 0);
    for c in wp {
        push_varint(&mut data, zigzag(i64::from(c.x - prev.x)));
        push_varint(&mut data, zigzag(i64::from(c.y - prev.y)));
        prev = *c;
    }
    BASE64.encode(data)
}

/// Decodes a base64 waypoint string.  Returns None for anything malformed:
/// bad base64, trailing bytes, out-of-range coordinates or too many points.
pub fn decode_waypoints(encoded: &str) -> Option<Vec<HexCoord>> {
    let data = BASE64.decode(encoded).ok()?;
    let mut pos = 0;

    let count = read_varint(&data, &mut pos)?;
    if count as usize > MAX_WAYPOINTS {
        return None;
    }

    let mut res = Vec::with_capacity(count as usize);
    let mut prev = HexCoord::new(0, 0);
    for _ in 0..count {
        let dx = unzigzag(read_varint(&data, &mut pos)?);
        let dy = unzigzag(read_varint(&data, &mut pos)?);
        let x = i64::from(prev.x) + dx;
        let y = i64::from(prev.y) + dy;
        let x = CoordT::try_from(x).ok()?;
        let y = CoordT::try_from(y).ok()?;
        prev = HexCoord::new(x, y);
        res.push(prev);
    }

    if pos != data.len() {
        return None;
    }
    Some(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_values() {
        for wp in [
            vec![],
            vec![HexCoord::new(0, 0)],
            vec![HexCoord::new(5, -3)],
            vec![
                HexCoord::new(1, 1),
                HexCoord::new(1, 1),
                HexCoord::new(-100, 250),
                HexCoord::new(4_000, -4_000),
            ],
        ] {
            let encoded = encode_waypoints(&wp);
            assert_eq!(decode_waypoints(&encoded), Some(wp.clone()));
        }
    }

    #[test]
    fn round_trip_strings() {
        // decode-then-encode must reproduce well-formed strings exactly.
        for wp in [
            vec![HexCoord::new(0, 0), HexCoord::new(10, 20)],
            vec![HexCoord::new(-7, 3)],
        ] {
            let s = encode_waypoints(&wp);
            let decoded = decode_waypoints(&s).unwrap();
            assert_eq!(encode_waypoints(&decoded), s);
        }
    }

    #[test]
    fn malformed_inputs_rejected() {
        assert!(decode_waypoints("not base64 !!!").is_none());
        // Count says one point but no data follows.
        assert!(decode_waypoints(&BASE64.encode([1u8])).is_none());
        // Trailing garbage after a valid empty list.
        assert!(decode_waypoints(&BASE64.encode([0u8, 42])).is_none());
        // Excessive count.
        let mut data = Vec::new();
        push_varint(&mut data, 1_000_000);
        assert!(decode_waypoints(&BASE64.encode(&data)).is_none());
    }

    #[test]
    fn empty_list_is_compact() {
        assert_eq!(decode_waypoints(&encode_waypoints(&[])), Some(vec![]));
    }

    #[test]
    fn random_round_trips() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let len = rng.gen_range(0..50);
            let wp: Vec<HexCoord> = (0..len)
                .map(|_| HexCoord::new(rng.gen_range(-5_000..5_000), rng.gen_range(-5_000..5_000)))
                .collect();
            let encoded = encode_waypoints(&wp);
            assert_eq!(decode_waypoints(&encoded), Some(wp));
        }
    }
}
