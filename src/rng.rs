//! Deterministic per-block randomness.
//!
//! The stream is seeded once per block from the block hash and never
//! reseeded mid-block.  Output bytes come from SHA-256 over the seed and a
//! running counter, so every node consuming the stream in the same order
//! sees the same values.

use sha2::{Digest, Sha256};

/// Deterministic random stream for one block.
pub struct BlockRng {
    seed: [u8; 32],
    counter: u64,
    buf: [u8; 32],
    used: usize,
}

impl BlockRng {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counter: 0,
            buf: [0; 32],
            used: 32,
        }
    }

    /// Seeds the stream from arbitrary bytes (e.g. a block hash in hex).
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut h = Sha256::new();
        h.update(data);
        Self::new(h.finalize().into())
    }

    fn next_byte(&mut self) -> u8 {
        if self.used == 32 {
            let mut h = Sha256::new();
            h.update(self.seed);
            h.update(self.counter.to_le_bytes());
            self.buf = h.finalize().into();
            self.counter += 1;
            self.used = 0;
        }
        let b = self.buf[self.used];
        self.used += 1;
        b
    }

    fn next_u64(&mut self) -> u64 {
        let mut val = 0u64;
        for _ in 0..8 {
            val = (val << 8) | u64::from(self.next_byte());
        }
        val
    }

    /// Uniform integer in `[0, n)`.  Uses rejection sampling so there is no
    /// modulo bias; `n` must be positive.
    pub fn next_int(&mut self, n: u64) -> u64 {
        assert!(n > 0, "next_int with empty range");
        if n == 1 {
            return 0;
        }
        let zone = u64::MAX - (u64::MAX % n);
        loop {
            let val = self.next_u64();
            if val < zone {
                return val % n;
            }
        }
    }

    /// Returns true with probability `numer / denom`.
    pub fn probability_roll(&mut self, numer: u64, denom: u64) -> bool {
        assert!(denom > 0);
        assert!(numer <= denom, "probability {numer}/{denom} above one");
        self.next_int(denom) < numer
    }

    /// Picks an index from the (non-empty) weight list, with chance
    /// proportional to the weight.  Zero weights are valid and never picked
    /// unless all weights are zero, which is a caller bug.
    pub fn select_by_weight(&mut self, weights: &[u64]) -> usize {
        let total: u64 = weights.iter().sum();
        assert!(total > 0, "select_by_weight with zero total weight");
        let mut roll = self.next_int(total);
        for (i, w) in weights.iter().enumerate() {
            if roll < *w {
                return i;
            }
            roll -= w;
        }
        unreachable!("weight roll out of range");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_seed() {
        let mut a = BlockRng::from_bytes(b"block hash 1");
        let mut b = BlockRng::from_bytes(b"block hash 1");
        for _ in 0..1000 {
            assert_eq!(a.next_int(12345), b.next_int(12345));
        }
    }

    #[test]
    fn differs_for_other_seed() {
        let mut a = BlockRng::from_bytes(b"block hash 1");
        let mut b = BlockRng::from_bytes(b"block hash 2");
        let va: Vec<u64> = (0..16).map(|_| a.next_int(1 << 30)).collect();
        let vb: Vec<u64> = (0..16).map(|_| b.next_int(1 << 30)).collect();
        assert_ne!(va, vb);
    }

    #[test]
    fn next_int_in_range() {
        let mut rng = BlockRng::from_bytes(b"range");
        for n in [1u64, 2, 3, 10, 1000, 1 << 50] {
            for _ in 0..100 {
                assert!(rng.next_int(n) < n);
            }
        }
    }

    #[test]
    fn probability_extremes() {
        let mut rng = BlockRng::from_bytes(b"prob");
        for _ in 0..50 {
            assert!(rng.probability_roll(100, 100));
            assert!(!rng.probability_roll(0, 100));
        }
    }

    #[test]
    fn weighted_choice_respects_zero_weights() {
        let mut rng = BlockRng::from_bytes(b"weights");
        for _ in 0..200 {
            let ind = rng.select_by_weight(&[0, 5, 0, 7]);
            assert!(ind == 1 || ind == 3);
        }
    }
}
