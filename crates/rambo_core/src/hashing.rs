//! Hash derivation shared by the filter cells and the partition map.
//!
//! Bloom positions come from one 128-bit xxh3 digest split into two halves and
//! combined by double hashing (`h1 + i*h2`). Every cell of a structure has the
//! same `range` and `k`, so a query hashes its key once and reuses the positions
//! for all R*B probes.

use crate::consts::HASH_SEED;
use xxhash_rust::xxh3::xxh3_128_with_seed;

#[inline]
fn halves(key: &[u8]) -> (u64, u64) {
    let d = xxh3_128_with_seed(key, HASH_SEED);
    // nonzero step keeps the k probes from collapsing onto h1
    (d as u64, ((d >> 64) as u64) | 1)
}

/// `k` bit positions in `[0, range)` for `key`.
pub fn hash_positions(key: &[u8], k: u32, range: u64) -> Vec<u64> {
    let mut out = Vec::with_capacity(k as usize);
    if range == 0 { return out; }
    let (h1, h2) = halves(key);
    for i in 0..k as u64 {
        out.push(h1.wrapping_add(i.wrapping_mul(h2)) % range);
    }
    out
}

/// Stable 64-bit hash of a set name for one repeat; feeds bin assignment.
pub fn bin_hash(name: &str, repeat: u32, seed: u64) -> u64 {
    let mut h = blake3::Hasher::new();
    h.update(&seed.to_le_bytes());
    h.update(&repeat.to_le_bytes());
    h.update(name.as_bytes());
    let dig = h.finalize();
    let mut first = [0u8; 8];
    first.copy_from_slice(&dig.as_bytes()[0..8]);
    u64::from_le_bytes(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_deterministic_and_in_range() {
        let a = hash_positions(b"ACGTACGT", 7, 1000);
        let b = hash_positions(b"ACGTACGT", 7, 1000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 7);
        assert!(a.iter().all(|&p| p < 1000));
    }

    #[test]
    fn positions_differ_between_keys() {
        assert_ne!(hash_positions(b"AAAA", 4, 1 << 20), hash_positions(b"CCCC", 4, 1 << 20));
    }

    #[test]
    fn zero_range_yields_nothing() {
        assert!(hash_positions(b"x", 3, 0).is_empty());
    }

    #[test]
    fn bin_hash_depends_on_repeat_and_seed() {
        let base = bin_hash("S1", 0, 1);
        assert_eq!(base, bin_hash("S1", 0, 1));
        assert_ne!(base, bin_hash("S1", 1, 1));
        assert_ne!(base, bin_hash("S1", 0, 2));
        assert_ne!(base, bin_hash("S2", 0, 1));
    }
}
