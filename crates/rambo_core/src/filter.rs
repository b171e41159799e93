//! Bloom filter cell of the RAMBO matrix.
use crate::hashing::hash_positions;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bloom {
    pub m_bits: u64,
    pub k: u32,
    pub bits: Vec<u8>,
}

impl Bloom {
    pub fn new(m_bits: u64, k: u32) -> Self {
        let bytes = Self::byte_len(m_bits);
        Self { m_bits, k: k.max(1), bits: vec![0u8; bytes] }
    }

    /// Rebuild a cell from its raw bytes; `m_bits` must fit in `bits`.
    pub fn from_bytes(m_bits: u64, k: u32, bits: Vec<u8>) -> Option<Self> {
        if bits.len() != Self::byte_len(m_bits) { return None; }
        Some(Self { m_bits, k: k.max(1), bits })
    }

    #[inline]
    pub fn byte_len(m_bits: u64) -> usize { m_bits.div_ceil(8) as usize }

    pub fn positions(&self, key: &[u8]) -> Vec<u64> {
        hash_positions(key, self.k, self.m_bits)
    }

    pub fn add(&mut self, key: &[u8]) {
        if self.m_bits == 0 { return; }
        let pos = self.positions(key);
        self.add_positions(&pos);
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        if self.m_bits == 0 { return true; }
        self.contains_positions(&self.positions(key))
    }

    /// Set bits already derived with [`hash_positions`] for this cell's `k`/`m_bits`.
    #[inline]
    pub fn add_positions(&mut self, pos: &[u64]) {
        for &bit in pos {
            let idx = (bit / 8) as usize; let off = (bit & 7) as u8;
            self.bits[idx] |= 1u8 << off;
        }
    }

    #[inline]
    pub fn contains_positions(&self, pos: &[u64]) -> bool {
        pos.iter().all(|&bit| {
            let idx = (bit / 8) as usize; let off = (bit & 7) as u8;
            (self.bits[idx] & (1u8 << off)) != 0
        })
    }

    /// Bitwise OR of another cell with the same geometry. Returns false on mismatch.
    pub fn union_with(&mut self, other: &Bloom) -> bool {
        if self.m_bits != other.m_bits || self.k != other.k { return false; }
        for (a, b) in self.bits.iter_mut().zip(&other.bits) { *a |= *b; }
        true
    }

    pub fn count_ones(&self) -> u64 {
        self.bits.iter().map(|b| b.count_ones() as u64).sum()
    }

    /// Fraction of bits set.
    pub fn fill_ratio(&self) -> f64 {
        if self.m_bits == 0 { return 0.0; }
        self.count_ones() as f64 / self.m_bits as f64
    }

    pub fn as_bytes(&self) -> &[u8] { &self.bits }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_keys_are_present() {
        let mut b = Bloom::new(4096, 5);
        for i in 0..100u32 { b.add(format!("key-{i}").as_bytes()); }
        for i in 0..100u32 { assert!(b.contains(format!("key-{i}").as_bytes())); }
    }

    #[test]
    fn empty_filter_rejects() {
        let b = Bloom::new(1024, 3);
        assert!(!b.contains(b"AAAA"));
        assert_eq!(b.count_ones(), 0);
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(Bloom::from_bytes(16, 2, vec![0u8; 2]).is_some());
        assert!(Bloom::from_bytes(17, 2, vec![0u8; 2]).is_none());
    }

    #[test]
    fn union_overlays_bits() {
        let mut a = Bloom::new(2048, 4);
        let mut b = Bloom::new(2048, 4);
        a.add(b"AAAA");
        b.add(b"CCCC");
        assert!(a.union_with(&b));
        assert!(a.contains(b"AAAA") && a.contains(b"CCCC"));
        assert!(!a.union_with(&Bloom::new(1024, 4)));
    }
}
