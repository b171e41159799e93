//! Fixed-width indicator vector, one bit per reference set.
use std::fmt::{self, Debug};

#[derive(Clone, PartialEq, Eq, Default)]
pub struct BitArray {
    words: Vec<u64>,
    nbits: usize,
}

impl BitArray {
    pub fn new(nbits: usize) -> Self {
        Self { words: vec![0; nbits.div_ceil(64)], nbits }
    }

    /// All bits set.
    pub fn full(nbits: usize) -> Self {
        let mut out = Self { words: vec![u64::MAX; nbits.div_ceil(64)], nbits };
        out.clear_tail();
        out
    }

    pub fn from_indices(nbits: usize, idx: impl IntoIterator<Item = u32>) -> Self {
        let mut out = Self::new(nbits);
        for i in idx { out.set(i as usize); }
        out
    }

    pub fn len(&self) -> usize { self.nbits }

    pub fn is_empty(&self) -> bool { self.nbits == 0 }

    pub fn set(&mut self, index: usize) {
        if index >= self.nbits {
            panic!("index out of bounds: the len is {} but the index is {}", self.nbits, index);
        }
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    pub fn test(&self, index: usize) -> bool {
        if index >= self.nbits { return false; }
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn none(&self) -> bool { self.words.iter().all(|&w| w == 0) }

    /// In-place OR. Panics on width mismatch.
    pub fn union_with(&mut self, other: &Self) {
        self.check_width(other, "union");
        for (a, b) in self.words.iter_mut().zip(&other.words) { *a |= *b; }
    }

    /// In-place AND. Panics on width mismatch.
    pub fn intersect_with(&mut self, other: &Self) {
        self.check_width(other, "intersect");
        for (a, b) in self.words.iter_mut().zip(&other.words) { *a &= *b; }
    }

    /// Indices of set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            let mut w = w;
            std::iter::from_fn(move || {
                if w == 0 { return None; }
                let tz = w.trailing_zeros();
                w &= w - 1;
                Some((wi * 64) as u32 + tz)
            })
        })
    }

    fn check_width(&self, other: &Self, op: &str) {
        if self.nbits != other.nbits {
            panic!("unable to {op} bit arrays with different lengths: {} and {}", self.nbits, other.nbits);
        }
    }

    fn clear_tail(&mut self) {
        let rem = self.nbits % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() { *last &= (1u64 << rem) - 1; }
        }
    }
}

impl Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.nbits).map(|i| if self.test(i) { '1' } else { '0' }).collect();
        write!(f, "BitArray({bits})")
    }
}
