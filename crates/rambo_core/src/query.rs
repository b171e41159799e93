//! Read side: single-element membership and approximate sequence search.
use crate::bitarray::BitArray;
use crate::consts::{DEFAULT_KMER_LEN, DEFAULT_SEQ_THRESHOLD};
use crate::errors::{RamboError, Result};
use crate::hashing::hash_positions;
use crate::ingest::kmers;
use crate::meta::MetaRambo;
use crate::rambo::Rambo;
use crate::setops::{take_intersection, take_union};

/// Options of [`Rambo::query_seq`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeqQuery {
    pub kmer_len: usize,
    pub stride: usize,
    /// Fraction of k-mers a set must contain, in (0, 1].
    pub threshold: f64,
}

impl Default for SeqQuery {
    fn default() -> Self {
        Self { kmer_len: DEFAULT_KMER_LEN, stride: 1, threshold: DEFAULT_SEQ_THRESHOLD }
    }
}

impl SeqQuery {
    fn validate(&self) -> Result<()> {
        if self.kmer_len == 0 || self.stride == 0 {
            return Err(RamboError::InvalidInput("kmer_len and stride must be > 0".into()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(RamboError::InvalidInput(format!("threshold must be in (0,1], got {}", self.threshold)));
        }
        Ok(())
    }
}

/// Per-set k-mer hit counts of one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqHits {
    /// Number of k-mers queried.
    pub total: usize,
    /// Hits per slot, indexed like the result bits.
    pub hits: Vec<u32>,
    /// Sets whose hit fraction reached the threshold.
    pub matches: BitArray,
}

impl SeqHits {
    pub fn score(&self, slot: u32) -> f64 {
        if self.total == 0 { return 0.0; }
        self.hits.get(slot as usize).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

impl Rambo {
    fn require_meta(&self) -> Result<&MetaRambo> {
        self.meta.as_ref().ok_or(RamboError::NotConstructed)
    }

    /// Slots surviving all repeats for one key, ascending.
    fn candidates(&self, meta: &MetaRambo, key: &[u8]) -> Vec<u32> {
        let pos = hash_positions(key, self.params.k, self.params.range);
        let mut per_repeat: Vec<Vec<u32>> = Vec::with_capacity(self.params.r as usize);
        for repeat in 0..self.params.r {
            let mut cand: Vec<u32> = Vec::new();
            for bin in 0..self.params.b {
                if self.cell_at(repeat, bin).contains_positions(&pos) {
                    cand = take_union(&cand, meta.members_at(repeat, bin));
                }
            }
            // no set can survive an empty repeat
            if cand.is_empty() { return vec![]; }
            per_repeat.push(cand);
        }
        take_intersection(&per_repeat)
    }

    /// Indicator over all n sets: bit `s` is set iff set `s` may contain `key`.
    pub fn query(&self, key: &[u8]) -> Result<BitArray> {
        let meta = self.require_meta()?;
        Ok(BitArray::from_indices(self.params.n as usize, self.candidates(meta, key)))
    }

    /// Names of the sets that may contain `key`.
    pub fn query_sets(&self, key: &[u8]) -> Result<Vec<&str>> {
        let meta = self.require_meta()?;
        Ok(self.candidates(meta, key).into_iter().filter_map(|s| meta.name(s)).collect())
    }

    /// Query every k-mer of `seq` and report the sets holding at least
    /// `threshold` of them.
    pub fn query_seq(&self, seq: &[u8], opts: &SeqQuery) -> Result<SeqHits> {
        opts.validate()?;
        let meta = self.require_meta()?;
        let n = self.params.n as usize;
        let mut hits = vec![0u32; n];
        let mut total = 0usize;
        for kmer in kmers(seq, opts.kmer_len, opts.stride) {
            total += 1;
            for slot in self.candidates(meta, kmer) { hits[slot as usize] += 1; }
        }
        let mut matches = BitArray::new(n);
        if total > 0 {
            for (slot, &h) in hits.iter().enumerate() {
                if h > 0 && h as f64 / total as f64 >= opts.threshold { matches.set(slot); }
            }
        }
        Ok(SeqHits { total, hits, matches })
    }
}
