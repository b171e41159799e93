//! The RAMBO structure: an R x B matrix of aggregated Bloom filters plus the
//! partition map that says which sets feed which cell.
//!
//! Lifecycle: [`Rambo::new`] -> [`Rambo::create_meta_rambo`] -> insertions ->
//! optional [`Rambo::serialize_rambo`] -> queries. Construction takes `&mut self`
//! and is single-writer; queries take `&self` and may run in parallel once
//! construction is over.

use crate::errors::{RamboError, Result};
use crate::filter::Bloom;
use crate::hashing::hash_positions;
use crate::ingest::parse_line;
use crate::meta::{assigner_for, MetaRambo, SetDescriptor};
use crate::params::{RamboConfig, RamboParams};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Outcome of inserting one set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertStats {
    pub keys: usize,
    /// Empty elements that were dropped.
    pub skipped: usize,
}

/// Outcome of [`Rambo::insertion2`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sets: usize,
    pub keys: usize,
    pub skipped_lines: usize,
    pub unknown_ids: usize,
}

#[derive(Debug, Clone)]
pub struct Rambo {
    pub(crate) params: RamboParams,
    pub(crate) meta: Option<MetaRambo>,
    /// Row-major: cell (repeat, bin) lives at `repeat * B + bin`.
    pub(crate) cells: Vec<Bloom>,
    pub(crate) populated: bool,
}

impl Rambo {
    pub fn new(cfg: &RamboConfig) -> Result<Self> {
        let params = RamboParams::from_config(cfg)?;
        info!(
            n = params.n, r = params.r, b = params.b, k = params.k, range = params.range,
            fpr = params.fpr, bytes = params.matrix_bytes(),
            "rambo created"
        );
        Ok(Self::from_params(params))
    }

    pub(crate) fn from_params(params: RamboParams) -> Self {
        let cells = vec![Bloom::new(params.range, params.k); params.num_cells()];
        Self { params, meta: None, cells, populated: false }
    }

    pub fn params(&self) -> &RamboParams { &self.params }

    pub fn meta(&self) -> Option<&MetaRambo> { self.meta.as_ref() }

    /// Filter cell at (`repeat`, `bin`), if both are in range.
    pub fn cell(&self, repeat: u32, bin: u32) -> Option<&Bloom> {
        if repeat >= self.params.r || bin >= self.params.b { return None; }
        Some(self.cell_at(repeat, bin))
    }

    #[inline]
    pub(crate) fn cell_at(&self, repeat: u32, bin: u32) -> &Bloom {
        &self.cells[self.cell_index(repeat, bin)]
    }

    #[inline]
    pub(crate) fn cell_index(&self, repeat: u32, bin: u32) -> usize {
        repeat as usize * self.params.b as usize + bin as usize
    }

    /// Name of the set behind bit `slot` of a query result.
    pub fn set_name(&self, slot: u32) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.name(slot))
    }

    /// Fraction of bits set in every cell of one repeat.
    pub fn fill_ratios(&self, repeat: u32) -> Vec<f64> {
        if repeat >= self.params.r { return vec![]; }
        (0..self.params.b).map(|b| self.cell_at(repeat, b).fill_ratio()).collect()
    }

    /// Build the partition map. With no descriptors every slot `0..n` is named
    /// by its decimal index. Must run before any insertion.
    pub fn create_meta_rambo(&mut self, sets: &[SetDescriptor]) -> Result<()> {
        if self.populated { return Err(RamboError::AlreadyPopulated); }
        let defaults: Vec<SetDescriptor>;
        let sets = if sets.is_empty() {
            defaults = (0..self.params.n).map(|i| SetDescriptor::new(i.to_string())).collect();
            &defaults
        } else {
            sets
        };
        let mut assigner = assigner_for(self.params.partition);
        let meta = MetaRambo::build(
            sets,
            self.params.n,
            self.params.r,
            self.params.b,
            assigner.as_mut(),
            self.params.rare,
        )?;
        let rare = (0..meta.num_sets() as u32).filter(|&s| meta.is_rare(s)).count();
        info!(sets = meta.num_sets(), rare, "partition map built");
        self.meta = Some(meta);
        Ok(())
    }

    fn slot_of(&self, set_id: &str) -> Result<u32> {
        let meta = self.meta.as_ref().ok_or(RamboError::NotConstructed)?;
        meta.slot(set_id).ok_or_else(|| RamboError::UnknownSet(set_id.to_string()))
    }

    /// Add every key of `set_id` to its R cells. The set must be in the partition map.
    /// Sets routed to the rare pool go through [`Rambo::insertion_rare`] and its size bound.
    pub fn insertion<I>(&mut self, set_id: &str, keys: I) -> Result<InsertStats>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let slot = self.slot_of(set_id)?;
        if self.is_rare_slot(slot) {
            return self.insertion_rare(set_id, keys);
        }
        Ok(self.insert_slot(slot, keys))
    }

    fn is_rare_slot(&self, slot: u32) -> bool {
        self.params.rare.is_some() && self.meta.as_ref().is_some_and(|m| m.is_rare(slot))
    }

    /// Insertion for a set routed to the rare pool at partition time.
    pub fn insertion_rare<I>(&mut self, set_id: &str, keys: I) -> Result<InsertStats>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let slot = self.slot_of(set_id)?;
        let (Some(policy), true) = (self.params.rare, self.is_rare_slot(slot)) else {
            return Err(RamboError::NotRare(set_id.to_string()));
        };
        let keys: Vec<I::Item> = keys.into_iter().collect();
        if keys.len() > policy.max_size {
            return Err(RamboError::NotRare(format!(
                "{set_id} ({} elements > {})",
                keys.len(),
                policy.max_size
            )));
        }
        Ok(self.insert_slot(slot, keys))
    }

    fn insert_slot<I>(&mut self, slot: u32, keys: I) -> InsertStats
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let Some(meta) = self.meta.as_ref() else { return InsertStats::default() };
        let b = self.params.b as usize;
        let targets: Vec<usize> = meta
            .bins_of(slot)
            .unwrap_or(&[])
            .iter()
            .enumerate()
            .map(|(repeat, &bin)| repeat * b + bin as usize)
            .collect();

        let mut stats = InsertStats::default();
        for key in keys {
            let key = key.as_ref();
            if key.is_empty() {
                stats.skipped += 1;
                continue;
            }
            let pos = hash_positions(key, self.params.k, self.params.range);
            for &t in &targets { self.cells[t].add_positions(&pos); }
            stats.keys += 1;
        }

        let name = meta.name(slot).unwrap_or_default();
        if stats.keys == 0 {
            warn!(set = name, skipped = stats.skipped, "set has no elements, skipped");
        } else {
            self.populated = true;
            debug!(set = name, keys = stats.keys, "set inserted");
        }
        stats
    }

    /// Batch insertion over `ELEMENT;id,id,...` lines. Elements are grouped by
    /// set and each set is inserted once, in slot order. Malformed lines and
    /// unknown ids are skipped and counted. A rare set listed on more than
    /// `max_size` lines fails the whole batch before anything is inserted.
    pub fn insertion2<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<BatchReport> {
        let meta = self.meta.as_ref().ok_or(RamboError::NotConstructed)?;
        let mut report = BatchReport::default();
        let mut groups: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
        for line in lines {
            let line = line.as_ref();
            if line.trim().is_empty() { continue; }
            let Some(parsed) = parse_line(line) else {
                report.skipped_lines += 1;
                continue;
            };
            for id in parsed.sets {
                match meta.slot(id) {
                    Some(slot) => groups.entry(slot).or_default().push(parsed.element),
                    None => report.unknown_ids += 1,
                }
            }
        }
        if let Some(policy) = self.params.rare {
            for (&slot, elements) in &groups {
                if meta.is_rare(slot) && elements.len() > policy.max_size {
                    return Err(RamboError::NotRare(format!(
                        "{} ({} elements > {})",
                        meta.name(slot).unwrap_or_default(),
                        elements.len(),
                        policy.max_size
                    )));
                }
            }
        }
        for (slot, elements) in groups {
            let stats = self.insert_slot(slot, elements);
            report.sets += 1;
            report.keys += stats.keys;
        }
        if report.skipped_lines > 0 || report.unknown_ids > 0 {
            warn!(skipped_lines = report.skipped_lines, unknown_ids = report.unknown_ids, "batch input had bad entries");
        }
        info!(sets = report.sets, keys = report.keys, "batch inserted");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RarePolicy;

    fn small() -> RamboConfig {
        RamboConfig { sets: 8, repeats: 3, bins: 4, capacity: 1000, fpr: 0.01, ..RamboConfig::default() }
    }

    #[test]
    fn insertion_requires_partition_map() {
        let mut r = Rambo::new(&small()).unwrap();
        assert!(matches!(r.insertion("0", ["AAAA"]), Err(RamboError::NotConstructed)));
        r.create_meta_rambo(&[]).unwrap();
        assert!(matches!(r.insertion("nope", ["AAAA"]), Err(RamboError::UnknownSet(_))));
    }

    #[test]
    fn insertion_touches_only_owning_cells() {
        let mut r = Rambo::new(&small()).unwrap();
        r.create_meta_rambo(&[]).unwrap();
        r.insertion("3", ["ACGTACGT"]).unwrap();
        let bins = r.meta().unwrap().bins_of(3).unwrap().to_vec();
        for repeat in 0..3 {
            for bin in 0..4 {
                let touched = r.cell(repeat, bin).unwrap().count_ones() > 0;
                assert_eq!(touched, bins[repeat as usize] == bin);
            }
        }
    }

    #[test]
    fn empty_keys_are_counted() {
        let mut r = Rambo::new(&small()).unwrap();
        r.create_meta_rambo(&[]).unwrap();
        let stats = r.insertion("1", ["AAAA", "", "CCCC"]).unwrap();
        assert_eq!(stats, InsertStats { keys: 2, skipped: 1 });
        let none: [&str; 0] = [];
        assert_eq!(r.insertion("2", none).unwrap(), InsertStats::default());
    }

    #[test]
    fn map_is_frozen_after_insertion() {
        let mut r = Rambo::new(&small()).unwrap();
        r.create_meta_rambo(&[]).unwrap();
        r.create_meta_rambo(&[]).unwrap();
        r.insertion("0", ["AAAA"]).unwrap();
        assert!(matches!(r.create_meta_rambo(&[]), Err(RamboError::AlreadyPopulated)));
    }

    #[test]
    fn batch_lines_group_by_set() {
        let mut r = Rambo::new(&small()).unwrap();
        r.create_meta_rambo(&[]).unwrap();
        let lines = ["AAAA;0,1", "CCCC;1", "garbage", "GGGG;9,2", "", "TTTT;"];
        let rep = r.insertion2(&lines).unwrap();
        assert_eq!(rep, BatchReport { sets: 3, keys: 4, skipped_lines: 2, unknown_ids: 1 });
    }

    #[test]
    fn rare_insertion_checks_routing() {
        let cfg = RamboConfig {
            rare: Some(RarePolicy { max_size: 2, reserved_bins: 1 }),
            ..small()
        };
        let mut r = Rambo::new(&cfg).unwrap();
        r.create_meta_rambo(&[
            SetDescriptor::with_size("big", 500),
            SetDescriptor::with_size("tiny", 2),
        ])
        .unwrap();
        assert!(r.insertion_rare("tiny", ["AAAA", "CCCC"]).is_ok());
        assert!(matches!(r.insertion_rare("tiny", ["A", "C", "G"]), Err(RamboError::NotRare(_))));
        assert!(matches!(r.insertion_rare("big", ["AAAA"]), Err(RamboError::NotRare(_))));
        assert!(r.meta().unwrap().bins_of(1).unwrap().iter().all(|&b| b == 3));
    }

    #[test]
    fn plain_insertion_keeps_rare_bins_small() {
        let cfg = RamboConfig {
            rare: Some(RarePolicy { max_size: 2, reserved_bins: 1 }),
            ..small()
        };
        let mut r = Rambo::new(&cfg).unwrap();
        r.create_meta_rambo(&[
            SetDescriptor::with_size("big", 500),
            SetDescriptor::with_size("tiny", 1),
        ])
        .unwrap();
        let flood: Vec<String> = (0..5000).map(|i| format!("k{i}")).collect();
        assert!(matches!(r.insertion("tiny", &flood), Err(RamboError::NotRare(_))));
        for repeat in 0..3 {
            assert_eq!(r.cell(repeat, 3).unwrap().count_ones(), 0);
        }
        assert_eq!(r.insertion("tiny", ["AAAA"]).unwrap().keys, 1);
        assert_eq!(r.insertion("big", &flood[..100]).unwrap().keys, 100);
    }

    #[test]
    fn batch_rejects_oversized_rare_set() {
        let cfg = RamboConfig {
            rare: Some(RarePolicy { max_size: 1, reserved_bins: 1 }),
            ..small()
        };
        let mut r = Rambo::new(&cfg).unwrap();
        r.create_meta_rambo(&[
            SetDescriptor::with_size("big", 100),
            SetDescriptor::with_size("tiny", 1),
        ])
        .unwrap();
        let lines = ["AAAA;big", "CCCC;tiny,big", "GGGG;tiny"];
        assert!(matches!(r.insertion2(&lines), Err(RamboError::NotRare(_))));
        assert!((0..3).all(|rep| (0..4).all(|bin| r.cell(rep, bin).unwrap().count_ones() == 0)));
    }

    #[test]
    fn rare_policy_without_sizes_is_rejected() {
        let cfg = RamboConfig {
            rare: Some(RarePolicy { max_size: 5, reserved_bins: 1 }),
            ..small()
        };
        let mut r = Rambo::new(&cfg).unwrap();
        assert!(matches!(r.create_meta_rambo(&[]), Err(RamboError::InvalidConfig(_))));
        assert!(r.meta().is_none());
    }

    #[test]
    fn cell_lookup_is_bounds_checked() {
        let r = Rambo::new(&small()).unwrap();
        assert!(r.cell(2, 3).is_some());
        assert!(r.cell(3, 0).is_none());
        assert!(r.cell(0, 4).is_none());
        assert!(r.fill_ratios(3).is_empty());
    }
}
