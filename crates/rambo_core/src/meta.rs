//! Partition map ("MetaRambo"): set name -> one bin per repeat.
//!
//! Built once by [`MetaRambo::build`] and immutable afterwards. The inverse
//! table `(repeat, bin) -> sorted set slots` is what the query path reads.

use crate::errors::{RamboError, Result};
use crate::hashing::bin_hash;
use crate::params::{PartitionStrategy, RarePolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// A set known before insertion starts. `size` feeds rare-set routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDescriptor {
    pub name: String,
    pub size: Option<usize>,
}

impl SetDescriptor {
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), size: None } }

    pub fn with_size(name: impl Into<String>, size: usize) -> Self {
        Self { name: name.into(), size: Some(size) }
    }
}

impl From<&str> for SetDescriptor {
    fn from(s: &str) -> Self { Self::new(s) }
}

impl From<String> for SetDescriptor {
    fn from(s: String) -> Self { Self::new(s) }
}

/// Picks the bin of one set in one repeat, within `bins`.
pub trait BinAssigner {
    fn assign(&mut self, set: &SetDescriptor, repeat: u32, bins: Range<u32>) -> u32;
}

pub struct HashedAssigner { pub seed: u64 }

impl BinAssigner for HashedAssigner {
    fn assign(&mut self, set: &SetDescriptor, repeat: u32, bins: Range<u32>) -> u32 {
        let width = (bins.end - bins.start) as u64;
        bins.start + (bin_hash(&set.name, repeat, self.seed) % width) as u32
    }
}

pub struct RandomAssigner { rng: StdRng }

impl RandomAssigner {
    pub fn new(seed: u64) -> Self { Self { rng: StdRng::seed_from_u64(seed) } }
}

impl BinAssigner for RandomAssigner {
    fn assign(&mut self, _set: &SetDescriptor, _repeat: u32, bins: Range<u32>) -> u32 {
        self.rng.random_range(bins)
    }
}

pub fn assigner_for(strategy: PartitionStrategy) -> Box<dyn BinAssigner> {
    match strategy {
        PartitionStrategy::Hashed { seed } => Box::new(HashedAssigner { seed }),
        PartitionStrategy::Random { seed } => Box::new(RandomAssigner::new(seed)),
    }
}

/// On-disk form; the lookup and inverse tables are rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetaRecord {
    repeats: u32,
    bins: u32,
    names: Vec<String>,
    assignments: Vec<Vec<u32>>,
    #[serde(default)]
    rare: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaRambo {
    repeats: u32,
    bins: u32,
    names: Vec<String>,
    assignments: Vec<Vec<u32>>,
    rare: Vec<bool>,
    lookup: HashMap<String, u32>,
    members: Vec<Vec<u32>>,
}

impl MetaRambo {
    /// Assign every set to one bin per repeat. `capacity` is the number of
    /// slots of the structure (n); slots beyond `sets.len()` stay unnamed.
    pub fn build(
        sets: &[SetDescriptor],
        capacity: u32,
        repeats: u32,
        bins: u32,
        assigner: &mut dyn BinAssigner,
        rare: Option<RarePolicy>,
    ) -> Result<Self> {
        if sets.len() > capacity as usize {
            return Err(RamboError::InvalidConfig(format!(
                "{} sets given but the structure holds {}",
                sets.len(),
                capacity
            )));
        }
        let mut lookup = HashMap::with_capacity(sets.len());
        for (slot, s) in sets.iter().enumerate() {
            if s.name.trim().is_empty() {
                return Err(RamboError::InvalidConfig("set name cannot be empty".into()));
            }
            if lookup.insert(s.name.clone(), slot as u32).is_some() {
                return Err(RamboError::InvalidConfig(format!("duplicate set name {}", s.name)));
            }
        }
        if rare.is_some() && sets.iter().all(|s| s.size.is_none()) {
            return Err(RamboError::InvalidConfig(
                "rare policy given but no set carries a size hint".into(),
            ));
        }

        let (common, reserved) = match rare {
            Some(p) => (0..bins - p.reserved_bins, bins - p.reserved_bins..bins),
            None => (0..bins, 0..bins),
        };
        let rare_flags: Vec<bool> = sets
            .iter()
            .map(|s| match (rare, s.size) {
                (Some(p), Some(size)) => size <= p.max_size,
                _ => false,
            })
            .collect();

        let mut assignments = vec![Vec::with_capacity(repeats as usize); sets.len()];
        for repeat in 0..repeats {
            for (slot, s) in sets.iter().enumerate() {
                let range = if rare_flags[slot] { reserved.clone() } else { common.clone() };
                let bin = assigner.assign(s, repeat, range);
                assignments[slot].push(bin);
            }
            debug!(repeat, sets = sets.len(), "partition repeat assigned");
        }

        let mut meta = Self {
            repeats,
            bins,
            names: sets.iter().map(|s| s.name.clone()).collect(),
            assignments,
            rare: rare_flags,
            lookup,
            members: vec![],
        };
        meta.rebuild_members();
        Ok(meta)
    }

    fn rebuild_members(&mut self) {
        let mut members = vec![Vec::new(); self.repeats as usize * self.bins as usize];
        // slots ascend, so every member list comes out sorted
        for (slot, bins) in self.assignments.iter().enumerate() {
            for (repeat, &bin) in bins.iter().enumerate() {
                members[repeat * self.bins as usize + bin as usize].push(slot as u32);
            }
        }
        self.members = members;
    }

    pub fn num_sets(&self) -> usize { self.names.len() }

    pub fn repeats(&self) -> u32 { self.repeats }

    pub fn bins(&self) -> u32 { self.bins }

    pub fn names(&self) -> &[String] { &self.names }

    pub fn name(&self, slot: u32) -> Option<&str> {
        self.names.get(slot as usize).map(|s| s.as_str())
    }

    pub fn slot(&self, name: &str) -> Option<u32> { self.lookup.get(name).copied() }

    /// Bins of a set, one per repeat.
    pub fn bins_of(&self, slot: u32) -> Option<&[u32]> {
        self.assignments.get(slot as usize).map(Vec::as_slice)
    }

    pub fn is_rare(&self, slot: u32) -> bool {
        self.rare.get(slot as usize).copied().unwrap_or(false)
    }

    /// Sorted slots assigned to `bin` in `repeat`.
    pub fn members(&self, repeat: u32, bin: u32) -> Option<&[u32]> {
        if repeat >= self.repeats || bin >= self.bins { return None; }
        Some(self.members_at(repeat, bin))
    }

    /// Unchecked form for the query loop, which iterates in bounds.
    #[inline]
    pub(crate) fn members_at(&self, repeat: u32, bin: u32) -> &[u32] {
        &self.members[repeat as usize * self.bins as usize + bin as usize]
    }

    /// Number of sets per bin for one repeat; empty for an unknown repeat.
    pub fn bin_loads(&self, repeat: u32) -> Vec<usize> {
        if repeat >= self.repeats { return vec![]; }
        (0..self.bins).map(|b| self.members_at(repeat, b).len()).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let rec = MetaRecord {
            repeats: self.repeats,
            bins: self.bins,
            names: self.names.clone(),
            assignments: self.assignments.clone(),
            rare: self.rare.clone(),
        };
        let tmp = path.with_extension("json.tmp");
        serde_json::to_writer_pretty(File::create(&tmp)?, &rec)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let rec: MetaRecord = serde_json::from_reader(BufReader::new(f))?;
        Self::from_record(rec)
    }

    fn from_record(rec: MetaRecord) -> Result<Self> {
        let corrupt = |m: String| Err(RamboError::Corrupt(m));
        if rec.assignments.len() != rec.names.len() {
            return corrupt("partition map: names and assignments differ in length".into());
        }
        let rare = if rec.rare.is_empty() { vec![false; rec.names.len()] } else { rec.rare };
        if rare.len() != rec.names.len() {
            return corrupt("partition map: rare flags differ in length".into());
        }
        let mut lookup = HashMap::with_capacity(rec.names.len());
        for (slot, (name, bins)) in rec.names.iter().zip(&rec.assignments).enumerate() {
            if bins.len() != rec.repeats as usize || bins.iter().any(|&b| b >= rec.bins) {
                return corrupt(format!("partition map: bad assignment for {name}"));
            }
            if lookup.insert(name.clone(), slot as u32).is_some() {
                return corrupt(format!("partition map: duplicate set {name}"));
            }
        }
        let mut meta = Self {
            repeats: rec.repeats,
            bins: rec.bins,
            names: rec.names,
            assignments: rec.assignments,
            rare,
            lookup,
            members: vec![],
        };
        meta.rebuild_members();
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sets(n: usize) -> Vec<SetDescriptor> {
        (0..n).map(|i| SetDescriptor::new(i.to_string())).collect()
    }

    #[test]
    fn every_set_gets_one_bin_per_repeat() {
        let mut a = HashedAssigner { seed: 7 };
        let meta = MetaRambo::build(&sets(50), 50, 4, 6, &mut a, None).unwrap();
        for slot in 0..50u32 {
            let bins = meta.bins_of(slot).unwrap();
            assert_eq!(bins.len(), 4);
            assert!(bins.iter().all(|&b| b < 6));
            for (r, &b) in bins.iter().enumerate() {
                assert!(meta.members(r as u32, b).unwrap().contains(&slot));
            }
        }
        for r in 0..4 {
            assert_eq!(meta.bin_loads(r).iter().sum::<usize>(), 50);
        }
    }

    #[test]
    fn hashed_assignment_is_reproducible() {
        let m1 = MetaRambo::build(&sets(20), 20, 3, 5, &mut HashedAssigner { seed: 1 }, None).unwrap();
        let m2 = MetaRambo::build(&sets(20), 20, 3, 5, &mut HashedAssigner { seed: 1 }, None).unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn random_assignment_is_seeded() {
        let m1 = MetaRambo::build(&sets(20), 20, 3, 5, &mut RandomAssigner::new(3), None).unwrap();
        let m2 = MetaRambo::build(&sets(20), 20, 3, 5, &mut RandomAssigner::new(3), None).unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn rare_sets_use_reserved_bins() {
        let policy = RarePolicy { max_size: 10, reserved_bins: 2 };
        let descs = vec![
            SetDescriptor::with_size("big", 10_000),
            SetDescriptor::with_size("tiny", 3),
            SetDescriptor::new("unknown"),
        ];
        let meta = MetaRambo::build(&descs, 3, 5, 8, &mut HashedAssigner { seed: 0 }, Some(policy)).unwrap();
        assert!(meta.bins_of(1).unwrap().iter().all(|&b| b >= 6));
        assert!(meta.bins_of(0).unwrap().iter().all(|&b| b < 6));
        assert!(meta.bins_of(2).unwrap().iter().all(|&b| b < 6));
        assert!(meta.is_rare(1) && !meta.is_rare(0) && !meta.is_rare(2));
    }

    #[test]
    fn rare_policy_needs_size_hints() {
        let policy = RarePolicy { max_size: 5, reserved_bins: 2 };
        let err = MetaRambo::build(&sets(20), 20, 3, 6, &mut HashedAssigner { seed: 0 }, Some(policy));
        assert!(matches!(err, Err(RamboError::InvalidConfig(_))));
        let mut descs = sets(19);
        descs.push(SetDescriptor::with_size("small", 2));
        let meta = MetaRambo::build(&descs, 20, 3, 6, &mut HashedAssigner { seed: 0 }, Some(policy)).unwrap();
        assert!(meta.is_rare(19));
    }

    #[test]
    fn accessors_are_bounds_checked() {
        let meta = MetaRambo::build(&sets(4), 4, 2, 3, &mut HashedAssigner { seed: 0 }, None).unwrap();
        assert!(meta.bins_of(4).is_none());
        assert!(meta.members(2, 0).is_none());
        assert!(meta.members(0, 3).is_none());
        assert!(meta.members(1, 2).is_some());
        assert!(meta.bin_loads(2).is_empty());
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let dup = vec![SetDescriptor::new("a"), SetDescriptor::new("a")];
        assert!(MetaRambo::build(&dup, 5, 1, 2, &mut HashedAssigner { seed: 0 }, None).is_err());
        assert!(MetaRambo::build(&sets(6), 5, 1, 2, &mut HashedAssigner { seed: 0 }, None).is_err());
    }

    #[test]
    fn save_and_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("metarambo.json");
        let meta = MetaRambo::build(&sets(12), 16, 2, 4, &mut RandomAssigner::new(5), None).unwrap();
        meta.save(&path).unwrap();
        let back = MetaRambo::load(&path).unwrap();
        assert_eq!(meta, back);
        assert_eq!(back.slot("7"), Some(7));
    }
}
