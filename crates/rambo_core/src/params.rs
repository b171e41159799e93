//! Construction parameters: the user-facing config and the derived block.
use crate::consts::DEFAULT_PARTITION_SEED;
use crate::errors::{RamboError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::LN_2;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How sets are spread over the bins of each repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PartitionStrategy {
    /// Bin = blake3(seed, repeat, name) mod B. Reproducible from the names alone.
    Hashed { seed: u64 },
    /// Uniform draws from a seeded `StdRng`, in set order.
    Random { seed: u64 },
}

impl Default for PartitionStrategy {
    fn default() -> Self { PartitionStrategy::Hashed { seed: DEFAULT_PARTITION_SEED } }
}

/// Sets with at most `max_size` elements are kept in the last `reserved_bins`
/// bins of every repeat, away from the large sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarePolicy {
    pub max_size: usize,
    pub reserved_bins: u32,
}

/// Config file / CLI view of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamboConfig {
    /// Number of reference sets (width of every result vector).
    pub sets: u32,
    pub repeats: u32,
    pub bins: u32,
    /// Expected distinct elements per filter cell.
    pub capacity: u64,
    /// Target false-positive rate of one cell.
    pub fpr: f64,
    /// Overrides the derived hash count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<u32>,
    #[serde(default)]
    pub partition: PartitionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rare: Option<RarePolicy>,
}

impl Default for RamboConfig {
    fn default() -> Self {
        Self {
            sets: 100,
            repeats: 3,
            bins: 10,
            capacity: 100_000,
            fpr: 0.01,
            hashes: None,
            partition: PartitionStrategy::default(),
            rare: None,
        }
    }
}

impl RamboConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path)?;
        let cfg: RamboConfig = serde_json::from_reader(BufReader::new(f))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |m: String| Err(RamboError::InvalidConfig(m));
        if self.sets == 0 { return bad("sets must be > 0".into()); }
        if self.repeats == 0 { return bad("repeats must be > 0".into()); }
        if self.bins == 0 { return bad("bins must be > 0".into()); }
        if self.capacity == 0 { return bad("capacity must be > 0".into()); }
        if !(self.fpr > 0.0 && self.fpr < 1.0) {
            return bad(format!("fpr must be in (0,1), got {}", self.fpr));
        }
        if self.hashes == Some(0) { return bad("hashes must be > 0".into()); }
        if let Some(rare) = self.rare {
            if rare.reserved_bins == 0 || rare.reserved_bins >= self.bins {
                return bad(format!(
                    "rare.reserved_bins must be in [1, {}), got {}",
                    self.bins, rare.reserved_bins
                ));
            }
        }
        Ok(())
    }
}

/// Parameter block persisted with a structure; fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamboParams {
    pub n: u32,
    pub r: u32,
    pub b: u32,
    pub p: f64,
    pub k: u32,
    /// Bits per filter cell.
    pub range: u64,
    /// Estimated rate at which a non-owning set survives all R repeats.
    pub fpr: f64,
    pub capacity: u64,
    pub partition: PartitionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rare: Option<RarePolicy>,
}

impl RamboParams {
    pub fn from_config(cfg: &RamboConfig) -> Result<Self> {
        cfg.validate()?;
        let k = cfg.hashes.unwrap_or_else(|| optimal_hashes(cfg.fpr));
        let range = optimal_range(cfg.capacity, cfg.fpr);
        let fpr = cell_fpr(k, cfg.capacity, range).powi(cfg.repeats as i32);
        Ok(Self {
            n: cfg.sets,
            r: cfg.repeats,
            b: cfg.bins,
            p: cfg.fpr,
            k,
            range,
            fpr,
            capacity: cfg.capacity,
            partition: cfg.partition,
            rare: cfg.rare,
        })
    }

    pub fn num_cells(&self) -> usize { self.r as usize * self.b as usize }

    /// Bytes of filter data for the whole matrix.
    pub fn matrix_bytes(&self) -> u64 { self.num_cells() as u64 * self.range.div_ceil(8) }
}

/// `ceil(-ln p / ln 2)`, at least 1.
pub fn optimal_hashes(p: f64) -> u32 {
    ((-p.ln() / LN_2).ceil() as u32).max(1)
}

/// `ceil(-(n ln p) / (ln 2)^2)` bits, at least 8.
pub fn optimal_range(capacity: u64, p: f64) -> u64 {
    ((-(capacity as f64) * p.ln() / (LN_2 * LN_2)).ceil() as u64).max(8)
}

/// Classic Bloom estimate `(1 - e^{-kn/m})^k` for one cell.
pub fn cell_fpr(k: u32, capacity: u64, range: u64) -> f64 {
    (1.0 - (-(k as f64) * capacity as f64 / range as f64).exp()).powi(k as i32)
}
