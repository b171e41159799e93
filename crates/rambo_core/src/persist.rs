//! Directory snapshots of a [`Rambo`] and the multi-fragment merge.
//!
//! A fragment directory holds `manifest.json`, `metarambo.json` and one
//! `repeat-XXXX.rmbf` segment per repeat it carries. A full snapshot carries
//! every repeat; sharded builds write several fragments that
//! [`Rambo::deserialize_rambo`] folds back together.

use crate::consts::{repeat_file_name, META_FILE};
use crate::errors::{RamboError, Result};
use crate::manifest::Manifest;
use crate::meta::MetaRambo;
use crate::rambo::Rambo;
use crate::segment::{SegmentHeader, SegmentReader, SegmentWriter};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

impl Rambo {
    /// Write the whole structure under `dir`.
    pub fn serialize_rambo(&self, dir: impl AsRef<Path>) -> Result<()> {
        let all: Vec<u32> = (0..self.params.r).collect();
        self.serialize_repeats(dir, &all)
    }

    /// Write a fragment holding only `repeats`.
    pub fn serialize_repeats(&self, dir: impl AsRef<Path>, repeats: &[u32]) -> Result<()> {
        let dir = dir.as_ref();
        let meta = self.meta.as_ref().ok_or(RamboError::NotConstructed)?;
        if let Some(&bad) = repeats.iter().find(|&&r| r >= self.params.r) {
            return Err(RamboError::InvalidInput(format!("repeat {bad} out of range (R = {})", self.params.r)));
        }
        fs::create_dir_all(dir)?;

        let mut man = Manifest::new(self.params.clone());
        for &repeat in repeats {
            let name = repeat_file_name(repeat);
            let header = SegmentHeader {
                repeat,
                bins: self.params.b,
                k: self.params.k,
                range: self.params.range,
            };
            let mut w = SegmentWriter::create(dir.join(&name), header)?;
            for bin in 0..self.params.b {
                w.add_cell(self.cell_at(repeat, bin))?;
            }
            w.finalize()?;
            man.add_repeat(repeat, &name);
            debug!(repeat, file = %name, "repeat written");
        }
        meta.save(&dir.join(META_FILE))?;
        man.save_atomic(dir)?;
        info!(dir = %dir.display(), repeats = man.repeats.len(), "rambo serialized");
        Ok(())
    }

    /// Rebuild a structure from one or more fragments.
    ///
    /// Fragments must agree on the parameter block and the partition map. A
    /// repeat found in several fragments has its cells OR-ed together, so
    /// fragments built from disjoint groups of sets merge into one index.
    /// Every repeat must be covered by at least one fragment.
    pub fn deserialize_rambo<P: AsRef<Path>>(dirs: &[P]) -> Result<Rambo> {
        if dirs.is_empty() {
            return Err(RamboError::InvalidInput("no fragment directories given".into()));
        }
        let mut acc: Option<Rambo> = None;
        let mut seen: Vec<bool> = vec![];
        for dir in dirs {
            let dir = dir.as_ref();
            let man = Manifest::load(dir)?;
            let meta = MetaRambo::load(&dir.join(META_FILE))?;

            if let Some(r) = &acc {
                if r.params != man.params { return Err(RamboError::ParamMismatch); }
                if r.meta.as_ref() != Some(&meta) { return Err(RamboError::MetaMismatch); }
            } else {
                let p = &man.params;
                if meta.repeats() != p.r || meta.bins() != p.b || meta.num_sets() > p.n as usize {
                    return Err(RamboError::Corrupt("partition map does not fit parameter block".into()));
                }
                seen = vec![false; p.r as usize];
                let mut r = Rambo::from_params(man.params.clone());
                r.meta = Some(meta);
                acc = Some(r);
            }
            let rambo = acc.as_mut().ok_or(RamboError::NotConstructed)?;

            for rec in &man.repeats {
                let rdr = SegmentReader::open(dir.join(&rec.path))?;
                let want = SegmentHeader {
                    repeat: rec.repeat,
                    bins: rambo.params.b,
                    k: rambo.params.k,
                    range: rambo.params.range,
                };
                if rdr.header != want { return Err(RamboError::ParamMismatch); }
                for bin in 0..want.bins {
                    let cell = rdr.cell(bin)?;
                    let idx = rambo.cell_index(rec.repeat, bin);
                    if !rambo.cells[idx].union_with(&cell) { return Err(RamboError::ParamMismatch); }
                }
                seen[rec.repeat as usize] = true;
            }
            debug!(dir = %dir.display(), repeats = ?man.repeat_indices(), "fragment merged");
        }

        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(RamboError::MissingRepeat(missing as u32));
        }
        let mut rambo = acc.ok_or(RamboError::NotConstructed)?;
        rambo.populated = true;
        info!(fragments = dirs.len(), r = rambo.params.r, b = rambo.params.b, "rambo deserialized");
        Ok(rambo)
    }
}
