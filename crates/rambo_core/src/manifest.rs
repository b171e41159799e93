use crate::consts::{MANIFEST_FILE, MANIFEST_FORMAT};
use crate::errors::{RamboError, Result};
use crate::params::RamboParams;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One filter segment listed by a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatRec {
    pub repeat: u32,
    #[serde(with = "path_serde")]
    pub path: PathBuf,
}

mod path_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::path::PathBuf;

    pub fn serialize<S: Serializer>(p: &PathBuf, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&p.to_string_lossy())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
        let s = String::deserialize(d)?;
        Ok(PathBuf::from(s))
    }
}

/// Describes one serialized directory ("fragment"): the parameter block of the
/// whole structure plus the repeats whose filter segments live here. Paths are
/// relative to the fragment directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: String,
    pub params: RamboParams,
    pub repeats: Vec<RepeatRec>,
}

impl Manifest {
    pub fn new(params: RamboParams) -> Self {
        Self { format: MANIFEST_FORMAT.to_string(), params, repeats: vec![] }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let p = dir.join(MANIFEST_FILE);
        let s = fs::read_to_string(p)?;
        let m: Manifest = serde_json::from_str(&s)?;
        if m.format != MANIFEST_FORMAT { return Err(RamboError::BadHeader); }
        if let Some(rec) = m.repeats.iter().find(|r| r.repeat >= m.params.r) {
            return Err(RamboError::Corrupt(format!(
                "manifest lists repeat {} but R = {}",
                rec.repeat, m.params.r
            )));
        }
        Ok(m)
    }

    pub fn save_atomic(&self, dir: &Path) -> Result<()> {
        let p = dir.join(MANIFEST_FILE);
        let tmp = dir.join(format!("{MANIFEST_FILE}.tmp"));
        let mut f = fs::File::create(&tmp)?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp, &p)?;
        Ok(())
    }

    pub fn add_repeat(&mut self, repeat: u32, name: &str) {
        self.repeats.retain(|r| r.repeat != repeat);
        self.repeats.push(RepeatRec { repeat, path: PathBuf::from(name) });
        self.repeats.sort_by_key(|r| r.repeat);
    }

    pub fn repeat_indices(&self) -> Vec<u32> {
        self.repeats.iter().map(|r| r.repeat).collect()
    }
}
