// crates/rambo_core/src/consts.rs

pub const MAGIC_FILTER_SEG: &[u8; 4] = b"RMBF";
pub const VERSION: u16 = 1;

/// Manifest format tag, bumped together with the segment layout.
pub const MANIFEST_FORMAT: &str = "rambo/1";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const META_FILE: &str = "metarambo.json";

pub const HDR_SIZE: usize = 32;
pub const CRC_SIZE: usize = 4;

/// Seed of the 128-bit digest the Bloom positions are derived from.
pub const HASH_SEED: u64 = 0x5241_4d42_4f00_0001;
/// Default seed of the partition map (hashed and random strategies).
pub const DEFAULT_PARTITION_SEED: u64 = 0x0b1e_55ed;

pub const DEFAULT_KMER_LEN: usize = 31;
pub const DEFAULT_SEQ_THRESHOLD: f64 = 0.9;

/// Separator between element and set ids in the toy line format (`ACGT;0,3`).
pub const LINE_SEP: char = ';';
pub const ID_SEP: char = ',';

pub fn repeat_file_name(repeat: u32) -> String {
    format!("repeat-{repeat:04}.rmbf")
}

const _: () = { assert!(HDR_SIZE == 4 + 2 + 2 + 4 + 4 + 4 + 4 + 8); };
