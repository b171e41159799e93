pub mod consts;
pub mod errors;
pub mod utils;
pub mod hashing;
pub mod filter;
pub mod bitarray;
pub mod setops;
pub mod params;
pub mod meta;
pub mod ingest;
pub mod segment;
pub mod manifest;
pub mod rambo;
pub mod query;
pub mod persist;

pub use bitarray::BitArray;
pub use errors::{RamboError, Result};
pub use filter::Bloom;
pub use meta::{BinAssigner, MetaRambo, SetDescriptor};
pub use params::{PartitionStrategy, RamboConfig, RamboParams, RarePolicy};
pub use query::{SeqHits, SeqQuery};
pub use rambo::{BatchReport, InsertStats, Rambo};
pub use setops::{take_intersection, take_union};
