//! Filter segment: all B cells of one repeat in one file.
//!
//! Header (LE, 32 bytes):
//!   magic[4]      = "RMBF"
//!   version[2]    = 1
//!   rsv[2]        = 0
//!   repeat[4]     = repeat index this file holds
//!   bins[4]       = number of cell records (B)
//!   k[4]          = hash count of every cell
//!   cell_bytes[4] = ceil(range / 8)
//!   range[8]      = bits per cell
//!
//! Then `bins` records, bin order: [cell bytes][crc32(cell bytes)]

use crate::consts::{CRC_SIZE, HDR_SIZE, MAGIC_FILTER_SEG, VERSION};
use crate::errors::{RamboError, Result};
use crate::filter::Bloom;
use crate::utils::{crc32, fsync_dir, read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub repeat: u32,
    pub bins: u32,
    pub k: u32,
    pub range: u64,
}

impl SegmentHeader {
    pub fn cell_bytes(&self) -> usize { Bloom::byte_len(self.range) }

    fn record_size(&self) -> usize { self.cell_bytes() + CRC_SIZE }

    fn file_len(&self) -> usize { HDR_SIZE + self.bins as usize * self.record_size() }

    fn encode(&self) -> std::io::Result<Vec<u8>> {
        let mut hdr = Vec::with_capacity(HDR_SIZE);
        hdr.extend_from_slice(MAGIC_FILTER_SEG);
        write_u16(&mut hdr, VERSION)?;
        write_u16(&mut hdr, 0)?;
        write_u32(&mut hdr, self.repeat)?;
        write_u32(&mut hdr, self.bins)?;
        write_u32(&mut hdr, self.k)?;
        write_u32(&mut hdr, self.cell_bytes() as u32)?;
        write_u64(&mut hdr, self.range)?;
        Ok(hdr)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HDR_SIZE || &buf[0..4] != MAGIC_FILTER_SEG { return Err(RamboError::BadHeader); }
        let mut cur = Cursor::new(&buf[4..HDR_SIZE]);
        if read_u16(&mut cur)? != VERSION { return Err(RamboError::BadHeader); }
        let _rsv = read_u16(&mut cur)?;
        let repeat = read_u32(&mut cur)?;
        let bins = read_u32(&mut cur)?;
        let k = read_u32(&mut cur)?;
        let cell_bytes = read_u32(&mut cur)? as usize;
        let range = read_u64(&mut cur)?;
        let hdr = Self { repeat, bins, k, range };
        if hdr.cell_bytes() != cell_bytes {
            return Err(RamboError::Corrupt(format!("cell size {cell_bytes} does not match range {range}")));
        }
        Ok(hdr)
    }
}

/// Writer: cells are appended in bin order, then the header is written and the
/// file is published atomically.
pub struct SegmentWriter {
    path_final: PathBuf,
    tmp: NamedTempFile,
    header: SegmentHeader,
    written: u32,
}

impl SegmentWriter {
    pub fn create(path: impl AsRef<Path>, header: SegmentHeader) -> Result<Self> {
        let path_final = path.as_ref().to_path_buf();
        let dir = path_final.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::Builder::new().prefix("rambo_seg_").tempfile_in(dir)?;
        tmp.as_file_mut().write_all(&[0u8; HDR_SIZE])?; // header placeholder
        Ok(Self { path_final, tmp, header, written: 0 })
    }

    pub fn add_cell(&mut self, cell: &Bloom) -> Result<()> {
        if cell.m_bits != self.header.range || cell.k != self.header.k {
            return Err(RamboError::Corrupt(format!(
                "cell geometry ({}, {}) differs from segment ({}, {})",
                cell.m_bits, cell.k, self.header.range, self.header.k
            )));
        }
        if self.written == self.header.bins {
            return Err(RamboError::Corrupt("more cells than bins".into()));
        }
        let f = self.tmp.as_file_mut();
        f.write_all(cell.as_bytes())?;
        write_u32(f, crc32(cell.as_bytes()))?;
        self.written += 1;
        Ok(())
    }

    pub fn finalize(mut self) -> Result<PathBuf> {
        if self.written != self.header.bins {
            return Err(RamboError::Corrupt(format!(
                "segment has {} cells, expected {}",
                self.written, self.header.bins
            )));
        }
        let hdr = self.header.encode()?;
        {
            let f = self.tmp.as_file_mut();
            f.seek(SeekFrom::Start(0))?;
            f.write_all(&hdr)?;
            f.sync_all()?;
        }
        let _persisted = self.tmp.persist(&self.path_final)?;
        let _ = fsync_dir(&self.path_final);
        Ok(self.path_final)
    }
}

/// Reader over a memory-mapped segment.
pub struct SegmentReader {
    _f: File,
    mmap: Mmap,
    pub header: SegmentHeader,
}

impl SegmentReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = File::open(path)?;
        let mmap = unsafe { Mmap::map(&f)? };
        let header = SegmentHeader::decode(&mmap)?;
        if mmap.len() != header.file_len() {
            return Err(RamboError::Corrupt(format!(
                "segment length {} != expected {}",
                mmap.len(),
                header.file_len()
            )));
        }
        Ok(Self { _f: f, mmap, header })
    }

    fn record(&self, bin: u32) -> Option<(&[u8], u32)> {
        if bin >= self.header.bins { return None; }
        let off = HDR_SIZE + bin as usize * self.header.record_size();
        let end = off + self.header.cell_bytes();
        let crc = u32::from_le_bytes(self.mmap[end..end + CRC_SIZE].try_into().ok()?);
        Some((&self.mmap[off..end], crc))
    }

    pub fn verify_crc(&self, bin: u32) -> bool {
        self.record(bin).is_some_and(|(bytes, want)| crc32(bytes) == want)
    }

    /// Decode one cell, checking its crc.
    pub fn cell(&self, bin: u32) -> Result<Bloom> {
        let (bytes, want) = self
            .record(bin)
            .ok_or_else(|| RamboError::Corrupt(format!("bin {bin} out of range")))?;
        if crc32(bytes) != want {
            return Err(RamboError::Corrupt(format!("crc mismatch in repeat {} bin {bin}", self.header.repeat)));
        }
        Bloom::from_bytes(self.header.range, self.header.k, bytes.to_vec())
            .ok_or_else(|| RamboError::Corrupt(format!("bin {bin} has wrong length")))
    }

    pub fn cells(&self) -> Result<Vec<Bloom>> {
        (0..self.header.bins).map(|b| self.cell(b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header() -> SegmentHeader { SegmentHeader { repeat: 2, bins: 3, k: 4, range: 1000 } }

    #[test]
    fn write_then_read() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("repeat-0002.rmbf");
        let mut w = SegmentWriter::create(&path, header()).unwrap();
        let mut cells = vec![Bloom::new(1000, 4); 3];
        cells[1].add(b"ACGT");
        for c in &cells { w.add_cell(c).unwrap(); }
        w.finalize().unwrap();

        let r = SegmentReader::open(&path).unwrap();
        assert_eq!(r.header, header());
        assert_eq!(r.cells().unwrap(), cells);
        assert!(r.cell(1).unwrap().contains(b"ACGT"));
        assert!((0..3).all(|b| r.verify_crc(b)));
    }

    #[test]
    fn refuses_short_segment() {
        let tmp = tempdir().unwrap();
        let w = SegmentWriter::create(tmp.path().join("x.rmbf"), header()).unwrap();
        assert!(matches!(w.finalize(), Err(RamboError::Corrupt(_))));
    }

    #[test]
    fn refuses_foreign_geometry() {
        let tmp = tempdir().unwrap();
        let mut w = SegmentWriter::create(tmp.path().join("x.rmbf"), header()).unwrap();
        assert!(w.add_cell(&Bloom::new(999, 4)).is_err());
    }

    #[test]
    fn detects_flipped_bit() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x.rmbf");
        let mut w = SegmentWriter::create(&path, header()).unwrap();
        for _ in 0..3 { w.add_cell(&Bloom::new(1000, 4)).unwrap(); }
        w.finalize().unwrap();

        let mut raw = std::fs::read(&path).unwrap();
        raw[HDR_SIZE + 5] ^= 0x10;
        std::fs::write(&path, &raw).unwrap();
        let r = SegmentReader::open(&path).unwrap();
        assert!(!r.verify_crc(0));
        assert!(r.cell(0).is_err());
        assert!(r.cell(1).is_ok());
    }

    #[test]
    fn detects_bad_magic() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("x.rmbf");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(matches!(SegmentReader::open(&path), Err(RamboError::BadHeader)));
    }
}
