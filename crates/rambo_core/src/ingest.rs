//! Raw element input: per-set element files, the `ELEMENT;id,id` line
//! format, and k-mer windows over a sequence.
use crate::consts::{ID_SEP, LINE_SEP};
use crate::errors::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Elements of one set, one per line. Blank lines and `>`/`#` header lines are skipped.
pub fn get_data(path: &Path) -> Result<Vec<String>> {
    let f = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in f.lines() {
        let line = line?;
        let t = line.trim();
        if t.is_empty() || t.starts_with('>') || t.starts_with('#') { continue; }
        out.push(t.to_string());
    }
    Ok(out)
}

/// All lines of a file, untouched.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let f = BufReader::new(File::open(path)?);
    Ok(f.lines().collect::<std::io::Result<Vec<_>>>()?)
}

/// One line of the toy format: an element and the ids of the sets holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub element: &'a str,
    pub sets: Vec<&'a str>,
}

/// `None` for malformed lines (no separator, empty element, no ids).
pub fn parse_line(line: &str) -> Option<ParsedLine<'_>> {
    let (element, ids) = line.trim().split_once(LINE_SEP)?;
    let element = element.trim();
    if element.is_empty() { return None; }
    let sets: Vec<&str> = ids.split(ID_SEP).map(str::trim).filter(|s| !s.is_empty()).collect();
    if sets.is_empty() { return None; }
    Some(ParsedLine { element, sets })
}

/// Windows of `len` bytes every `stride` bytes. Yields nothing if `seq` is shorter than `len`.
pub fn kmers(seq: &[u8], len: usize, stride: usize) -> impl Iterator<Item = &[u8]> {
    let count = if len == 0 || stride == 0 || seq.len() < len { 0 } else { (seq.len() - len) / stride + 1 };
    (0..count).map(move |i| &seq[i * stride..i * stride + len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_toy_lines() {
        let p = parse_line("ACGTACGT;0,3, 4").unwrap();
        assert_eq!(p.element, "ACGTACGT");
        assert_eq!(p.sets, vec!["0", "3", "4"]);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("ACGT").is_none());
        assert!(parse_line(";1,2").is_none());
        assert!(parse_line("ACGT;").is_none());
        assert!(parse_line("ACGT; , ").is_none());
    }

    #[test]
    fn kmer_windows() {
        let got: Vec<&[u8]> = kmers(b"ACGTAC", 4, 1).collect();
        assert_eq!(got, vec![&b"ACGT"[..], b"CGTA", b"GTAC"]);
        assert_eq!(kmers(b"ACGTACGT", 4, 4).count(), 2);
        assert_eq!(kmers(b"ACG", 4, 1).count(), 0);
        assert_eq!(kmers(b"ACGT", 0, 1).count(), 0);
    }

    #[test]
    fn get_data_skips_headers_and_blanks() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, ">set A\nAAAA\n\n  CCCC  \n# note\nGGGG").unwrap();
        assert_eq!(get_data(f.path()).unwrap(), vec!["AAAA", "CCCC", "GGGG"]);
        assert_eq!(read_lines(f.path()).unwrap().len(), 6);
    }
}
