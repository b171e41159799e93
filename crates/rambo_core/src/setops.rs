//! Set algebra over sorted, deduplicated lists of set indices.
//!
//! Candidate sets of a query are small sorted `u32` lists (one per hit bin);
//! these helpers combine them without allocating hash sets.

/// Union of two sorted lists, duplicates collapsed.
pub fn take_union(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0usize, 0usize);
    let mut out = Vec::with_capacity(a.len() + b.len());
    while i < a.len() || j < b.len() {
        let next = if j == b.len() || (i < a.len() && a[i] < b[j]) {
            i += 1; a[i - 1]
        } else if i == a.len() || b[j] < a[i] {
            j += 1; b[j - 1]
        } else {
            i += 1; j += 1; a[i - 1]
        };
        if out.last() != Some(&next) { out.push(next); }
    }
    out
}

fn intersect_pair(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (mut i, mut j) = (0usize, 0usize);
    let mut out = Vec::new();
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            if out.last() != Some(&a[i]) { out.push(a[i]); }
            i += 1; j += 1;
        }
        else if a[i] < b[j] { i += 1; } else { j += 1; }
    }
    out
}

/// Elements present in every list. Empty input yields an empty result.
pub fn take_intersection<S: AsRef<[u32]>>(sets: &[S]) -> Vec<u32> {
    let Some((first, rest)) = sets.split_first() else { return vec![]; };
    let mut acc = first.as_ref().to_vec();
    acc.dedup();
    for s in rest {
        if acc.is_empty() { break; }
        acc = intersect_pair(&acc, s.as_ref());
    }
    acc
}
