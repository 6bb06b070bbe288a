//! Component A: the edit-distance oracle.
//!
//! Sequences are canonicalized as `@a1@a2@...@an`; distance between two
//! sequences is Levenshtein distance over the tokenised activity list,
//! which is equivalent to character-level Levenshtein on the canonical
//! strings since activity names are atomic (never split mid-token).

use std::collections::HashMap;

use rayon::prelude::*;

/// Sentinel standing in for "infinite" distance: self-distance, or any
/// distance involving the empty sequence.
pub const INFINITE_DISTANCE: usize = usize::MAX;

pub fn tokenize(sequence: &str) -> Vec<&str> {
    sequence.split('@').filter(|tok| !tok.is_empty()).collect()
}

/// Levenshtein distance between two token sequences.
pub fn levenshtein_tokens(a: &[&str], b: &[&str]) -> usize {
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();
    for i in 1..=n {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=m {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j - 1])
            };
            prev_diag = temp;
        }
    }
    row[m]
}

/// Distance between two canonical sequence strings, tokenising on `@`.
pub fn sequence_distance(s1: &str, s2: &str) -> usize {
    levenshtein_tokens(&tokenize(s1), &tokenize(s2))
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// The precomputed symmetric distance table over a set of sequences.
///
/// Distance to self, and any distance involving the empty sequence, is
/// defined to be [`INFINITE_DISTANCE`] and is never stored explicitly.
#[derive(Debug, Default)]
pub struct DistanceTable {
    table: HashMap<(String, String), usize>,
}

impl DistanceTable {
    /// Builds the full pairwise distance table. Pair computation is
    /// embarrassingly parallel, so pairs are distributed across rayon's
    /// global pool before being folded back into one map.
    pub fn build<'a, I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let seqs: Vec<&String> = sequences.into_iter().filter(|s| !s.is_empty()).collect();
        let pairs: Vec<(usize, usize)> =
            (0..seqs.len()).flat_map(|i| ((i + 1)..seqs.len()).map(move |j| (i, j))).collect();

        let table = pairs
            .into_par_iter()
            .map(|(i, j)| (pair_key(seqs[i], seqs[j]), sequence_distance(seqs[i], seqs[j])))
            .collect();
        Self { table }
    }

    /// Looks up the precomputed distance, or [`INFINITE_DISTANCE`] for
    /// self-pairs and pairs involving the empty sequence. Returns `None`
    /// only when both sequences are distinct, non-empty, and the pair is
    /// genuinely missing from the table (an engine-invariant violation at
    /// the call site).
    pub fn get(&self, s1: &str, s2: &str) -> Option<usize> {
        if s1 == s2 || s1.is_empty() || s2.is_empty() {
            return Some(INFINITE_DISTANCE);
        }
        self.table.get(&pair_key(s1, s2)).copied()
    }
}
