//! Seeded fold-back scan for long sequences.
//!
//! The dense scan is quadratic in sequence length, so longer inputs go
//! through k-mer seeding instead: index the reverse complement, collect
//! exact seed hits inside the fold-back triangle, merge overlapping hits on
//! the same diagonal into maximal complementary-match runs, then chain runs
//! with scored mismatch/gap bridges. Work stays near-linear in the number
//! of seed hits, i.e. in the density of self-complementary structure.

use super::scoring::{Score, Scoring};
use super::{RawAlignment, Run};
use rustc_hash::FxHashMap;

const MIN_SEED_LEN: usize = 8;
const MAX_SEED_LEN: usize = 16;

// Chaining bounds: maximum bridged distance per axis and how many previous
// runs are considered as chain predecessors.
const MAX_CHAIN_GAP: usize = 4096;
const MAX_LOOKBACK: usize = 64;

#[inline]
fn encode(base: u8) -> Option<u64> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// All k-mer start positions, keyed by packed k-mer; windows containing `N`
/// are skipped.
fn kmer_positions(seq: &[u8], k: usize) -> FxHashMap<u64, Vec<u32>> {
    let mut index: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
    let mask = (1u64 << (2 * k)) - 1;
    let mut kmer = 0u64;
    let mut valid = 0usize;

    for (pos, &base) in seq.iter().enumerate() {
        match encode(base) {
            Some(code) => {
                kmer = ((kmer << 2) | code) & mask;
                valid += 1;
            }
            None => {
                valid = 0;
            }
        }
        if valid >= k {
            index.entry(kmer).or_default().push((pos + 1 - k) as u32);
        }
    }
    index
}

pub(crate) fn scan(
    seq: &[u8],
    rc: &[u8],
    scoring: &Scoring,
    min_score: Score,
    min_matches_run: usize,
) -> Vec<RawAlignment> {
    let n = seq.len();
    let k = min_matches_run.clamp(MIN_SEED_LEN, MAX_SEED_LEN);
    if n < 2 * k {
        return Vec::new();
    }

    // Seed hits (i, j) inside the fold-back triangle: the innermost seeded
    // pair must still pair a base with a strictly later one
    let index = kmer_positions(rc, k);
    let mask = (1u64 << (2 * k)) - 1;
    let mut hits: Vec<(u32, u32)> = Vec::new();
    let mut kmer = 0u64;
    let mut valid = 0usize;
    for (pos, &base) in seq.iter().enumerate() {
        match encode(base) {
            Some(code) => {
                kmer = ((kmer << 2) | code) & mask;
                valid += 1;
            }
            None => {
                valid = 0;
            }
        }
        if valid >= k {
            let i = pos + 1 - k;
            if let Some(cols) = index.get(&kmer) {
                for &j in cols {
                    if i + j as usize <= n - 2 * k {
                        hits.push((i as u32, j));
                    }
                }
            }
        }
    }
    if hits.is_empty() {
        return Vec::new();
    }

    // Merge overlapping/adjacent hits on the same diagonal into maximal
    // exact runs, then trim each run at the fold-back centre
    hits.sort_by_key(|&(i, j)| (i as i64 - j as i64, i));
    let mut runs: Vec<Run> = Vec::new();
    for &(i, j) in &hits {
        let (i, j) = (i as usize, j as usize);
        match runs.last_mut() {
            Some(run)
                if (run.i as i64 - run.j as i64) == (i as i64 - j as i64)
                    && i <= run.i + run.len =>
            {
                run.len = i + k - run.i;
            }
            _ => runs.push(Run { i, j, len: k }),
        }
    }
    for run in &mut runs {
        run.len = run.len.min((n - run.i - run.j) / 2);
    }
    runs.retain(|run| run.len >= min_matches_run);
    if runs.is_empty() {
        return Vec::new();
    }

    // Chain runs with scored bridges; runs sorted by position so every
    // predecessor of a chain step appears earlier
    runs.sort_by_key(|run| (run.i, run.j));
    let run_score = |run: &Run| run.len as Score * scoring.match_score;

    let mut chain: Vec<Score> = Vec::with_capacity(runs.len());
    let mut prev: Vec<Option<usize>> = vec![None; runs.len()];
    for t in 0..runs.len() {
        let mut best = run_score(&runs[t]);
        for s in (t.saturating_sub(MAX_LOOKBACK)..t).rev() {
            if runs[s].i + runs[s].len > runs[t].i || runs[s].j + runs[s].len > runs[t].j {
                continue;
            }
            let di = runs[t].i - (runs[s].i + runs[s].len);
            let dj = runs[t].j - (runs[s].j + runs[s].len);
            if di > MAX_CHAIN_GAP || dj > MAX_CHAIN_GAP {
                continue;
            }
            let cand = chain[s] + run_score(&runs[t]) + scoring.bridge_cost(di, dj);
            if cand > best {
                best = cand;
                prev[t] = Some(s);
            }
        }
        chain.push(best);
    }

    // Emit chains by descending score; a run supports at most one candidate
    let mut order: Vec<usize> = (0..runs.len()).collect();
    order.sort_by_key(|&t| (-(chain[t] as i64), runs[t].i, runs[t].j));

    let mut used = vec![false; runs.len()];
    let mut results = Vec::new();
    for t in order {
        if chain[t] < min_score {
            continue;
        }
        let mut members = Vec::new();
        let mut cursor = Some(t);
        while let Some(s) = cursor {
            members.push(s);
            cursor = prev[s];
        }
        if members.iter().any(|&s| used[s]) {
            continue;
        }
        members.reverse();
        for &s in &members {
            used[s] = true;
        }
        results.push(RawAlignment {
            runs: members.iter().map(|&s| runs[s].clone()).collect(),
            score: chain[t],
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(seq: &[u8]) -> Vec<u8> {
        super::super::reverse_complement(seq)
    }

    #[test]
    fn test_kmer_index_skips_unknown_bases() {
        let index = kmer_positions(b"ACGTNACGT", 4);
        let key = {
            // ACGT packed with A=0, C=1, G=2, T=3
            0b00_01_10_11u64
        };
        assert_eq!(index.get(&key), Some(&vec![0, 5]));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_planted_stem_is_found() {
        // A/C background never pairs with itself, so the only seeds come
        // from the planted arm and its reverse complement
        let arm = b"ATCGGCTAAGCTTGCACGGATCTGACTGGTAC".to_vec();
        let mut seq: Vec<u8> = b"AAC".repeat(40);
        let left_start = seq.len();
        seq.extend_from_slice(&arm);
        seq.extend_from_slice(&b"AAC".repeat(10));
        let right_start = seq.len();
        seq.extend_from_slice(&rc(&arm));
        seq.extend_from_slice(&b"AAC".repeat(8));

        let rev = rc(&seq);
        let hits = scan(&seq, &rev, &Scoring::default(), 20, 20);

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.score, 32);
        assert_eq!(hit.runs.len(), 1);
        let run = &hit.runs[0];
        assert_eq!((run.i, run.len), (left_start, 32));
        // Column j maps to sequence position n - 1 - j; the run's partner
        // block is the planted right arm
        assert_eq!(seq.len() - run.j - run.len, right_start);
    }

    #[test]
    fn test_bulged_stem_chains_two_runs() {
        let arm_a = b"ATCGGCTAAGCTTGCACGGATCTG".to_vec();
        let arm_b = b"GATTCGCAGCTTCAAGGCCTATGG".to_vec();
        let mut seq: Vec<u8> = b"AAC".repeat(10);
        seq.extend_from_slice(&arm_a);
        seq.extend_from_slice(&arm_b);
        seq.extend_from_slice(&b"AAC".repeat(12));
        seq.extend_from_slice(&rc(&arm_b));
        seq.extend_from_slice(b"ACA"); // bulge between the right arms
        seq.extend_from_slice(&rc(&arm_a));
        seq.extend_from_slice(&b"AAC".repeat(6));

        let rev = rc(&seq);
        let scoring = Scoring::default();
        let hits = scan(&seq, &rev, &scoring, 20, 20);

        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.runs.len(), 2);
        assert_eq!(hit.runs[0].len, 24);
        assert_eq!(hit.runs[1].len, 24);
        // 48 matched pairs bridged by one 3-base gap on the right-arm side
        assert_eq!(hit.score, 48 + scoring.bridge_cost(0, 3));
    }
}
