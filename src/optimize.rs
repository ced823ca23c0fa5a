//! Selection of a maximum-weight set of compatible structures.
//!
//! Two candidates may be selected together when their footprints are
//! disjoint and they do not interleave: either their spans are disjoint, or
//! one lies entirely inside a single unpaired gap (bulge or loop) of the
//! other. Nesting a hairpin inside another hairpin's loop is allowed;
//! crossing (pseudoknot-like) arrangements are not. These are the families
//! a single planar fold supports.
//!
//! This makes the optimum computable exactly: candidates are processed in
//! ascending span-length order, each one's effective gain is its caller
//! score plus the optimal selection inside each of its gaps, and every
//! level is a weighted-interval-scheduling pass over span-disjoint
//! candidates. Ties are broken in favour of including a candidate, with
//! candidates ordered by (span end, span start, input index).

use crate::error::Error;
use crate::repeats::InvertedRepeat;
use log::debug;
use std::ops::Range;

struct Pool<'a> {
    spans: &'a [Range<i64>],
    /// Candidate indices ordered by (span start, span end, index)
    by_start: &'a [usize],
    /// Span starts in `by_start` order, for binary search
    starts: &'a [i64],
    gain: &'a [i64],
    /// Fully expanded nested picks per candidate
    nested: &'a [Vec<usize>],
}

/// Best selection among candidates whose span lies entirely inside `range`.
/// Returns the achievable gain and the picked candidates, nested ones
/// included.
fn solve(pool: &Pool<'_>, range: &Range<i64>) -> (i64, Vec<usize>) {
    let lo = pool.starts.partition_point(|&s| s < range.start);
    let mut eligible: Vec<usize> = pool.by_start[lo..]
        .iter()
        .take_while(|&&c| pool.spans[c].start < range.end)
        .filter(|&&c| pool.spans[c].end <= range.end)
        .copied()
        .collect();
    if eligible.is_empty() {
        return (0, Vec::new());
    }
    eligible.sort_by_key(|&c| (pool.spans[c].end, pool.spans[c].start, c));
    let ends: Vec<i64> = eligible.iter().map(|&c| pool.spans[c].end).collect();

    // dp[t]: best gain over the first t eligible candidates
    let mut dp = vec![0i64; eligible.len() + 1];
    let mut taken = vec![false; eligible.len() + 1];
    let mut jump = vec![0usize; eligible.len() + 1];
    for t in 1..=eligible.len() {
        let c = eligible[t - 1];
        // Last candidate whose span ends at or before this one's start
        let p = ends[..t - 1].partition_point(|&e| e <= pool.spans[c].start);
        let take = dp[p] + pool.gain[c];
        if take >= dp[t - 1] {
            dp[t] = take;
            taken[t] = true;
            jump[t] = p;
        } else {
            dp[t] = dp[t - 1];
        }
    }

    let mut picks = Vec::new();
    let mut t = eligible.len();
    while t > 0 {
        if taken[t] {
            let c = eligible[t - 1];
            picks.push(c);
            picks.extend_from_slice(&pool.nested[c]);
            t = jump[t];
        } else {
            t -= 1;
        }
    }
    (dp[eligible.len()], picks)
}

/// Select the subset of `candidates` maximizing the total of `scores`.
///
/// Returns the selected candidate indices (ascending by span) and the exact
/// total score of the selection. Empty input yields an empty selection.
pub fn run(candidates: &[InvertedRepeat], scores: &[i64]) -> Result<(Vec<usize>, i64), Error> {
    if candidates.len() != scores.len() {
        return Err(Error::LengthMismatch {
            candidates: candidates.len(),
            scores: scores.len(),
        });
    }
    if candidates.is_empty() {
        return Ok((Vec::new(), 0));
    }

    let n = candidates.len();
    let spans: Vec<Range<i64>> = candidates.iter().map(|c| c.span()).collect();

    let mut by_start: Vec<usize> = (0..n).collect();
    by_start.sort_by_key(|&c| (spans[c].start, spans[c].end, c));
    let starts: Vec<i64> = by_start.iter().map(|&c| spans[c].start).collect();

    // Gaps can only hold strictly shorter spans, so ascending span-length
    // order guarantees nested gains are ready when a candidate is processed
    let mut by_len: Vec<usize> = (0..n).collect();
    by_len.sort_by_key(|&c| (spans[c].end - spans[c].start, spans[c].start, c));

    let mut gain = vec![0i64; n];
    let mut nested: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &c in &by_len {
        let mut total = scores[c];
        let mut picks = Vec::new();
        for gap in candidates[c].gaps() {
            let pool = Pool {
                spans: &spans,
                by_start: &by_start,
                starts: &starts,
                gain: &gain,
                nested: &nested,
            };
            let (inside, inside_picks) = solve(&pool, &gap);
            total += inside;
            picks.extend(inside_picks);
        }
        gain[c] = total;
        nested[c] = picks;
    }

    let full = spans.iter().map(|s| s.start).min().unwrap()
        ..spans.iter().map(|s| s.end).max().unwrap();
    let pool = Pool {
        spans: &spans,
        by_start: &by_start,
        starts: &starts,
        gain: &gain,
        nested: &nested,
    };
    let (total, mut selected) = solve(&pool, &full);

    selected.sort_by_key(|&c| (spans[c].start, spans[c].end, c));
    debug_assert_eq!(total, selected.iter().map(|&c| scores[c]).sum::<i64>());
    debug!(
        "selected {} of {} candidates, total score {}",
        selected.len(),
        n,
        total
    );
    Ok((selected, total))
}
