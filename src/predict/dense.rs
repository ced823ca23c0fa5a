//! Exact fold-back scan for short sequences.
//!
//! Affine-gap local alignment of the sequence (rows) against its reverse
//! complement (columns), restricted to the triangle `i + j <= n - 2` so a
//! base can only pair with a strictly later base and every pairing is
//! enumerated exactly once. All locally optimal paths are collected by
//! propagating each path's origin cell through the recurrence and keeping
//! the best-scoring end per origin; a packed one-byte trace per cell allows
//! exact affine traceback afterwards.

use super::scoring::{Score, Scoring};
use super::{RawAlignment, Run};
use rustc_hash::FxHashMap;

// Trace byte layout: bits 0-2 hold how H was reached, the flags describe
// the diagonal step and whether the E/F gap layers opened at this cell.
const SRC_MASK: u8 = 0b111;
const SRC_STOP: u8 = 0;
const SRC_DIAG: u8 = 1;
const SRC_E: u8 = 2;
const SRC_F: u8 = 3;
const SRC_START: u8 = 4;
const FLAG_MATCH: u8 = 0x08;
const FLAG_E_OPEN: u8 = 0x10;
const FLAG_F_OPEN: u8 = 0x20;

#[derive(Clone, Copy)]
struct PathEnd {
    score: Score,
    end: (u32, u32),
}

pub(crate) fn scan(seq: &[u8], rc: &[u8], scoring: &Scoring, min_score: Score) -> Vec<RawAlignment> {
    let n = seq.len();
    if n < 2 {
        return Vec::new();
    }
    let neg = Score::MIN / 4;

    let mut trace = vec![SRC_STOP; n * n];

    // Previous-column H/E values and path origins, indexed by row
    let mut h = vec![0 as Score; n];
    let mut e = vec![neg; n];
    let mut oh = vec![(0u32, 0u32); n];
    let mut oe = vec![(0u32, 0u32); n];

    let mut best: FxHashMap<(u32, u32), PathEnd> = FxHashMap::default();

    for j in 0..n - 1 {
        let row_hi = n - 1 - j;

        let mut diag: Score = 0;
        let mut odiag = (0u32, 0u32);
        let mut h_up: Score = 0;
        let mut oh_up = (0u32, 0u32);
        let mut f: Score = neg;
        let mut of = (0u32, 0u32);

        for i in 0..row_hi {
            // Gap along the sequence axis, entered from the previous column
            let e_open = h[i] + scoring.gap_open + scoring.gap_extend;
            let e_ext = e[i] + scoring.gap_extend;
            let (e_new, e_opened) = if e_open >= e_ext {
                (e_open, true)
            } else {
                (e_ext, false)
            };
            let oe_new = if e_opened { oh[i] } else { oe[i] };

            // Gap along the reverse-complement axis, entered from the row above
            let f_open = h_up + scoring.gap_open + scoring.gap_extend;
            let f_ext = f + scoring.gap_extend;
            let (f_new, f_opened) = if f_open >= f_ext {
                (f_open, true)
            } else {
                (f_ext, false)
            };
            let of_new = if f_opened { oh_up } else { of };

            let (sub, matched) = scoring.substitution(seq[i], rc[j]);
            let h_diag = diag + sub;

            let mut byte = if e_opened { FLAG_E_OPEN } else { 0 };
            if f_opened {
                byte |= FLAG_F_OPEN;
            }

            // Ties resolve diagonal-first, then E, then F
            let (h_new, oh_new) = if h_diag > 0 && h_diag >= e_new && h_diag >= f_new {
                byte |= if diag > 0 { SRC_DIAG } else { SRC_START };
                if matched {
                    byte |= FLAG_MATCH;
                }
                let origin = if diag > 0 { odiag } else { (i as u32, j as u32) };
                if matched {
                    let entry = best.entry(origin).or_insert(PathEnd {
                        score: h_diag,
                        end: (i as u32, j as u32),
                    });
                    if h_diag > entry.score {
                        entry.score = h_diag;
                        entry.end = (i as u32, j as u32);
                    }
                }
                (h_diag, origin)
            } else if e_new > 0 && e_new >= f_new {
                byte |= SRC_E;
                (e_new, oe_new)
            } else if f_new > 0 {
                byte |= SRC_F;
                (f_new, of_new)
            } else {
                (0, (i as u32, j as u32))
            };

            trace[i * n + j] = byte;

            diag = h[i];
            odiag = oh[i];
            h[i] = h_new;
            e[i] = e_new;
            oh[i] = oh_new;
            oe[i] = oe_new;
            h_up = h_new;
            oh_up = oh_new;
            f = f_new;
            of = of_new;
        }
    }

    let mut found: Vec<((u32, u32), PathEnd)> = best
        .into_iter()
        .filter(|(_, path)| path.score >= min_score)
        .collect();
    found.sort_by_key(|&(origin, _)| origin);

    found
        .into_iter()
        .map(|(origin, path)| {
            let runs = traceback(&trace, n, (path.end.0 as usize, path.end.1 as usize));
            debug_assert!(!runs.is_empty());
            debug_assert_eq!((runs[0].i as u32, runs[0].j as u32), origin);
            RawAlignment {
                runs,
                score: path.score,
            }
        })
        .collect()
}

enum State {
    H,
    E,
    F,
}

/// Walk the trace back from `end` and return the complementary-match runs
/// of the path in ascending order.
fn traceback(trace: &[u8], n: usize, end: (usize, usize)) -> Vec<Run> {
    let (mut i, mut j) = end;
    let mut state = State::H;
    let mut runs_rev: Vec<Run> = Vec::new();
    let mut cur: Option<Run> = None;

    loop {
        let byte = trace[i * n + j];
        match state {
            State::H => match byte & SRC_MASK {
                SRC_DIAG | SRC_START => {
                    if byte & FLAG_MATCH != 0 {
                        match cur.as_mut() {
                            Some(run) if run.i == i + 1 && run.j == j + 1 => {
                                run.i = i;
                                run.j = j;
                                run.len += 1;
                            }
                            _ => {
                                if let Some(run) = cur.take() {
                                    runs_rev.push(run);
                                }
                                cur = Some(Run { i, j, len: 1 });
                            }
                        }
                    }
                    if byte & SRC_MASK == SRC_START {
                        break;
                    }
                    i -= 1;
                    j -= 1;
                }
                SRC_E => state = State::E,
                SRC_F => state = State::F,
                _ => unreachable!("local alignment path must root at a fresh start"),
            },
            State::E => {
                state = if byte & FLAG_E_OPEN != 0 {
                    State::H
                } else {
                    State::E
                };
                j -= 1;
            }
            State::F => {
                state = if byte & FLAG_F_OPEN != 0 {
                    State::H
                } else {
                    State::F
                };
                i -= 1;
            }
        }
    }

    if let Some(run) = cur.take() {
        runs_rev.push(run);
    }
    runs_rev.reverse();
    runs_rev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc(seq: &[u8]) -> Vec<u8> {
        super::super::reverse_complement(seq)
    }

    #[test]
    fn test_perfect_hairpin_single_run() {
        // ACGTAC pairs GTACGT across a TTT loop
        let seq = b"ACGTACTTTGTACGT".to_vec();
        let rev = rc(&seq);
        let hits = scan(&seq, &rev, &Scoring::default(), 6);

        assert!(!hits.is_empty());
        let top = hits.iter().max_by_key(|a| a.score).unwrap();
        assert_eq!(top.score, 6);
        assert_eq!(top.runs.len(), 1);
        let run = &top.runs[0];
        assert_eq!((run.i, run.len), (0, 6));
        // Column 0 of the reverse complement is the last sequence position
        assert_eq!(run.j, 0);
    }

    #[test]
    fn test_no_pairing_no_hits() {
        // A and C have no complement partners in this sequence at all
        let seq = b"AACCAACCAACC".to_vec();
        let rev = rc(&seq);
        assert!(scan(&seq, &rev, &Scoring::default(), 1).is_empty());
    }

    #[test]
    fn test_mismatch_splits_runs() {
        // AAAA..GGGG folds back onto CCCC..TTTT; the central C:A pair is a
        // mismatch, so the best path scores 4 + 4 - 2 and reports two runs
        let seq = b"AAAACGGGGTTCCCCATTTT".to_vec();
        let rev = rc(&seq);
        let hits = scan(&seq, &rev, &Scoring::default(), 5);

        assert_eq!(hits.len(), 1);
        let top = &hits[0];
        assert_eq!(top.score, 6);
        assert_eq!(top.runs.len(), 2);
        assert_eq!((top.runs[0].i, top.runs[0].j, top.runs[0].len), (0, 0, 4));
        assert_eq!((top.runs[1].i, top.runs[1].j, top.runs[1].len), (5, 5, 4));
    }
}
