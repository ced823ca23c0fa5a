//! Inverted-repeat prediction.
//!
//! A sequence is scanned against its own reverse complement for locally
//! optimal self-alignments; every alignment whose score clears `min_score`
//! becomes a candidate structure whose stem segments are the
//! complementary-match runs of length at least `min_matches_run`. Shorter
//! runs stay part of the alignment (their score is absorbed) but do not
//! become paired segments.
//!
//! Short sequences are scanned exactly; long sequences go through k-mer
//! seeding and run chaining to keep work near-linear in structure density.

use crate::error::Error;
use crate::repeats::{InvertedRepeat, Segment};

mod dense;
pub mod scoring;
mod seeded;

use log::debug;
use scoring::{Score, Scoring};

/// Sequences up to this length are scanned with the exact quadratic
/// alignment; anything longer uses the seeded scan.
const DENSE_LIMIT: usize = 2048;

/// One run of consecutive complementary matches in matrix space: row `i`
/// (sequence position of the left arm), column `j` (position in the reverse
/// complement), `len` base pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Run {
    pub i: usize,
    pub j: usize,
    pub len: usize,
}

/// A locally optimal self-alignment before conversion into a structure.
#[derive(Debug, Clone)]
pub(crate) struct RawAlignment {
    pub runs: Vec<Run>,
    pub score: Score,
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&base| match base {
            b'A' | b'a' => b'T',
            b'T' | b't' => b'A',
            b'C' | b'c' => b'G',
            b'G' | b'g' => b'C',
            b'N' | b'n' => b'N',
            _ => base,
        })
        .collect()
}

/// Uppercase the sequence and reject anything outside A/C/G/T/N.
fn normalize(seq: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(seq.len());
    for (position, &raw) in seq.iter().enumerate() {
        let base = raw.to_ascii_uppercase();
        match base {
            b'A' | b'C' | b'G' | b'T' | b'N' => out.push(base),
            _ => return Err(Error::InvalidAlphabet { position, symbol: raw }),
        }
    }
    Ok(out)
}

/// Convert the qualifying match runs of an alignment into a structure.
/// Returns `None` when no run reaches `min_matches_run`.
fn alignment_to_repeat(
    alignment: &RawAlignment,
    n: usize,
    min_matches_run: usize,
) -> Option<InvertedRepeat> {
    let mut segments = Vec::new();
    for run in &alignment.runs {
        if run.len < min_matches_run {
            continue;
        }
        let left = run.i as i64..(run.i + run.len) as i64;
        let right = (n - run.j - run.len) as i64..(n - run.j) as i64;
        let segment = Segment::new(left, right);
        debug_assert!(segment.is_ok(), "alignment produced an invalid segment");
        segments.push(segment.ok()?);
    }
    if segments.is_empty() {
        return None;
    }
    let repeat = InvertedRepeat::new(segments);
    debug_assert!(repeat.is_ok(), "alignment produced an invalid structure");
    repeat.ok()
}

/// Predict candidate inverted repeats in `seq`.
///
/// Returns the candidates with their alignment scores, ordered by span.
/// Coordinates are 0-based half-open positions within `seq`.
pub fn run(
    seq: &[u8],
    min_score: Score,
    min_matches_run: usize,
) -> Result<(Vec<InvertedRepeat>, Vec<Score>), Error> {
    if min_score <= 0 {
        return Err(Error::InvalidParameter(format!(
            "min_score must be positive, got {min_score}"
        )));
    }
    if min_matches_run == 0 {
        return Err(Error::InvalidParameter(
            "min_matches_run must be positive".to_string(),
        ));
    }
    if seq.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let norm = normalize(seq)?;
    let rc = reverse_complement(&norm);
    let scoring = Scoring::default();
    let n = norm.len();

    let raw = if n <= DENSE_LIMIT {
        dense::scan(&norm, &rc, &scoring, min_score)
    } else {
        seeded::scan(&norm, &rc, &scoring, min_score, min_matches_run)
    };
    debug!(
        "{} locally optimal self-alignments in {} bp sequence",
        raw.len(),
        n
    );

    let mut out: Vec<(InvertedRepeat, Score)> = raw
        .iter()
        .filter_map(|alignment| {
            alignment_to_repeat(alignment, n, min_matches_run)
                .map(|repeat| (repeat, alignment.score))
        })
        .collect();
    out.sort_by_key(|(repeat, score)| (repeat.span().start, repeat.span().end, *score));

    Ok(out.into_iter().unzip())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complement(base: u8) -> u8 {
        match base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            other => other,
        }
    }

    /// Every arm pair of every segment must be complementary in the input.
    fn assert_pairing(seq: &[u8], repeats: &[InvertedRepeat]) {
        for repeat in repeats {
            for segment in repeat.segments() {
                let (left, right) = (segment.left(), segment.right());
                for t in 0..segment.paired_len() {
                    let a = seq[(left.start + t) as usize];
                    let b = seq[(right.end - 1 - t) as usize];
                    assert_eq!(complement(a), b, "arms must base-pair: {repeat:?}");
                }
            }
        }
    }

    #[test]
    fn test_a_runs_pair_t_runs() {
        let seq = b"AAAAATTTTTAAAAATTTT";
        let (repeats, scores) = run(seq, 5, 2).unwrap();

        assert!(!repeats.is_empty());
        assert_eq!(repeats.len(), scores.len());
        assert!(scores.iter().all(|&s| s >= 5));
        assert_pairing(seq, &repeats);

        // At least one candidate pairs an A run with a complementary T run
        let paired = repeats.iter().any(|r| {
            r.segments().iter().any(|s| {
                (s.left().start..s.left().end).all(|p| seq[p as usize] == b'A')
                    && (s.right().start..s.right().end).all(|p| seq[p as usize] == b'T')
            })
        });
        assert!(paired);
    }

    #[test]
    fn test_perfect_hairpin_coordinates() {
        // ACGTAC | TTT | GTACGT
        let (repeats, scores) = run(b"ACGTACTTTGTACGT", 6, 6).unwrap();
        assert_eq!(repeats.len(), 1);
        assert_eq!(scores, vec![6]);
        let segments = repeats[0].segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].left(), &(0..6));
        assert_eq!(segments[0].right(), &(9..15));
    }

    #[test]
    fn test_short_runs_are_not_segments() {
        // The mismatched stem AAAA-C | GGGG vs CCCC-A | TTTT aligns as two
        // 4 bp runs; with min_matches_run above 4 no segment qualifies
        let seq = b"AAAACGGGGTTCCCCATTTT";
        let (repeats, _) = run(seq, 5, 2).unwrap();
        assert!(repeats.iter().all(|r| r
            .segments()
            .iter()
            .all(|s| s.paired_len() >= 2)));
        assert!(!repeats.is_empty());

        let (repeats, _) = run(seq, 5, 5).unwrap();
        assert!(repeats.is_empty());
    }

    #[test]
    fn test_lowercase_is_normalized() {
        let upper = run(b"ACGTACTTTGTACGT", 6, 6).unwrap();
        let lower = run(b"acgtacTTTgtacgt", 6, 6).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            run(b"ACGTX", 5, 2),
            Err(Error::InvalidAlphabet {
                position: 4,
                symbol: b'X'
            })
        );
        assert!(matches!(
            run(b"ACGT", 0, 2),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            run(b"ACGT", 5, 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_sequence_is_not_an_error() {
        assert_eq!(run(b"", 5, 2), Ok((Vec::new(), Vec::new())));
    }

    #[test]
    fn test_unknown_bases_never_pair() {
        // N opposite N would be an identity match in matrix space; it must
        // not be reported as a paired segment
        let (repeats, _) = run(b"NNNNNNNNNN", 1, 1).unwrap();
        assert!(repeats.is_empty());
    }

    #[test]
    fn test_random_sequence_properties() {
        // Deterministic pseudo-random sequence
        let mut state = 0x2545f4914f6cdd1du64;
        let seq: Vec<u8> = (0..300)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(state >> 33) as usize % 4]
            })
            .collect();

        let (min_score, min_run) = (8, 4);
        let (repeats, scores) = run(&seq, min_score, min_run).unwrap();
        assert_eq!(repeats.len(), scores.len());
        assert!(scores.iter().all(|&s| s >= min_score));
        assert_pairing(&seq, &repeats);
        for repeat in &repeats {
            let span = repeat.span();
            assert!(span.start >= 0 && span.end <= seq.len() as i64);
            for segment in repeat.segments() {
                assert!(segment.paired_len() >= min_run as i64);
            }
        }
    }

    #[test]
    fn test_long_sequence_uses_seeded_scan() {
        let arm = b"ATCGGCTAAGCTTGCACGGATCTGACTGGTAC";
        let mut seq: Vec<u8> = b"AAC".repeat(700);
        let left_start = seq.len() as i64;
        seq.extend_from_slice(arm);
        seq.extend_from_slice(&b"AAC".repeat(17));
        let right_start = seq.len() as i64;
        seq.extend_from_slice(&reverse_complement(arm));
        seq.extend_from_slice(&b"AAC".repeat(10));
        assert!(seq.len() > DENSE_LIMIT);

        let (repeats, scores) = run(&seq, 25, 20).unwrap();
        assert_eq!(repeats.len(), 1);
        assert_eq!(scores, vec![32]);
        let segments = repeats[0].segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].left(), &(left_start..left_start + 32));
        assert_eq!(segments[0].right(), &(right_start..right_start + 32));
    }
}
