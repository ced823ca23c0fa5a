//! Inverted-repeat value types.
//!
//! An inverted repeat is an ordered stack of base-paired segments: each
//! segment pairs a `left` arm with an equally long, complementary `right`
//! arm further along the sequence. Segments are ordered outer-to-inner and
//! never cross, so the whole structure folds back as a single hairpin.
//! Values are immutable once validated; coordinate translation returns a
//! new value instead of mutating in place.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// One base-paired run within a stem: two equal-length arms with
/// `left.end <= right.start`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    left: Range<i64>,
    right: Range<i64>,
}

impl Segment {
    pub fn new(left: Range<i64>, right: Range<i64>) -> Result<Self, Error> {
        if left.start >= left.end || right.start >= right.end {
            return Err(Error::MalformedStructure(format!(
                "arm ranges must be non-empty with start < end: {left:?} vs {right:?}"
            )));
        }
        if left.end - left.start != right.end - right.start {
            return Err(Error::MalformedStructure(format!(
                "arm lengths must be equal: {left:?} vs {right:?}"
            )));
        }
        if left.end > right.start {
            return Err(Error::MalformedStructure(format!(
                "arms must not overlap or cross: {left:?} vs {right:?}"
            )));
        }
        Ok(Self { left, right })
    }

    pub fn left(&self) -> &Range<i64> {
        &self.left
    }

    pub fn right(&self) -> &Range<i64> {
        &self.right
    }

    /// Number of base pairs formed by this segment.
    pub fn paired_len(&self) -> i64 {
        self.left.end - self.left.start
    }

    /// Unpaired distance between the two arms.
    pub fn arm_gap(&self) -> i64 {
        self.right.start - self.left.end
    }

    fn shifted(&self, offset: i64) -> Self {
        Segment {
            left: self.left.start + offset..self.left.end + offset,
            right: self.right.start + offset..self.right.end + offset,
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment [{}-{}) <=> [{}-{})",
            self.left.start, self.left.end, self.right.start, self.right.end
        )
    }
}

/// A fold-back structure: one or more segments ordered outer-to-inner.
///
/// For consecutive segments, left arms ascend and right arms descend, so
/// arms are pairwise disjoint and properly nested.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvertedRepeat {
    segments: Vec<Segment>,
}

impl InvertedRepeat {
    pub fn new(segments: Vec<Segment>) -> Result<Self, Error> {
        if segments.is_empty() {
            return Err(Error::MalformedStructure(
                "an inverted repeat must have at least one segment".to_string(),
            ));
        }
        for pair in segments.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.left.end > next.left.start || next.right.end > prev.right.start {
                return Err(Error::MalformedStructure(format!(
                    "segments must be ordered outer-to-inner without overlap: {prev:?} vs {next:?}"
                )));
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Overall extent, from the outermost left arm start to the outermost
    /// right arm end.
    pub fn span(&self) -> Range<i64> {
        let first = &self.segments[0];
        first.left.start..first.right.end
    }

    /// Arm ranges in ascending sequence order: left arms outer-to-inner,
    /// then right arms inner-to-outer.
    pub fn blocks(&self) -> Vec<Range<i64>> {
        let mut blocks = Vec::with_capacity(self.segments.len() * 2);
        for segment in &self.segments {
            blocks.push(segment.left.clone());
        }
        for segment in self.segments.iter().rev() {
            blocks.push(segment.right.clone());
        }
        blocks
    }

    /// Unpaired ranges between consecutive arms (bulges and the central
    /// loop), ascending; empty ranges are skipped.
    pub fn gaps(&self) -> Vec<Range<i64>> {
        let blocks = self.blocks();
        blocks
            .windows(2)
            .filter(|w| w[0].end < w[1].start)
            .map(|w| w[0].end..w[1].start)
            .collect()
    }

    /// Total number of base pairs across all segments.
    pub fn paired_len(&self) -> i64 {
        self.segments.iter().map(|s| s.paired_len()).sum()
    }

    /// Largest unpaired distance between any segment's arms.
    pub fn max_arm_gap(&self) -> i64 {
        self.segments.iter().map(|s| s.arm_gap()).max().unwrap()
    }

    /// A copy of this structure translated by `offset`.
    pub fn shift(&self, offset: i64) -> InvertedRepeat {
        InvertedRepeat {
            segments: self.segments.iter().map(|s| s.shifted(offset)).collect(),
        }
    }
}

impl fmt::Debug for InvertedRepeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outer = &self.segments[0];
        write!(
            f,
            "InvertedRepeat {{ {} segment(s), [{}-{}) <=> [{}-{}) }}",
            self.segments.len(),
            outer.left.start,
            outer.left.end,
            outer.right.start,
            outer.right.end
        )
    }
}
