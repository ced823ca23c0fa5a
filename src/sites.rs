//! Annotation-site support for predicted structures.
//!
//! Sites (e.g. protein binding peaks) drive two stages of a scan: grouping
//! nearby sites into the regions worth scanning at all, and afterwards
//! keeping only structures whose stems the sites actually support. Site
//! lookups go through immutable per-(contig, strand) interval trees built
//! once and passed by reference into the filtering logic.

use crate::bed::Site;
use crate::repeats::InvertedRepeat;
use coitrees::{BasicCOITree, Interval, IntervalTree};
use log::warn;
use rustc_hash::FxHashMap;
use std::ops::Range;

/// Each supported base of an arm adds this much to a candidate's score.
const SUPPORT_WEIGHT: i64 = 2;

/// A stranded region of a contig to scan for structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRegion {
    pub chrom: String,
    pub strand: char,
    pub start: i64,
    pub end: i64,
}

/// Group sites into scan regions: extend every site by `slop` on both ends
/// (two arms further apart than that cannot belong to one structure), clamp
/// to contig bounds and merge whatever overlaps or touches, per strand.
pub fn group_regions(
    sites: &[Site],
    chrom_lens: &FxHashMap<String, i64>,
    slop: i64,
) -> Vec<ScanRegion> {
    let mut grouped: FxHashMap<(String, char), Vec<(i64, i64)>> = FxHashMap::default();
    for site in sites {
        let Some(&len) = chrom_lens.get(&site.chrom) else {
            warn!("Site on unknown contig {} skipped", site.chrom);
            continue;
        };
        grouped
            .entry((site.chrom.clone(), site.strand))
            .or_default()
            .push(((site.start - slop).max(0), (site.end + slop).min(len)));
    }

    let mut regions = Vec::new();
    for ((chrom, strand), mut ranges) in grouped {
        ranges.sort_unstable();
        let mut merged: Vec<(i64, i64)> = Vec::new();
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        for (start, end) in merged {
            regions.push(ScanRegion {
                chrom: chrom.clone(),
                strand,
                start,
                end,
            });
        }
    }
    regions.sort_by(|a, b| {
        natord::compare(&a.chrom, &b.chrom)
            .then(a.strand.cmp(&b.strand))
            .then(a.start.cmp(&b.start))
    });
    regions
}

/// Immutable per-(contig, strand) interval index over annotation sites.
pub struct SiteIndex {
    trees: FxHashMap<(String, char), BasicCOITree<u32, u32>>,
    ranges: FxHashMap<(String, char), Vec<(i64, i64)>>,
}

impl SiteIndex {
    pub fn build(sites: &[Site]) -> Self {
        let mut ranges: FxHashMap<(String, char), Vec<(i64, i64)>> = FxHashMap::default();
        for site in sites {
            ranges
                .entry((site.chrom.clone(), site.strand))
                .or_default()
                .push((site.start, site.end));
        }
        let trees = ranges
            .iter()
            .map(|(key, list)| {
                let intervals: Vec<Interval<u32>> = list
                    .iter()
                    .enumerate()
                    .map(|(idx, &(start, end))| Interval {
                        first: start as i32,
                        last: (end - 1) as i32,
                        metadata: idx as u32,
                    })
                    .collect();
                (key.clone(), BasicCOITree::new(intervals.as_slice()))
            })
            .collect();
        Self { trees, ranges }
    }

    /// Total bases of `arm` covered by individual sites, counting only
    /// sites that overlap the arm by at least `min_overlap`.
    pub fn arm_support(&self, chrom: &str, strand: char, arm: &Range<i64>, min_overlap: i64) -> i64 {
        let key = (chrom.to_string(), strand);
        let Some(tree) = self.trees.get(&key) else {
            return 0;
        };
        let ranges = &self.ranges[&key];
        let mut total = 0i64;
        tree.query(arm.start as i32, (arm.end - 1) as i32, |interval| {
            let (start, end) = ranges[interval.metadata as usize];
            let overlap = arm.end.min(end) - arm.start.max(start);
            if overlap >= min_overlap {
                total += overlap;
            }
        });
        total
    }

    /// Keep a structure only when at least one of its stems is supported on
    /// both arms; the returned boost rewards every supported arm base.
    pub fn score_boost(
        &self,
        chrom: &str,
        strand: char,
        repeat: &InvertedRepeat,
        min_overlap: i64,
    ) -> Option<i64> {
        let mut supported = false;
        let mut boost = 0i64;
        for segment in repeat.segments() {
            let left = self.arm_support(chrom, strand, segment.left(), min_overlap);
            let right = self.arm_support(chrom, strand, segment.right(), min_overlap);
            supported = supported || (left > 0 && right > 0);
            boost += SUPPORT_WEIGHT * (left + right);
        }
        supported.then_some(boost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repeats::Segment;

    fn site(chrom: &str, start: i64, end: i64, strand: char) -> Site {
        Site {
            chrom: chrom.to_string(),
            start,
            end,
            strand,
        }
    }

    fn lens(pairs: &[(&str, i64)]) -> FxHashMap<String, i64> {
        pairs.iter().map(|(c, l)| (c.to_string(), *l)).collect()
    }

    #[test]
    fn test_group_regions_merges_and_clamps() {
        let sites = vec![
            site("chr1", 100, 120, '+'),
            site("chr1", 150, 160, '+'),
            site("chr1", 5000, 5010, '+'),
            site("chr1", 100, 120, '-'),
            site("chr2", 10, 20, '+'),
        ];
        let regions = group_regions(&sites, &lens(&[("chr1", 6000), ("chr2", 400)]), 100);

        assert_eq!(
            regions,
            vec![
                ScanRegion {
                    chrom: "chr1".to_string(),
                    strand: '+',
                    start: 0,
                    end: 260
                },
                ScanRegion {
                    chrom: "chr1".to_string(),
                    strand: '+',
                    start: 4900,
                    end: 5110
                },
                ScanRegion {
                    chrom: "chr1".to_string(),
                    strand: '-',
                    start: 0,
                    end: 220
                },
                ScanRegion {
                    chrom: "chr2".to_string(),
                    strand: '+',
                    start: 0,
                    end: 120
                },
            ]
        );
    }

    #[test]
    fn test_group_regions_skips_unknown_contigs() {
        let sites = vec![site("chrUn", 0, 10, '+')];
        assert!(group_regions(&sites, &lens(&[("chr1", 100)]), 50).is_empty());
    }

    #[test]
    fn test_arm_support_counts_only_qualifying_overlaps() {
        let index = SiteIndex::build(&[
            site("chr1", 100, 130, '+'),
            site("chr1", 140, 143, '+'),
            site("chr1", 100, 130, '-'),
        ]);

        // The first site overlaps by 30, the second by only 3
        assert_eq!(index.arm_support("chr1", '+', &(100..150), 10), 30);
        // Overlap below the threshold counts for nothing
        assert_eq!(index.arm_support("chr1", '+', &(125..150), 10), 0);
        // Strand and contig are part of the key
        assert_eq!(index.arm_support("chr1", '-', &(100..150), 10), 30);
        assert_eq!(index.arm_support("chr9", '+', &(100..150), 10), 0);
    }

    #[test]
    fn test_score_boost_requires_both_arms() {
        let repeat = InvertedRepeat::new(vec![Segment::new(100..120, 180..200).unwrap()]).unwrap();

        // Only the left arm is covered: the structure is unsupported
        let left_only = SiteIndex::build(&[site("chr1", 95, 125, '+')]);
        assert_eq!(left_only.score_boost("chr1", '+', &repeat, 10), None);

        // Both arms covered by one site each
        let both = SiteIndex::build(&[
            site("chr1", 95, 125, '+'),
            site("chr1", 175, 205, '+'),
        ]);
        // 20 supported bases per arm, each worth 2
        assert_eq!(both.score_boost("chr1", '+', &repeat, 10), Some(80));
    }
}
