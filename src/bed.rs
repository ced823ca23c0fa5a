//! BED parsing and serialization.
//!
//! Structures travel as BED12: the whole span as chromStart/chromEnd, one
//! block per stem arm in ascending genomic order. Regions come in as BED3
//! and annotation sites as BED6.

use crate::error::Error;
use crate::repeats::{InvertedRepeat, Segment};
use std::io::Error as IoError;
use std::num::ParseIntError;

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields,
    IoError(IoError),
    InvalidField(ParseIntError),
    InvalidStrand,
    InvalidBlocks(String),
    InvalidStructure(Error),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::NotEnoughFields => write!(f, "Not enough fields in BED record"),
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            ParseErr::InvalidStrand => write!(f, "Invalid strand"),
            ParseErr::InvalidBlocks(msg) => write!(f, "Invalid BED12 blocks: {}", msg),
            ParseErr::InvalidStructure(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ParseErr {}

/// A BED3 region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

/// A stranded BED6 annotation site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub strand: char,
}

/// A structure read back from BED12.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bed12Record {
    pub chrom: String,
    pub name: String,
    pub score: i64,
    pub strand: char,
    pub repeat: InvertedRepeat,
}

impl InvertedRepeat {
    /// One BED12 line for this structure: the span as chromStart/chromEnd,
    /// one block per arm in ascending genomic order, block offsets relative
    /// to chromStart.
    pub fn to_bed12(&self, contig: &str, strand: char) -> String {
        bed12_line(self, contig, strand, ".", 0)
    }
}

/// BED12 line with an explicit name and score; the score is clamped to the
/// 0..=1000 range the format allows.
pub fn bed12_line(
    repeat: &InvertedRepeat,
    contig: &str,
    strand: char,
    name: &str,
    score: i64,
) -> String {
    let span = repeat.span();
    let blocks = repeat.blocks();
    let sizes: String = blocks
        .iter()
        .map(|b| format!("{},", b.end - b.start))
        .collect();
    let offsets: String = blocks
        .iter()
        .map(|b| format!("{},", b.start - span.start))
        .collect();
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t0\t{}\t{}\t{}",
        contig,
        span.start,
        span.end,
        name,
        score.clamp(0, 1000),
        strand,
        span.start,
        span.end,
        blocks.len(),
        sizes,
        offsets
    )
}

fn parse_strand(field: &str) -> Result<char, ParseErr> {
    match field {
        "+" => Ok('+'),
        "-" => Ok('-'),
        _ => Err(ParseErr::InvalidStrand),
    }
}

/// Parse one BED12 line back into a structure. Blocks must pair up around
/// the fold-back centre: block `t` is the left arm of segment `t` and block
/// `2k - 1 - t` its right arm.
pub fn parse_bed12(line: &str) -> Result<Bed12Record, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 12 {
        return Err(ParseErr::NotEnoughFields);
    }

    let chrom = fields[0].to_string();
    let start = fields[1].parse::<i64>().map_err(ParseErr::InvalidField)?;
    let name = fields[3].to_string();
    let score = fields[4].parse::<i64>().map_err(ParseErr::InvalidField)?;
    let strand = parse_strand(fields[5])?;
    let count = fields[9].parse::<usize>().map_err(ParseErr::InvalidField)?;

    let numbers = |field: &str| -> Result<Vec<i64>, ParseErr> {
        field
            .split(',')
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<i64>().map_err(ParseErr::InvalidField))
            .collect()
    };
    let sizes = numbers(fields[10])?;
    let offsets = numbers(fields[11])?;

    if sizes.len() != count || offsets.len() != count {
        return Err(ParseErr::InvalidBlocks(format!(
            "blockCount is {} but {} sizes and {} starts given",
            count,
            sizes.len(),
            offsets.len()
        )));
    }
    if count == 0 || count % 2 != 0 {
        return Err(ParseErr::InvalidBlocks(format!(
            "expected an even, positive number of arm blocks, got {count}"
        )));
    }

    let blocks: Vec<(i64, i64)> = sizes
        .iter()
        .zip(&offsets)
        .map(|(&size, &offset)| (start + offset, start + offset + size))
        .collect();

    let half = count / 2;
    let segments: Result<Vec<Segment>, Error> = (0..half)
        .map(|t| {
            let (ls, le) = blocks[t];
            let (rs, re) = blocks[count - 1 - t];
            Segment::new(ls..le, rs..re)
        })
        .collect();
    let repeat = InvertedRepeat::new(segments.map_err(ParseErr::InvalidStructure)?)
        .map_err(ParseErr::InvalidStructure)?;

    Ok(Bed12Record {
        chrom,
        name,
        score,
        strand,
        repeat,
    })
}

/// Parse a BED3+ line into a region; extra columns are ignored.
pub fn parse_bed3(line: &str) -> Result<Region, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return Err(ParseErr::NotEnoughFields);
    }
    Ok(Region {
        chrom: fields[0].to_string(),
        start: fields[1].parse().map_err(ParseErr::InvalidField)?,
        end: fields[2].parse().map_err(ParseErr::InvalidField)?,
    })
}

/// Parse a BED6 line into a stranded site.
pub fn parse_bed6(line: &str) -> Result<Site, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(ParseErr::NotEnoughFields);
    }
    Ok(Site {
        chrom: fields[0].to_string(),
        start: fields[1].parse().map_err(ParseErr::InvalidField)?,
        end: fields[2].parse().map_err(ParseErr::InvalidField)?,
        strand: parse_strand(fields[5])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segment_repeat() -> InvertedRepeat {
        InvertedRepeat::new(vec![
            Segment::new(100..110, 190..200).unwrap(),
            Segment::new(112..117, 150..155).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_bed12_exact_line() {
        let repeat = two_segment_repeat();
        assert_eq!(
            repeat.to_bed12("chr1", '+'),
            "chr1\t100\t200\t.\t0\t+\t100\t200\t0\t4\t10,5,5,10,\t0,12,50,90,"
        );
    }

    #[test]
    fn test_bed12_round_trip() {
        let repeat = two_segment_repeat();
        let line = bed12_line(&repeat, "chr7", '-', "ir42", 77);
        let record = parse_bed12(&line).unwrap();

        assert_eq!(record.chrom, "chr7");
        assert_eq!(record.strand, '-');
        assert_eq!(record.name, "ir42");
        assert_eq!(record.score, 77);
        assert_eq!(record.repeat, repeat);
    }

    #[test]
    fn test_bed12_score_is_clamped_on_output() {
        let repeat = two_segment_repeat();
        let line = bed12_line(&repeat, "chr1", '+', ".", 123456);
        assert_eq!(parse_bed12(&line).unwrap().score, 1000);
    }

    #[test]
    fn test_bed12_rejects_malformed_lines() {
        assert!(matches!(
            parse_bed12("chr1\t1\t2"),
            Err(ParseErr::NotEnoughFields)
        ));
        // Odd block count cannot pair into arms
        let odd = "chr1\t0\t30\t.\t0\t+\t0\t30\t0\t3\t5,5,5,\t0,10,25,";
        assert!(matches!(parse_bed12(odd), Err(ParseErr::InvalidBlocks(_))));
        // Mismatched arm lengths
        let uneven = "chr1\t0\t30\t.\t0\t+\t0\t30\t0\t2\t5,6,\t0,24,";
        assert!(matches!(
            parse_bed12(uneven),
            Err(ParseErr::InvalidStructure(_))
        ));
        // Bad strand
        let strand = "chr1\t0\t30\t.\t0\t*\t0\t30\t0\t2\t5,5,\t0,25,";
        assert!(matches!(parse_bed12(strand), Err(ParseErr::InvalidStrand)));
    }

    #[test]
    fn test_bed3_and_bed6() {
        assert_eq!(
            parse_bed3("chrX\t15\t250").unwrap(),
            Region {
                chrom: "chrX".to_string(),
                start: 15,
                end: 250
            }
        );
        assert!(parse_bed3("chrX\t15").is_err());

        assert_eq!(
            parse_bed6("chr2\t5\t25\tpeak1\t900\t-").unwrap(),
            Site {
                chrom: "chr2".to_string(),
                start: 5,
                end: 25,
                strand: '-'
            }
        );
        assert!(parse_bed6("chr2\t5\t25\tpeak1\t900").is_err());
    }
}
