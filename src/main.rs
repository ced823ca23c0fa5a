use clap::Parser;
use irscan::bed::{self, bed12_line, Bed12Record};
use irscan::error::Error;
use irscan::optimize;
use irscan::predict;
use irscan::sites::{group_regions, ScanRegion, SiteIndex};
use log::{debug, info};
use noodles::bgzf;
use noodles::fasta;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;

/// Common options shared between all commands
#[derive(Parser, Debug)]
struct CommonOpts {
    /// Number of threads for parallel processing.
    #[clap(short = 't', long, value_parser, default_value_t = NonZeroUsize::new(num_cpus::get().max(1)).unwrap())]
    num_threads: NonZeroUsize,

    /// Verbosity level (0 = error, 1 = info, 2 = debug)
    #[clap(short, long, default_value = "0")]
    verbose: u8,
}

/// Command-line tool for finding inverted repeats in nucleotide sequences.
#[derive(Parser, Debug)]
#[command(author, version, about, disable_help_subcommand = true)]
enum Args {
    /// Predict all candidate inverted repeats as BED12
    Predict {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path to the FASTA file (plain or BGZF-compressed)
        #[clap(short = 'f', long, value_parser)]
        fasta: String,

        /// Path to a BED file with regions to scan (default: whole contigs)
        #[clap(short = 'b', long, value_parser)]
        regions: Option<String>,

        /// Minimum alignment score of a reported structure
        #[clap(short = 's', long, value_parser, default_value_t = 20)]
        min_score: i32,

        /// Minimum number of consecutive base pairs in a stem segment
        #[clap(short = 'm', long, value_parser, default_value_t = 6)]
        min_matches_run: usize,

        /// Write output to this file instead of stdout
        #[clap(short = 'o', long, value_parser)]
        output: Option<String>,
    },
    /// Select the best-scoring compatible subset of BED12 structures
    Optimize {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path to the BED12 file with candidate structures; weights are
        /// taken from the score column
        #[clap(short = 'b', long, value_parser)]
        bed: String,

        /// Write output to this file instead of stdout
        #[clap(short = 'o', long, value_parser)]
        output: Option<String>,
    },
    /// Full pipeline: group sites into regions, predict, filter by site
    /// support and select the optimal structures
    Scan {
        #[clap(flatten)]
        common: CommonOpts,

        /// Path to the FASTA file (plain or BGZF-compressed)
        #[clap(short = 'f', long, value_parser)]
        fasta: String,

        /// Path to a BED6 file with annotation sites; structures must be
        /// supported by sites on both stem arms
        #[clap(long, value_parser)]
        sites: Option<String>,

        /// Path to a BED file with regions to scan; ignored when --sites is
        /// given (default: whole contigs)
        #[clap(short = 'b', long, value_parser)]
        regions: Option<String>,

        /// Minimum alignment score of a reported structure
        #[clap(short = 's', long, value_parser, default_value_t = 20)]
        min_score: i32,

        /// Minimum number of consecutive base pairs in a stem segment
        #[clap(short = 'm', long, value_parser, default_value_t = 6)]
        min_matches_run: usize,

        /// Maximum distance between the two arms of a structure; also the
        /// slop used when grouping sites into scan regions
        #[clap(short = 'd', long, value_parser, default_value_t = 5000)]
        max_arms_distance: i64,

        /// Write output to this file instead of stdout
        #[clap(short = 'o', long, value_parser)]
        output: Option<String>,
    },
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    match args {
        Args::Predict {
            common,
            fasta,
            regions,
            min_score,
            min_matches_run,
            output,
        } => {
            init_runtime(&common);
            run_predict(
                &fasta,
                regions.as_deref(),
                min_score,
                min_matches_run,
                output.as_deref(),
            )
        }
        Args::Optimize {
            common,
            bed,
            output,
        } => {
            init_runtime(&common);
            run_optimize(&bed, output.as_deref())
        }
        Args::Scan {
            common,
            fasta,
            sites,
            regions,
            min_score,
            min_matches_run,
            max_arms_distance,
            output,
        } => {
            init_runtime(&common);
            run_scan(
                &fasta,
                sites.as_deref(),
                regions.as_deref(),
                min_score,
                min_matches_run,
                max_arms_distance,
                output.as_deref(),
            )
        }
    }
}

/// Initialize the logger and the global thread pool from common options
fn init_runtime(common: &CommonOpts) {
    env_logger::Builder::new()
        .filter_level(match common.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    ThreadPoolBuilder::new()
        .num_threads(common.num_threads.into())
        .build_global()
        .unwrap();
}

fn to_io(e: Error) -> io::Error {
    io::Error::other(e.to_string())
}

/// Read all contigs of a FASTA file, uppercased, in file order
fn read_fasta(path: &str) -> io::Result<Vec<(String, Vec<u8>)>> {
    let file = File::open(path)
        .map_err(|e| io::Error::other(format!("Failed to open FASTA file '{path}': {e}")))?;
    let inner: Box<dyn BufRead> = if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        Box::new(bgzf::io::Reader::new(file))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut reader = fasta::io::Reader::new(inner);

    let mut contigs = Vec::new();
    for result in reader.records() {
        let record = result
            .map_err(|e| io::Error::other(format!("Failed to parse FASTA file '{path}': {e}")))?;
        let bases: &[u8] = record.sequence().as_ref();
        let mut seq = bases.to_vec();
        seq.iter_mut().for_each(|b| *b = b.to_ascii_uppercase());
        let name: &[u8] = record.name().as_ref();
        contigs.push((String::from_utf8_lossy(name).into_owned(), seq));
    }
    if contigs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("FASTA file '{path}' contains no sequences"),
        ));
    }
    Ok(contigs)
}

fn read_lines(path: &str) -> io::Result<Vec<String>> {
    let file = File::open(path)
        .map_err(|e| io::Error::other(format!("Failed to open file '{path}': {e}")))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.is_empty() && !line.starts_with('#') {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn parse_err(path: &str, e: bed::ParseErr) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Failed to parse BED record in '{path}': {e}"),
    )
}

fn subsequence<'a>(
    contigs: &'a [(String, Vec<u8>)],
    index: &FxHashMap<String, usize>,
    chrom: &str,
    start: i64,
    end: i64,
) -> io::Result<&'a [u8]> {
    let &idx = index.get(chrom).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("Sequence '{chrom}' not found in FASTA file"),
        )
    })?;
    let seq = &contigs[idx].1;
    if start < 0 || end > seq.len() as i64 || start >= end {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid region {chrom}:{start}-{end}"),
        ));
    }
    Ok(&seq[start as usize..end as usize])
}

fn contig_index(contigs: &[(String, Vec<u8>)]) -> FxHashMap<String, usize> {
    contigs
        .iter()
        .enumerate()
        .map(|(idx, (name, _))| (name.clone(), idx))
        .collect()
}

/// Complement every base without reversing: a minus-strand region stored in
/// forward orientation keeps mapping to the genome by pure translation
fn complement_in_place(seq: &mut [u8]) {
    for base in seq.iter_mut() {
        *base = match *base {
            b'A' => b'T',
            b'T' => b'A',
            b'C' => b'G',
            b'G' => b'C',
            other => other,
        };
    }
}

/// Sort output lines by contig (natural order), start and content, then
/// write them to the given file or stdout
fn write_sorted(output: Option<&str>, mut entries: Vec<(String, i64, String)>) -> io::Result<()> {
    entries.sort_by(|a, b| {
        natord::compare(&a.0, &b.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    for (_, _, line) in entries {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}

fn run_predict(
    fasta_path: &str,
    regions_path: Option<&str>,
    min_score: i32,
    min_matches_run: usize,
    output: Option<&str>,
) -> io::Result<()> {
    let contigs = read_fasta(fasta_path)?;
    let index = contig_index(&contigs);

    let regions: Vec<bed::Region> = match regions_path {
        Some(path) => read_lines(path)?
            .iter()
            .map(|line| bed::parse_bed3(line).map_err(|e| parse_err(path, e)))
            .collect::<io::Result<_>>()?,
        None => contigs
            .iter()
            .map(|(name, seq)| bed::Region {
                chrom: name.clone(),
                start: 0,
                end: seq.len() as i64,
            })
            .collect(),
    };
    info!("Predicting inverted repeats in {} regions", regions.len());

    let results: Vec<Vec<(String, i64, String)>> = regions
        .par_iter()
        .map(|region| -> io::Result<Vec<(String, i64, String)>> {
            let seq = subsequence(&contigs, &index, &region.chrom, region.start, region.end)?;
            let (repeats, scores) =
                predict::run(seq, min_score, min_matches_run).map_err(to_io)?;
            debug!(
                "{}:{}-{}: {} candidates",
                region.chrom,
                region.start,
                region.end,
                repeats.len()
            );
            Ok(repeats
                .iter()
                .zip(&scores)
                .map(|(repeat, &score)| {
                    let shifted = repeat.shift(region.start);
                    let line = bed12_line(&shifted, &region.chrom, '+', ".", score as i64);
                    (region.chrom.clone(), shifted.span().start, line)
                })
                .collect())
        })
        .collect::<io::Result<_>>()?;

    write_sorted(output, results.into_iter().flatten().collect())
}

fn run_optimize(bed_path: &str, output: Option<&str>) -> io::Result<()> {
    let records: Vec<Bed12Record> = read_lines(bed_path)?
        .iter()
        .map(|line| bed::parse_bed12(line).map_err(|e| parse_err(bed_path, e)))
        .collect::<io::Result<_>>()?;
    info!("Parsed {} candidate structures", records.len());

    // Structures on different contigs or strands never conflict; each group
    // is optimized independently
    let mut groups: FxHashMap<(String, char), Vec<usize>> = FxHashMap::default();
    for (idx, record) in records.iter().enumerate() {
        groups
            .entry((record.chrom.clone(), record.strand))
            .or_default()
            .push(idx);
    }
    let mut groups: Vec<((String, char), Vec<usize>)> = groups.into_iter().collect();
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let results: Vec<Vec<(String, i64, String)>> = groups
        .par_iter()
        .map(|((chrom, strand), members)| -> io::Result<Vec<(String, i64, String)>> {
            let candidates: Vec<_> = members.iter().map(|&m| records[m].repeat.clone()).collect();
            let weights: Vec<i64> = members.iter().map(|&m| records[m].score).collect();
            let (selected, total) = optimize::run(&candidates, &weights).map_err(to_io)?;
            debug!(
                "{} ({}): {} of {} structures selected, total score {}",
                chrom,
                strand,
                selected.len(),
                members.len(),
                total
            );
            Ok(selected
                .into_iter()
                .map(|s| {
                    let record = &records[members[s]];
                    let line =
                        bed12_line(&record.repeat, chrom, *strand, &record.name, record.score);
                    (chrom.clone(), record.repeat.span().start, line)
                })
                .collect())
        })
        .collect::<io::Result<_>>()?;

    write_sorted(output, results.into_iter().flatten().collect())
}

fn run_scan(
    fasta_path: &str,
    sites_path: Option<&str>,
    regions_path: Option<&str>,
    min_score: i32,
    min_matches_run: usize,
    max_arms_distance: i64,
    output: Option<&str>,
) -> io::Result<()> {
    let contigs = read_fasta(fasta_path)?;
    let index = contig_index(&contigs);
    let chrom_lens: FxHashMap<String, i64> = contigs
        .iter()
        .map(|(name, seq)| (name.clone(), seq.len() as i64))
        .collect();

    let (regions, site_index) = match sites_path {
        Some(path) => {
            let sites: Vec<bed::Site> = read_lines(path)?
                .iter()
                .map(|line| bed::parse_bed6(line).map_err(|e| parse_err(path, e)))
                .collect::<io::Result<_>>()?;
            info!("Grouping {} annotation sites into scan regions", sites.len());
            (
                group_regions(&sites, &chrom_lens, max_arms_distance),
                Some(SiteIndex::build(&sites)),
            )
        }
        None => {
            let regions: Vec<ScanRegion> = match regions_path {
                Some(path) => read_lines(path)?
                    .iter()
                    .map(|line| {
                        bed::parse_bed3(line)
                            .map(|r| ScanRegion {
                                chrom: r.chrom,
                                strand: '+',
                                start: r.start,
                                end: r.end,
                            })
                            .map_err(|e| parse_err(path, e))
                    })
                    .collect::<io::Result<_>>()?,
                None => contigs
                    .iter()
                    .map(|(name, seq)| ScanRegion {
                        chrom: name.clone(),
                        strand: '+',
                        start: 0,
                        end: seq.len() as i64,
                    })
                    .collect(),
            };
            (regions, None)
        }
    };
    info!("Scanning {} regions", regions.len());

    let results: Vec<Vec<(String, i64, String)>> = regions
        .par_iter()
        .map(|region| -> io::Result<Vec<(String, i64, String)>> {
            let raw = subsequence(&contigs, &index, &region.chrom, region.start, region.end)?;
            let mut seq = raw.to_vec();
            if region.strand == '-' {
                complement_in_place(&mut seq);
            }

            let (repeats, scores) =
                predict::run(&seq, min_score, min_matches_run).map_err(to_io)?;

            let mut candidates = Vec::new();
            let mut weights = Vec::new();
            for (repeat, &score) in repeats.iter().zip(&scores) {
                let repeat = repeat.shift(region.start);
                if repeat.max_arm_gap() >= max_arms_distance {
                    continue;
                }
                let mut weight = score as i64;
                if let Some(site_index) = &site_index {
                    match site_index.score_boost(
                        &region.chrom,
                        region.strand,
                        &repeat,
                        min_matches_run as i64,
                    ) {
                        Some(boost) => weight += boost,
                        None => continue,
                    }
                }
                candidates.push(repeat);
                weights.push(weight);
            }

            let (selected, total) = optimize::run(&candidates, &weights).map_err(to_io)?;
            debug!(
                "{}:{}-{} ({}): {} candidates, {} selected, total score {}",
                region.chrom,
                region.start,
                region.end,
                region.strand,
                candidates.len(),
                selected.len(),
                total
            );
            Ok(selected
                .into_iter()
                .map(|s| {
                    let line = bed12_line(
                        &candidates[s],
                        &region.chrom,
                        region.strand,
                        ".",
                        weights[s],
                    );
                    (region.chrom.clone(), candidates[s].span().start, line)
                })
                .collect())
        })
        .collect::<io::Result<_>>()?;

    write_sorted(output, results.into_iter().flatten().collect())
}
