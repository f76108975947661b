//! View decoded records from a BAM file as tab-separated text.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use readscan_lib::reader::{BamReader, ReaderOptions};
use readscan_lib::record::ReadRecord;
use readscan_lib::requirements::ReadRequirements;

use crate::commands::command::Command;

/// View decoded alignment records as text.
///
/// Scans the whole file, or a single region when `--region` is given
/// (requires a `<input>.bai` index). Each kept record prints as one
/// tab-separated line: name, position, strand, mapping quality, CIGAR,
/// sequence, and aux fields when `--parse-aux` is set.
#[derive(Debug, Parser)]
#[command(
    name = "view",
    about = "View decoded alignment records as tab-separated text",
    long_about = r#"
View decoded alignment records as tab-separated text.

Scans the whole file by default. With --region REF:START-END (1-based,
inclusive, like samtools) only records overlapping the region are visited,
which requires a companion <input>.bai index.

Filtering flags drop duplicate, QC-failed, improperly placed, secondary,
supplementary, and unaligned records unless the matching --keep-* flag is
given. --downsample-fraction keeps each passing record with the given
probability, deterministically for a fixed --seed.

Example usage:
  readscan view -i input.bam
  readscan view -i input.bam -r chr1:10000-20000 --min-mapping-quality 30
  readscan view -i input.bam --downsample-fraction 0.1 --seed 42 --parse-aux
"#
)]
pub struct View {
    /// Input BAM file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Region to view, as REF:START-END (1-based, inclusive)
    #[arg(short = 'r', long = "region")]
    pub region: Option<String>,

    /// Decode aux fields and print them after the fixed columns
    #[arg(long = "parse-aux", default_value = "false")]
    pub parse_aux: bool,

    /// Fraction of records to keep; 0 disables downsampling
    #[arg(short = 'f', long = "downsample-fraction", default_value = "0.0")]
    pub downsample_fraction: f64,

    /// Random seed for downsampling
    #[arg(short = 's', long = "seed", default_value = "42")]
    pub seed: u64,

    /// Minimum mapping quality; 0 disables the check
    #[arg(long = "min-mapping-quality", default_value = "0")]
    pub min_mapping_quality: u8,

    /// Keep records marked as duplicates
    #[arg(long = "keep-duplicates", default_value = "false")]
    pub keep_duplicates: bool,

    /// Keep records that failed vendor quality checks
    #[arg(long = "keep-qc-fails", default_value = "false")]
    pub keep_qc_fails: bool,

    /// Keep records whose pair is not properly placed
    #[arg(long = "keep-improper-pairs", default_value = "false")]
    pub keep_improper_pairs: bool,

    /// Keep secondary alignments
    #[arg(long = "keep-secondary", default_value = "false")]
    pub keep_secondary: bool,

    /// Keep supplementary alignments
    #[arg(long = "keep-supplementary", default_value = "false")]
    pub keep_supplementary: bool,

    /// Keep unaligned records
    #[arg(long = "keep-unaligned", default_value = "false")]
    pub keep_unaligned: bool,

    /// Disable all filtering (overrides the keep flags)
    #[arg(long = "no-filter", default_value = "false")]
    pub no_filter: bool,

    /// Stop after printing this many records
    #[arg(short = 'n', long = "limit")]
    pub limit: Option<u64>,
}

impl View {
    fn reader_options(&self) -> ReaderOptions {
        let read_requirements = if self.no_filter {
            None
        } else {
            Some(ReadRequirements {
                keep_duplicates: self.keep_duplicates,
                keep_failed_vendor_quality_checks: self.keep_qc_fails,
                keep_improperly_placed: self.keep_improper_pairs,
                keep_secondary_alignments: self.keep_secondary,
                keep_supplementary_alignments: self.keep_supplementary,
                keep_unaligned: self.keep_unaligned,
                min_mapping_quality: self.min_mapping_quality,
                ..ReadRequirements::default()
            })
        };
        ReaderOptions {
            aux_field_handling: if self.parse_aux {
                readscan_lib::convert::AuxFieldHandling::ParseAll
            } else {
                readscan_lib::convert::AuxFieldHandling::SkipAll
            },
            downsample_fraction: self.downsample_fraction,
            random_seed: self.seed,
            read_requirements,
            ..ReaderOptions::default()
        }
    }
}

impl Command for View {
    fn execute(&self) -> Result<()> {
        let mut reader = BamReader::open(&self.input, self.reader_options())
            .with_context(|| format!("Failed to open input BAM: {}", self.input.display()))?;

        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());

        let mut printed = 0u64;
        let limit = self.limit.unwrap_or(u64::MAX);

        let records = match &self.region {
            Some(region) => {
                let (name, start, end) = parse_region(region)?;
                reader.query(&name, start, end)?
            }
            None => reader.records()?,
        };

        for record in records {
            if printed >= limit {
                break;
            }
            let record = record?;
            write_record(&mut out, &record)?;
            printed += 1;
        }

        out.flush()?;
        reader.close()?;
        info!("Printed {printed} records from {}", self.input.display());
        Ok(())
    }
}

/// Parses `REF:START-END` (1-based, inclusive) into a 0-based half-open
/// interval.
fn parse_region(region: &str) -> Result<(String, i64, i64)> {
    let Some((name, span)) = region.rsplit_once(':') else {
        bail!("region '{region}' is not in REF:START-END form");
    };
    let Some((start, end)) = span.split_once('-') else {
        bail!("region '{region}' is not in REF:START-END form");
    };
    let start: i64 = start
        .replace(',', "")
        .parse()
        .with_context(|| format!("invalid region start in '{region}'"))?;
    let end: i64 = end
        .replace(',', "")
        .parse()
        .with_context(|| format!("invalid region end in '{region}'"))?;
    if start < 1 || end < start {
        bail!("region '{region}' has an empty or negative span");
    }
    Ok((name.to_string(), start - 1, end))
}

fn write_record<W: Write>(out: &mut W, record: &ReadRecord) -> Result<()> {
    let (position, strand, mapq) = match record.alignment.as_ref() {
        Some(aln) => match aln.position.as_ref() {
            Some(pos) => (
                format!("{}:{}", pos.reference_name, pos.position + 1),
                if pos.reverse_strand { '-' } else { '+' },
                aln.mapping_quality.to_string(),
            ),
            None => ("*".to_string(), '.', aln.mapping_quality.to_string()),
        },
        None => ("*".to_string(), '.', "*".to_string()),
    };

    write!(
        out,
        "{}\t{}\t{}\t{}\t{}\t{}",
        record.fragment_name,
        position,
        strand,
        mapq,
        record.cigar_string(),
        if record.aligned_sequence.is_empty() { "*" } else { record.aligned_sequence.as_str() },
    )?;
    for (tag, value) in &record.aux {
        write!(out, "\t{tag}:{value}")?;
    }
    writeln!(out)?;
    Ok(())
}
