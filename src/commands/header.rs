//! Print parsed header metadata from a BAM file.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use readscan_lib::header::{AlignmentGrouping, SortingOrder};
use readscan_lib::reader::{BamReader, ReaderOptions};

use crate::commands::command::Command;

/// Print parsed header metadata.
///
/// Shows the format version, sort order, contig table, read groups, programs,
/// and comments decoded from the header block.
#[derive(Debug, Parser)]
#[command(name = "header", about = "Print parsed BAM header metadata")]
pub struct ShowHeader {
    /// Input BAM file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Skip the contig table (useful for references with many contigs)
    #[arg(long = "no-contigs", default_value = "false")]
    pub no_contigs: bool,
}

impl Command for ShowHeader {
    fn execute(&self) -> Result<()> {
        let mut reader = BamReader::open(&self.input, ReaderOptions::default())
            .with_context(|| format!("Failed to open input BAM: {}", self.input.display()))?;

        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        {
            let header = reader.header()?;

            writeln!(out, "version\t{}", header.version)?;
            let so = match header.sorting_order {
                SortingOrder::Coordinate => "coordinate",
                SortingOrder::Queryname => "queryname",
                SortingOrder::Unsorted => "unsorted",
                SortingOrder::Unknown => "unknown",
            };
            writeln!(out, "sort_order\t{so}")?;
            let go = match header.alignment_grouping {
                AlignmentGrouping::None => "none",
                AlignmentGrouping::Query => "query",
                AlignmentGrouping::Reference => "reference",
            };
            writeln!(out, "grouping\t{go}")?;
            writeln!(out, "index\t{}", if reader.has_index() { "present" } else { "absent" })?;

            if !self.no_contigs {
                for contig in &header.contigs {
                    writeln!(out, "contig\t{}\t{}", contig.name, contig.n_bases)?;
                }
            }
            for rg in &header.read_groups {
                writeln!(out, "read_group\t{}\t{}\t{}", rg.name, rg.sample_id, rg.library_id)?;
            }
            for pg in &header.programs {
                writeln!(out, "program\t{}\t{}\t{}", pg.id, pg.name, pg.version)?;
            }
            for comment in &header.comments {
                writeln!(out, "comment\t{comment}")?;
            }
        }
        out.flush()?;
        reader.close()?;
        Ok(())
    }
}
