//! Parsed BAM header metadata.
//!
//! The binary header block carries a SAM-format text header plus a binary
//! contig table. [`parse_header_text`] turns the text into [`HeaderInfo`]:
//! `@HD`, `@RG`, `@PG`, and `@CO` lines are decoded into typed fields, `@SQ`
//! lines are skipped (the binary contig table is authoritative), and unknown
//! lines or tags are logged and ignored.

use log::warn;

use crate::errors::{ReadScanError, Result};

/// Sort order declared by the `@HD` `SO` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortingOrder {
    /// Sorted by reference id and position
    Coordinate,
    /// Sorted by read name
    Queryname,
    /// Explicitly unsorted
    Unsorted,
    /// Absent or unrecognized
    #[default]
    Unknown,
}

/// Alignment grouping declared by the `@HD` `GO` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlignmentGrouping {
    /// No grouping
    #[default]
    None,
    /// Grouped by query name
    Query,
    /// Grouped by reference
    Reference,
}

/// One reference sequence from the binary contig table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigInfo {
    /// Contig name
    pub name: String,
    /// Contig length in bases
    pub n_bases: i64,
    /// Ordinal position in the table
    pub pos_in_fasta: usize,
}

/// One `@RG` read group line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadGroup {
    /// `ID`
    pub name: String,
    /// `CN`
    pub sequencing_center: String,
    /// `DS`
    pub description: String,
    /// `DT`
    pub date: String,
    /// `FO`
    pub flow_order: String,
    /// `KS`
    pub key_sequence: String,
    /// `LB`
    pub library_id: String,
    /// `PG`
    pub program_ids: Vec<String>,
    /// `PI`
    pub predicted_insert_size: Option<i32>,
    /// `PL`
    pub platform: String,
    /// `PM`
    pub platform_model: String,
    /// `PU`
    pub platform_unit: String,
    /// `SM`
    pub sample_id: String,
}

/// One `@PG` program line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInfo {
    /// `ID`
    pub id: String,
    /// `PN`
    pub name: String,
    /// `CL`
    pub command_line: String,
    /// `PP`
    pub prev_program_id: String,
    /// `DS`
    pub description: String,
    /// `VN`
    pub version: String,
}

/// Everything known about a BAM file before its first record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderInfo {
    /// Format version from `@HD` `VN`
    pub version: String,
    /// Sort order from `@HD` `SO`
    pub sorting_order: SortingOrder,
    /// Grouping from `@HD` `GO`
    pub alignment_grouping: AlignmentGrouping,
    /// `@RG` lines in file order
    pub read_groups: Vec<ReadGroup>,
    /// `@PG` lines in file order
    pub programs: Vec<ProgramInfo>,
    /// `@CO` lines in file order
    pub comments: Vec<String>,
    /// Contigs from the binary table, in table order
    pub contigs: Vec<ContigInfo>,
}

impl HeaderInfo {
    /// Finds a contig's ordinal id by name.
    #[must_use]
    pub fn contig_index(&self, name: &str) -> Option<usize> {
        self.contigs.iter().position(|c| c.name == name)
    }
}

/// Parses a SAM-format header text block, attaching `contigs` from the binary
/// contig table.
///
/// # Errors
///
/// Returns [`ReadScanError::InvalidHeader`] when an `@RG` `PI` value is not an
/// integer. All other irregularities are logged and skipped.
pub fn parse_header_text(text: &str, contigs: Vec<ContigInfo>) -> Result<HeaderInfo> {
    let mut info = HeaderInfo { contigs, ..HeaderInfo::default() };

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        match line.get(..3) {
            Some("@HD") => parse_hd_line(line, &mut info),
            Some("@SQ") => {} // binary contig table is authoritative
            Some("@RG") => info.read_groups.push(parse_rg_line(line)?),
            Some("@PG") => info.programs.push(parse_pg_line(line)),
            Some("@CO") => {
                info.comments.push(line.get(4..).unwrap_or_default().to_string());
            }
            _ => warn!("Skipping unrecognized header line: {line}"),
        }
    }

    Ok(info)
}

/// Splits a header token into its 3-character tag (including the colon) and
/// value, e.g. `"VN:1.6"` into `("VN:", "1.6")`.
fn split_tag(token: &str) -> Option<(&str, &str)> {
    if token.len() < 3 {
        return None;
    }
    Some(token.split_at(3))
}

fn parse_hd_line(line: &str, info: &mut HeaderInfo) {
    for token in line.split('\t').skip(1) {
        let Some((tag, value)) = split_tag(token) else {
            warn!("Skipping malformed @HD token '{token}'");
            continue;
        };
        match tag {
            "VN:" => info.version = value.to_string(),
            "SO:" => {
                info.sorting_order = match value {
                    "coordinate" => SortingOrder::Coordinate,
                    "queryname" => SortingOrder::Queryname,
                    "unsorted" => SortingOrder::Unsorted,
                    "unknown" => SortingOrder::Unknown,
                    other => {
                        warn!("Unrecognized @HD SO value '{other}'");
                        SortingOrder::Unknown
                    }
                };
            }
            "GO:" => {
                info.alignment_grouping = match value {
                    "none" => AlignmentGrouping::None,
                    "query" => AlignmentGrouping::Query,
                    "reference" => AlignmentGrouping::Reference,
                    other => {
                        warn!("Unrecognized @HD GO value '{other}'");
                        AlignmentGrouping::None
                    }
                };
            }
            _ => warn!("Skipping unrecognized @HD tag '{tag}'"),
        }
    }
}

fn parse_rg_line(line: &str) -> Result<ReadGroup> {
    let mut rg = ReadGroup::default();
    for token in line.split('\t').skip(1) {
        let Some((tag, value)) = split_tag(token) else {
            warn!("Skipping malformed @RG token '{token}'");
            continue;
        };
        match tag {
            "ID:" => rg.name = value.to_string(),
            "CN:" => rg.sequencing_center = value.to_string(),
            "DS:" => rg.description = value.to_string(),
            "DT:" => rg.date = value.to_string(),
            "FO:" => rg.flow_order = value.to_string(),
            "KS:" => rg.key_sequence = value.to_string(),
            "LB:" => rg.library_id = value.to_string(),
            "PG:" => rg.program_ids.push(value.to_string()),
            "PI:" => {
                let size = value.parse::<i32>().map_err(|_| ReadScanError::InvalidHeader {
                    line: line.to_string(),
                    reason: format!("non-integer PI value '{value}'"),
                })?;
                rg.predicted_insert_size = Some(size);
            }
            "PL:" => rg.platform = value.to_string(),
            "PM:" => rg.platform_model = value.to_string(),
            "PU:" => rg.platform_unit = value.to_string(),
            "SM:" => rg.sample_id = value.to_string(),
            _ => warn!("Skipping unrecognized @RG tag '{tag}'"),
        }
    }
    Ok(rg)
}

fn parse_pg_line(line: &str) -> ProgramInfo {
    let mut pg = ProgramInfo::default();
    for token in line.split('\t').skip(1) {
        let Some((tag, value)) = split_tag(token) else {
            warn!("Skipping malformed @PG token '{token}'");
            continue;
        };
        match tag {
            "ID:" => pg.id = value.to_string(),
            "PN:" => pg.name = value.to_string(),
            "CL:" => pg.command_line = value.to_string(),
            "PP:" => pg.prev_program_id = value.to_string(),
            "DS:" => pg.description = value.to_string(),
            "VN:" => pg.version = value.to_string(),
            _ => warn!("Skipping unrecognized @PG tag '{tag}'"),
        }
    }
    pg
}
