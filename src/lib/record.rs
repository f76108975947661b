//! Normalized output types for decoded alignment records.
//!
//! [`ReadRecord`] is the structured form handed to downstream analysis: flags
//! are unpacked into booleans, the packed sequence is expanded to characters,
//! the CIGAR is a vector of typed units, and positions carry reference names
//! instead of numeric ids.

use crate::aux::{AuxTag, AuxValue};

/// One CIGAR operation kind, in BAM op-code order (`MIDNSHP=X`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    /// `M`: alignment match (can be a sequence match or mismatch)
    AlignmentMatch,
    /// `I`: insertion to the reference
    Insert,
    /// `D`: deletion from the reference
    Delete,
    /// `N`: skipped region from the reference
    Skip,
    /// `S`: soft clipping
    ClipSoft,
    /// `H`: hard clipping
    ClipHard,
    /// `P`: padding
    Pad,
    /// `=`: sequence match
    SequenceMatch,
    /// `X`: sequence mismatch
    SequenceMismatch,
}

impl CigarOp {
    /// Translates a BAM numeric op code (low 4 bits of a CIGAR word) into the
    /// enumerated kind. Returns `None` for codes outside 0..=8.
    #[must_use]
    pub fn from_bam_op(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::AlignmentMatch),
            1 => Some(Self::Insert),
            2 => Some(Self::Delete),
            3 => Some(Self::Skip),
            4 => Some(Self::ClipSoft),
            5 => Some(Self::ClipHard),
            6 => Some(Self::Pad),
            7 => Some(Self::SequenceMatch),
            8 => Some(Self::SequenceMismatch),
            _ => None,
        }
    }

    /// The SAM text character for this op.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::AlignmentMatch => 'M',
            Self::Insert => 'I',
            Self::Delete => 'D',
            Self::Skip => 'N',
            Self::ClipSoft => 'S',
            Self::ClipHard => 'H',
            Self::Pad => 'P',
            Self::SequenceMatch => '=',
            Self::SequenceMismatch => 'X',
        }
    }

    /// Whether this op consumes reference bases.
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::AlignmentMatch
                | Self::Delete
                | Self::Skip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

/// One CIGAR unit: an operation kind and its run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarUnit {
    /// Operation kind
    pub op: CigarOp,
    /// Run length
    pub len: u32,
}

/// A mapped position: reference name, 0-based offset, and strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPosition {
    /// Reference sequence (contig) name
    pub reference_name: String,
    /// 0-based leftmost offset
    pub position: i64,
    /// True when mapped to the reverse strand
    pub reverse_strand: bool,
}

/// The mapped-alignment portion of a record. Present only when the record's
/// "unmapped" flag is clear.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearAlignment {
    /// Mapping quality
    pub mapping_quality: u8,
    /// CIGAR units in order
    pub cigar: Vec<CigarUnit>,
    /// Mapped position; absent when the reference id is negative
    pub position: Option<ReadPosition>,
}

/// One decoded alignment record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRecord {
    /// Fragment (read) name
    pub fragment_name: String,
    /// Observed template length
    pub fragment_length: i32,
    /// Both reads of the pair mapped in the expected orientation
    pub proper_placement: bool,
    /// Marked as a PCR or optical duplicate
    pub duplicate_fragment: bool,
    /// Failed platform or vendor quality checks
    pub failed_vendor_quality_checks: bool,
    /// Secondary alignment
    pub secondary_alignment: bool,
    /// Supplementary alignment
    pub supplementary_alignment: bool,
    /// 0 for the first read of a fragment, 1 for the second
    pub read_number: u32,
    /// Number of reads in the fragment (1 or 2)
    pub number_reads: u32,
    /// Read bases, expanded from the packed 4-bit encoding
    pub aligned_sequence: String,
    /// Per-base qualities; `None` when the source marks them missing
    pub aligned_quality: Option<Vec<u8>>,
    /// Mapped-alignment fields; `None` when the record is unmapped
    pub alignment: Option<LinearAlignment>,
    /// Mate position; `None` unless paired with a mapped mate
    pub next_mate_position: Option<ReadPosition>,
    /// Decoded aux fields in encounter order
    pub aux: Vec<(AuxTag, AuxValue)>,
}

impl ReadRecord {
    /// Whether the record carries a mapped alignment with a concrete position.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.alignment.as_ref().is_some_and(|a| a.position.is_some())
    }

    /// Looks up an aux value by tag.
    #[must_use]
    pub fn aux_value(&self, tag: AuxTag) -> Option<&AuxValue> {
        self.aux.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Renders the CIGAR in SAM text form, or `*` when unmapped.
    #[must_use]
    pub fn cigar_string(&self) -> String {
        match &self.alignment {
            Some(aln) if !aln.cigar.is_empty() => {
                let mut s = String::new();
                for unit in &aln.cigar {
                    s.push_str(&unit.len.to_string());
                    s.push(unit.op.as_char());
                }
                s
            }
            _ => "*".to_string(),
        }
    }
}
