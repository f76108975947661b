//! Read-acceptance predicates.
//!
//! [`ReadRequirements`] describes which records a scan should keep. The
//! default keeps nothing extra: duplicates, QC failures, improperly placed
//! pairs, secondary and supplementary alignments, and unaligned reads are all
//! dropped unless explicitly kept.

use crate::record::ReadRecord;

/// Who is responsible for enforcing a minimum base quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MinBaseQualityMode {
    /// No base-quality requirement
    #[default]
    Unspecified,
    /// The caller filters bases itself; the reader passes everything through
    EnforcedByClient,
    /// The reader would mask or drop low-quality bases (not supported)
    EnforcedByReader,
}

/// Filtering criteria applied to each decoded record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadRequirements {
    /// Keep records flagged as PCR or optical duplicates
    pub keep_duplicates: bool,
    /// Keep records that failed vendor quality checks
    pub keep_failed_vendor_quality_checks: bool,
    /// Keep records whose pair is not properly placed
    pub keep_improperly_placed: bool,
    /// Keep secondary alignments
    pub keep_secondary_alignments: bool,
    /// Keep supplementary alignments
    pub keep_supplementary_alignments: bool,
    /// Keep unaligned records
    pub keep_unaligned: bool,
    /// Minimum mapping quality; 0 disables the check
    pub min_mapping_quality: u8,
    /// Minimum base quality, interpreted per `min_base_quality_mode`
    pub min_base_quality: u8,
    /// How `min_base_quality` is enforced
    pub min_base_quality_mode: MinBaseQualityMode,
}

impl ReadRequirements {
    /// Whether `read` satisfies every requirement.
    #[must_use]
    pub fn accepts(&self, read: &ReadRecord) -> bool {
        (self.keep_duplicates || !read.duplicate_fragment)
            && (self.keep_failed_vendor_quality_checks || !read.failed_vendor_quality_checks)
            && (self.keep_improperly_placed || read.proper_placement)
            && (self.keep_secondary_alignments || !read.secondary_alignment)
            && (self.keep_supplementary_alignments || !read.supplementary_alignment)
            && (self.keep_unaligned || read.is_mapped())
            && (self.min_mapping_quality == 0
                || read
                    .alignment
                    .as_ref()
                    .is_some_and(|a| a.mapping_quality >= self.min_mapping_quality))
    }
}
