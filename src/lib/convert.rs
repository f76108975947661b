//! Conversion of raw BAM record bytes into [`ReadRecord`].
//!
//! [`convert_record`] validates the record layout against its declared
//! lengths, unpacks flags, expands the 4-bit packed sequence, decodes the
//! CIGAR, resolves reference ids against the contig table, and optionally
//! decodes aux fields. Aux decoding failures do not fail the record: the
//! fields decoded so far are kept and a rate-limited warning is logged.

use log::warn;

use crate::aux::decode_aux_fields_into;
use crate::errors::{ReadScanError, Result};
use crate::header::ContigInfo;
use crate::raw_record::{self, flags};
use crate::record::{CigarOp, CigarUnit, LinearAlignment, ReadPosition, ReadRecord};

/// 4-bit code to base character, per the BAM sequence encoding.
const SEQ_NT16: [char; 16] = [
    '=', 'A', 'C', 'M', 'G', 'R', 'S', 'V', 'T', 'W', 'Y', 'H', 'K', 'D', 'B', 'N',
];

/// Sentinel first quality byte marking qualities as absent.
const MISSING_QUAL: u8 = 0xff;

/// How aux fields are handled during conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuxFieldHandling {
    /// Do not decode aux bytes at all
    #[default]
    SkipAll,
    /// Decode every aux field into the record
    ParseAll,
}

/// Suppresses repeated warnings after a budget of emissions.
///
/// Each reader owns one of these so that a file full of malformed aux data
/// produces one warning rather than millions, while independent readers still
/// warn independently.
#[derive(Debug, Clone)]
pub struct LogRateLimiter {
    budget: u32,
    emitted: u32,
    suppressed: u64,
}

impl LogRateLimiter {
    /// Creates a limiter that logs at most `budget` messages.
    #[must_use]
    pub fn new(budget: u32) -> Self {
        Self { budget, emitted: 0, suppressed: 0 }
    }

    /// Logs `message` if the budget allows, otherwise counts it as
    /// suppressed.
    pub fn warn(&mut self, message: &str) {
        if self.emitted < self.budget {
            self.emitted += 1;
            warn!("{message}");
        } else {
            self.suppressed += 1;
        }
    }

    /// Number of messages actually logged.
    #[must_use]
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Number of messages dropped after the budget was spent.
    #[must_use]
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

impl Default for LogRateLimiter {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Converts one raw BAM record into a [`ReadRecord`].
///
/// `contigs` is the binary contig table from the file header, used to resolve
/// reference ids to names and bound-check them.
///
/// # Errors
///
/// Returns [`ReadScanError::MalformedRecord`] when the record's declared
/// lengths are inconsistent with its size, a CIGAR op code is invalid, a
/// reference id is out of range, or the record claims a mapped mate with a
/// negative mate reference id.
pub fn convert_record(
    data: &[u8],
    contigs: &[ContigInfo],
    aux_handling: AuxFieldHandling,
    limiter: &mut LogRateLimiter,
) -> Result<ReadRecord> {
    if data.len() < 32 {
        return Err(malformed(format!(
            "record is {} bytes, shorter than the 32-byte fixed header",
            data.len()
        )));
    }

    let name_len = raw_record::l_read_name(data);
    if name_len == 0 {
        return Err(malformed("read name length is zero".to_string()));
    }
    let n_cigar = raw_record::n_cigar_op(data);
    let seq_len = raw_record::l_seq(data);

    let name_end = 32 + name_len;
    let cigar_end = name_end + n_cigar * 4;
    let seq_end = cigar_end + seq_len.div_ceil(2);
    let qual_end = seq_end + seq_len;
    if qual_end > data.len() {
        return Err(malformed(format!(
            "declared lengths need {} bytes but record has {}",
            qual_end,
            data.len()
        )));
    }

    let flag_bits = raw_record::flag(data);
    let paired = flag_bits & flags::PAIRED != 0;

    let mut record = ReadRecord {
        fragment_name: String::from_utf8_lossy(&data[32..name_end - 1]).into_owned(),
        fragment_length: raw_record::template_length(data),
        proper_placement: flag_bits & flags::PROPER_PAIR != 0,
        duplicate_fragment: flag_bits & flags::DUPLICATE != 0,
        failed_vendor_quality_checks: flag_bits & flags::QC_FAIL != 0,
        secondary_alignment: flag_bits & flags::SECONDARY != 0,
        supplementary_alignment: flag_bits & flags::SUPPLEMENTARY != 0,
        read_number: if flag_bits & flags::FIRST_SEGMENT != 0 || !paired { 0 } else { 1 },
        number_reads: if paired { 2 } else { 1 },
        ..ReadRecord::default()
    };

    record.aligned_sequence = unpack_sequence(&data[cigar_end..seq_end], seq_len);

    if seq_len > 0 && data[seq_end] != MISSING_QUAL {
        record.aligned_quality = Some(data[seq_end..qual_end].to_vec());
    }

    if flag_bits & flags::UNMAPPED == 0 {
        record.alignment = Some(LinearAlignment {
            mapping_quality: raw_record::mapping_quality(data),
            cigar: decode_cigar(&data[name_end..cigar_end], n_cigar)?,
            position: resolve_position(
                raw_record::ref_id(data),
                i64::from(raw_record::position(data)),
                flag_bits & flags::REVERSE != 0,
                contigs,
            )?,
        });
    }

    if paired && flag_bits & flags::MATE_UNMAPPED == 0 {
        let mate_ref_id = raw_record::mate_ref_id(data);
        if mate_ref_id < 0 {
            return Err(malformed(
                "record claims a mapped mate but mate reference id is negative".to_string(),
            ));
        }
        record.next_mate_position = resolve_position(
            mate_ref_id,
            i64::from(raw_record::mate_position(data)),
            flag_bits & flags::MATE_REVERSE != 0,
            contigs,
        )?;
    }

    if aux_handling == AuxFieldHandling::ParseAll {
        if let Err(e) = decode_aux_fields_into(&data[qual_end..], &mut record.aux) {
            limiter.warn(&format!(
                "Failed to parse aux fields for read '{}': {e}",
                record.fragment_name
            ));
        }
    }

    Ok(record)
}

fn malformed(reason: String) -> ReadScanError {
    ReadScanError::MalformedRecord { reason }
}

fn unpack_sequence(packed: &[u8], seq_len: usize) -> String {
    let mut seq = String::with_capacity(seq_len);
    for i in 0..seq_len {
        let byte = packed[i / 2];
        let code = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        seq.push(SEQ_NT16[code as usize]);
    }
    seq
}

fn decode_cigar(cigar_bytes: &[u8], n_ops: usize) -> Result<Vec<CigarUnit>> {
    let mut cigar = Vec::with_capacity(n_ops);
    for i in 0..n_ops {
        let offset = i * 4;
        let word = u32::from_le_bytes([
            cigar_bytes[offset],
            cigar_bytes[offset + 1],
            cigar_bytes[offset + 2],
            cigar_bytes[offset + 3],
        ]);
        let op = CigarOp::from_bam_op(word & 0xF)
            .ok_or_else(|| malformed(format!("invalid CIGAR op code {}", word & 0xF)))?;
        cigar.push(CigarUnit { op, len: word >> 4 });
    }
    Ok(cigar)
}

/// Resolves a reference id to a named position. A negative id yields `None`;
/// an id past the contig table is an error.
fn resolve_position(
    ref_id: i32,
    position: i64,
    reverse_strand: bool,
    contigs: &[ContigInfo],
) -> Result<Option<ReadPosition>> {
    if ref_id < 0 {
        return Ok(None);
    }
    let contig = contigs.get(ref_id as usize).ok_or_else(|| {
        malformed(format!(
            "reference id {ref_id} is outside the contig table ({} entries)",
            contigs.len()
        ))
    })?;
    Ok(Some(ReadPosition {
        reference_name: contig.name.clone(),
        position,
        reverse_strand,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aux::{AuxTag, AuxValue};

    fn contigs() -> Vec<ContigInfo> {
        vec![
            ContigInfo { name: "chr1".to_string(), n_bases: 10_000, pos_in_fasta: 0 },
            ContigInfo { name: "chr2".to_string(), n_bases: 5_000, pos_in_fasta: 1 },
        ]
    }

    /// Builds raw BAM record bytes (without the block_size prefix).
    #[allow(clippy::too_many_arguments)]
    fn make_record(
        tid: i32,
        pos: i32,
        flag_bits: u16,
        name: &str,
        cigar_words: &[u32],
        seq: &str,
        quals: Option<&[u8]>,
        mate_tid: i32,
        mate_pos: i32,
        aux: &[u8],
    ) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&tid.to_le_bytes());
        data.extend_from_slice(&pos.to_le_bytes());
        data.push(u8::try_from(name.len() + 1).unwrap());
        data.push(40); // mapq
        data.extend_from_slice(&0u16.to_le_bytes()); // bin
        data.extend_from_slice(&u16::try_from(cigar_words.len()).unwrap().to_le_bytes());
        data.extend_from_slice(&flag_bits.to_le_bytes());
        data.extend_from_slice(&u32::try_from(seq.len()).unwrap().to_le_bytes());
        data.extend_from_slice(&mate_tid.to_le_bytes());
        data.extend_from_slice(&mate_pos.to_le_bytes());
        data.extend_from_slice(&(-42i32).to_le_bytes()); // tlen
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        for word in cigar_words {
            data.extend_from_slice(&word.to_le_bytes());
        }
        let codes: Vec<u8> = seq
            .chars()
            .map(|c| {
                u8::try_from(SEQ_NT16.iter().position(|&b| b == c).unwrap()).unwrap()
            })
            .collect();
        for pair in codes.chunks(2) {
            let hi = pair[0] << 4;
            let lo = if pair.len() == 2 { pair[1] } else { 0 };
            data.push(hi | lo);
        }
        match quals {
            Some(q) => data.extend_from_slice(q),
            None => {
                if !seq.is_empty() {
                    let mut q = vec![0u8; seq.len()];
                    q[0] = MISSING_QUAL;
                    data.extend_from_slice(&q);
                }
            }
        }
        data.extend_from_slice(aux);
        data
    }

    #[test]
    fn test_mapped_paired_record() {
        let data = make_record(
            0,
            100,
            flags::PAIRED | flags::PROPER_PAIR | flags::FIRST_SEGMENT | flags::MATE_REVERSE,
            "frag1",
            &[(4 << 4), (4 << 4) | 4], // 4M4S
            "ACGTACGT",
            Some(&[30; 8]),
            1,
            500,
            &[],
        );
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();

        assert_eq!(record.fragment_name, "frag1");
        assert_eq!(record.fragment_length, -42);
        assert!(record.proper_placement);
        assert_eq!(record.read_number, 0);
        assert_eq!(record.number_reads, 2);
        assert_eq!(record.aligned_sequence, "ACGTACGT");
        assert_eq!(record.aligned_quality, Some(vec![30; 8]));

        let aln = record.alignment.as_ref().unwrap();
        assert_eq!(aln.mapping_quality, 40);
        assert_eq!(record.cigar_string(), "4M4S");
        let pos = aln.position.as_ref().unwrap();
        assert_eq!(pos.reference_name, "chr1");
        assert_eq!(pos.position, 100);
        assert!(!pos.reverse_strand);

        let mate = record.next_mate_position.as_ref().unwrap();
        assert_eq!(mate.reference_name, "chr2");
        assert_eq!(mate.position, 500);
        assert!(mate.reverse_strand);
    }

    #[test]
    fn test_unpaired_record_numbers() {
        let data = make_record(0, 10, 0, "solo", &[(4 << 4)], "ACGT", None, -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert_eq!(record.read_number, 0);
        assert_eq!(record.number_reads, 1);
        assert!(record.next_mate_position.is_none());
    }

    #[test]
    fn test_second_read_of_pair() {
        let data = make_record(
            0,
            10,
            flags::PAIRED | flags::LAST_SEGMENT | flags::MATE_UNMAPPED,
            "r2",
            &[(4 << 4)],
            "ACGT",
            None,
            -1,
            -1,
            &[],
        );
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert_eq!(record.read_number, 1);
        assert_eq!(record.number_reads, 2);
        assert!(record.next_mate_position.is_none());
    }

    #[test]
    fn test_missing_quality_sentinel() {
        let data = make_record(0, 10, 0, "noq", &[(4 << 4)], "ACGT", None, -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert_eq!(record.aligned_quality, None);
        assert_eq!(record.aligned_sequence, "ACGT");
    }

    #[test]
    fn test_unmapped_record_has_no_alignment() {
        let data =
            make_record(-1, -1, flags::UNMAPPED, "unm", &[], "ACGT", Some(&[20; 4]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert!(record.alignment.is_none());
        assert!(!record.is_mapped());
        assert_eq!(record.aligned_quality, Some(vec![20; 4]));
    }

    #[test]
    fn test_mapped_flag_with_negative_ref_id() {
        // "Mapped" by flags but refID -1: alignment present, position absent.
        let data = make_record(-1, -1, 0, "odd", &[], "AC", Some(&[20; 2]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        let aln = record.alignment.as_ref().unwrap();
        assert!(aln.position.is_none());
        assert!(!record.is_mapped());
    }

    #[test]
    fn test_reverse_strand() {
        let data =
            make_record(1, 99, flags::REVERSE, "rev", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        let pos = record.alignment.unwrap().position.unwrap();
        assert_eq!(pos.reference_name, "chr2");
        assert!(pos.reverse_strand);
    }

    #[test]
    fn test_flag_booleans() {
        let bits = flags::DUPLICATE | flags::QC_FAIL | flags::SECONDARY | flags::SUPPLEMENTARY;
        let data = make_record(0, 10, bits, "flags", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert!(record.duplicate_fragment);
        assert!(record.failed_vendor_quality_checks);
        assert!(record.secondary_alignment);
        assert!(record.supplementary_alignment);
        assert!(!record.proper_placement);
    }

    #[test]
    fn test_truncated_record_fails() {
        let mut limiter = LogRateLimiter::default();
        let err = convert_record(&[0u8; 16], &contigs(), AuxFieldHandling::SkipAll, &mut limiter)
            .unwrap_err();
        assert!(matches!(err, ReadScanError::MalformedRecord { .. }));
    }

    #[test]
    fn test_declared_lengths_exceeding_data_fail() {
        let mut data = make_record(0, 10, 0, "bad", &[(4 << 4)], "ACGT", None, -1, -1, &[]);
        // Claim a 100-base sequence that isn't there.
        data[16..20].copy_from_slice(&100u32.to_le_bytes());
        let mut limiter = LogRateLimiter::default();
        let err = convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter)
            .unwrap_err();
        assert!(err.to_string().contains("declared lengths"));
    }

    #[test]
    fn test_invalid_cigar_op_fails() {
        let data =
            make_record(0, 10, 0, "bad", &[(4 << 4) | 0xE], "ACGT", Some(&[20; 4]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let err = convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter)
            .unwrap_err();
        assert!(err.to_string().contains("CIGAR op code 14"));
    }

    #[test]
    fn test_ref_id_past_contig_table_fails() {
        let data = make_record(7, 10, 0, "oob", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let err = convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter)
            .unwrap_err();
        assert!(err.to_string().contains("reference id 7"));
    }

    #[test]
    fn test_mapped_mate_with_negative_mate_ref_fails() {
        let data = make_record(
            0,
            10,
            flags::PAIRED,
            "badmate",
            &[(2 << 4)],
            "AC",
            Some(&[20; 2]),
            -1,
            100,
            &[],
        );
        let mut limiter = LogRateLimiter::default();
        let err = convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter)
            .unwrap_err();
        assert!(err.to_string().contains("mate reference id is negative"));
    }

    #[test]
    fn test_aux_parse_all() {
        let aux = [b'X', b'1', b'i', 0x05, 0x00, 0x00, 0x00];
        let data = make_record(0, 10, 0, "aux", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &aux);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::ParseAll, &mut limiter).unwrap();
        assert_eq!(record.aux_value(AuxTag::new(b'X', b'1')), Some(&AuxValue::Int(5)));
        assert_eq!(limiter.emitted(), 0);
    }

    #[test]
    fn test_aux_skip_all_leaves_aux_empty() {
        let aux = [b'X', b'1', b'i', 0x05, 0x00, 0x00, 0x00];
        let data = make_record(0, 10, 0, "aux", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &aux);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert!(record.aux.is_empty());
    }

    #[test]
    fn test_bad_aux_keeps_partial_and_warns_once() {
        // One valid field, then a field with an unknown type code.
        let aux = [b'X', b'1', b'i', 0x05, 0x00, 0x00, 0x00, b'Y', b'2', b'?', 0x00];
        let data = make_record(0, 10, 0, "aux", &[(2 << 4)], "AC", Some(&[20; 2]), -1, -1, &aux);
        let mut limiter = LogRateLimiter::default();

        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::ParseAll, &mut limiter).unwrap();
        assert_eq!(record.aux.len(), 1);
        assert_eq!(record.aux_value(AuxTag::new(b'X', b'1')), Some(&AuxValue::Int(5)));
        assert_eq!(limiter.emitted(), 1);

        // A second failing record only bumps the suppressed count.
        let _ = convert_record(&data, &contigs(), AuxFieldHandling::ParseAll, &mut limiter)
            .unwrap();
        assert_eq!(limiter.emitted(), 1);
        assert_eq!(limiter.suppressed(), 1);
    }

    #[test]
    fn test_empty_sequence() {
        let data = make_record(0, 10, 0, "noseq", &[], "", None, -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert_eq!(record.aligned_sequence, "");
        assert_eq!(record.aligned_quality, None);
    }

    #[test]
    fn test_odd_length_sequence() {
        let data = make_record(0, 10, 0, "odd", &[(5 << 4)], "ACGTN", Some(&[20; 5]), -1, -1, &[]);
        let mut limiter = LogRateLimiter::default();
        let record =
            convert_record(&data, &contigs(), AuxFieldHandling::SkipAll, &mut limiter).unwrap();
        assert_eq!(record.aligned_sequence, "ACGTN");
    }
}
