//! Raw BAM record bytes and fixed-offset field access.
//!
//! A BAM record is stored on disk as a 4-byte little-endian `block_size`
//! prefix followed by `block_size` bytes:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-3     4     refID (i32)
//! 4-7     4     pos (i32) - 0-based leftmost position
//! 8       1     l_read_name (u8) - length including NUL
//! 9       1     mapq (u8)
//! 10-11   2     bin (u16)
//! 12-13   2     n_cigar_op (u16)
//! 14-15   2     flag (u16)
//! 16-19   4     l_seq (u32)
//! 20-23   4     next_refID (i32)
//! 24-27   4     next_pos (i32)
//! 28-31   4     tlen (i32)
//! 32+     var   read_name, CIGAR, sequence, quality, aux data
//! ```
//!
//! The accessors here index at fixed offsets and assume at least the 32-byte
//! fixed header is present; the reader verifies that before handing bytes to
//! them, and the converter validates the variable-length section.

use std::io::{self, Read};

/// BAM flag bits.
pub mod flags {
    /// Template has multiple segments
    pub const PAIRED: u16 = 0x1;
    /// Each segment properly aligned according to the aligner
    pub const PROPER_PAIR: u16 = 0x2;
    /// Segment unmapped
    pub const UNMAPPED: u16 = 0x4;
    /// Next segment in the template unmapped
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Sequence is reverse complemented
    pub const REVERSE: u16 = 0x10;
    /// Sequence of the next segment is reverse complemented
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in the template
    pub const FIRST_SEGMENT: u16 = 0x40;
    /// Last segment in the template
    pub const LAST_SEGMENT: u16 = 0x80;
    /// Secondary alignment
    pub const SECONDARY: u16 = 0x100;
    /// Did not pass quality controls
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Reference sequence id, or a negative value when unplaced.
#[must_use]
pub fn ref_id(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// 0-based leftmost position, or a negative value when unplaced.
#[must_use]
pub fn position(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[4], data[5], data[6], data[7]])
}

/// Read name length including the NUL terminator.
#[must_use]
pub fn l_read_name(data: &[u8]) -> usize {
    data[8] as usize
}

/// Mapping quality.
#[must_use]
pub fn mapping_quality(data: &[u8]) -> u8 {
    data[9]
}

/// Number of CIGAR operations.
#[must_use]
pub fn n_cigar_op(data: &[u8]) -> usize {
    u16::from_le_bytes([data[12], data[13]]) as usize
}

/// Bitwise flags.
#[must_use]
pub fn flag(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[14], data[15]])
}

/// Declared sequence length.
#[must_use]
pub fn l_seq(data: &[u8]) -> usize {
    u32::from_le_bytes([data[16], data[17], data[18], data[19]]) as usize
}

/// Mate reference sequence id.
#[must_use]
pub fn mate_ref_id(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[20], data[21], data[22], data[23]])
}

/// Mate 0-based leftmost position.
#[must_use]
pub fn mate_position(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[24], data[25], data[26], data[27]])
}

/// Observed template length.
#[must_use]
pub fn template_length(data: &[u8]) -> i32 {
    i32::from_le_bytes([data[28], data[29], data[30], data[31]])
}

/// Number of reference bases the record's CIGAR spans.
///
/// Reads CIGAR words byte-by-byte to avoid alignment requirements. Returns 0
/// when the CIGAR region extends past the record end.
#[must_use]
pub fn reference_span(data: &[u8]) -> i64 {
    let n_ops = n_cigar_op(data);
    if n_ops == 0 {
        return 0;
    }

    let cigar_start = 32 + l_read_name(data);
    let cigar_end = cigar_start + n_ops * 4;
    if cigar_end > data.len() {
        return 0;
    }

    let mut span = 0i64;
    for i in 0..n_ops {
        let offset = cigar_start + i * 4;
        let word = u32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        // M (0), D (2), N (3), = (7), X (8) consume reference bases.
        if matches!(word & 0xF, 0 | 2 | 3 | 7 | 8) {
            span += i64::from(word >> 4);
        }
    }
    span
}

/// A raw BAM record stored as bytes.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct RawRecord(Vec<u8>);

impl RawRecord {
    /// Creates a new empty raw record.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the length of the record in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for RawRecord {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawRecord {
    #[inline]
    fn from(buf: Vec<u8>) -> Self {
        Self(buf)
    }
}

/// Reads one raw BAM record: the 4-byte `block_size` prefix, then that many
/// bytes into `record`. Returns the record size, or 0 at end of stream.
///
/// # Errors
///
/// Returns an error if the reader fails, end of stream is reached in the
/// middle of a record, or the stream carries a zero block size. Zero is
/// never a valid record length, so it signals corruption rather than end
/// of stream.
pub fn read_raw_record<R>(reader: &mut R, record: &mut RawRecord) -> io::Result<usize>
where
    R: Read,
{
    let block_size = match read_block_size(reader)? {
        None => return Ok(0),
        Some(0) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "record block size is zero",
            ));
        }
        Some(n) => n,
    };

    record.0.resize(block_size, 0);
    reader.read_exact(&mut record.0)?;

    Ok(block_size)
}

/// Reads the 4-byte block size prefix. Returns `None` at a clean end of
/// stream, before any prefix byte has been consumed.
fn read_block_size<R>(reader: &mut R) -> io::Result<Option<usize>>
where
    R: Read,
{
    let mut buf = [0u8; 4];

    // Read the first byte separately to distinguish EOF from truncation.
    match reader.read(&mut buf[..1]) {
        Ok(0) => return Ok(None),
        Ok(1) => {}
        Ok(_) => unreachable!(),
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
            return read_block_size(reader);
        }
        Err(e) => return Err(e),
    }

    reader.read_exact(&mut buf[1..])?;

    let n = u32::from_le_bytes(buf);
    usize::try_from(n)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
