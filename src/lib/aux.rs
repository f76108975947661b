//! Decoder for BAM aux fields (the tagged optional-field byte stream).
//!
//! Each aux field is laid out as `[2 tag bytes][1 type byte][payload]`, with
//! little-endian encoding for multi-byte numerics:
//!
//! | Type | Payload |
//! |------|---------|
//! | `A` | 1 character |
//! | `c`/`C` | 1-byte signed/unsigned integer |
//! | `s`/`S` | 2-byte signed/unsigned integer |
//! | `i`/`I` | 4-byte signed/unsigned integer |
//! | `f` | 4-byte float |
//! | `Z` | NUL-terminated string |
//! | `H` | NUL-terminated hex string (discarded) |
//! | `B` | subtype byte + 4-byte count + packed elements (skipped) |
//!
//! Decoding walks the buffer with a cursor, advancing by a type-dependent
//! amount, and checks bounds before every read. All integer widths widen to
//! `i32`; `B` arrays are recognized structurally so their bytes can be skipped,
//! but their elements are not materialized.

use std::fmt;

use crate::errors::{ReadScanError, Result};

/// A two-character aux field tag, e.g. `RX` or `NM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuxTag(pub [u8; 2]);

impl AuxTag {
    /// Creates a tag from its two bytes.
    #[must_use]
    pub const fn new(b0: u8, b1: u8) -> Self {
        Self([b0, b1])
    }
}

impl fmt::Display for AuxTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

impl From<[u8; 2]> for AuxTag {
    fn from(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }
}

/// A decoded aux field value.
#[derive(Debug, Clone, PartialEq)]
pub enum AuxValue {
    /// Single printable character (`A`)
    Char(char),
    /// Integer of any width, widened to 32 bits (`c`, `C`, `s`, `S`, `i`, `I`)
    Int(i32),
    /// 32-bit float (`f`)
    Float(f32),
    /// Printable string (`Z`)
    String(String),
}

impl fmt::Display for AuxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Char(c) => write!(f, "{c}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Returns the element width in bytes for a `B` array subtype, or `None` if
/// the subtype is not a recognized numeric code.
fn array_element_size(subtype: u8) -> Option<usize> {
    match subtype {
        b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

fn truncated(tag: AuxTag, needed: usize, remaining: usize) -> ReadScanError {
    ReadScanError::MalformedAuxField {
        tag: tag.to_string(),
        reason: format!("needs {needed} bytes, {remaining} remain"),
    }
}

/// Decodes every aux field in `data`, returning the pairs in encounter order.
///
/// # Errors
///
/// Fails with [`ReadScanError::MalformedAuxField`] on a truncated field, a
/// missing `Z`/`H` terminator, or an unrecognized type or array subtype. The
/// decoder never reads past the end of `data`.
pub fn decode_aux_fields(data: &[u8]) -> Result<Vec<(AuxTag, AuxValue)>> {
    let mut fields = Vec::new();
    decode_aux_fields_into(data, &mut fields)?;
    Ok(fields)
}

/// Decodes aux fields into `fields`, appending each pair as it is decoded.
///
/// On failure, `fields` keeps every pair decoded before the malformed one.
/// This is what record conversion uses so that a bad trailing field does not
/// discard the fields in front of it.
///
/// # Errors
///
/// Same failure modes as [`decode_aux_fields`].
pub fn decode_aux_fields_into(data: &[u8], fields: &mut Vec<(AuxTag, AuxValue)>) -> Result<()> {
    let mut p = 0;

    // A field needs at least 2 tag bytes, a type byte, and 1 payload byte.
    while data.len() - p >= 4 {
        let tag = AuxTag([data[p], data[p + 1]]);
        let val_type = data[p + 2];
        p += 3;

        match val_type {
            b'A' => {
                fields.push((tag, AuxValue::Char(data[p] as char)));
                p += 1;
            }
            b'c' => {
                fields.push((tag, AuxValue::Int(i32::from(data[p].cast_signed()))));
                p += 1;
            }
            b'C' => {
                fields.push((tag, AuxValue::Int(i32::from(data[p]))));
                p += 1;
            }
            b's' => {
                if p + 2 > data.len() {
                    return Err(truncated(tag, 2, data.len() - p));
                }
                let v = i16::from_le_bytes([data[p], data[p + 1]]);
                fields.push((tag, AuxValue::Int(i32::from(v))));
                p += 2;
            }
            b'S' => {
                if p + 2 > data.len() {
                    return Err(truncated(tag, 2, data.len() - p));
                }
                let v = u16::from_le_bytes([data[p], data[p + 1]]);
                fields.push((tag, AuxValue::Int(i32::from(v))));
                p += 2;
            }
            b'i' | b'I' => {
                if p + 4 > data.len() {
                    return Err(truncated(tag, 4, data.len() - p));
                }
                let v = i32::from_le_bytes([data[p], data[p + 1], data[p + 2], data[p + 3]]);
                fields.push((tag, AuxValue::Int(v)));
                p += 4;
            }
            b'f' => {
                if p + 4 > data.len() {
                    return Err(truncated(tag, 4, data.len() - p));
                }
                let v = f32::from_le_bytes([data[p], data[p + 1], data[p + 2], data[p + 3]]);
                fields.push((tag, AuxValue::Float(v)));
                p += 4;
            }
            b'Z' | b'H' => {
                let start = p;
                while p < data.len() && data[p] != 0 {
                    p += 1;
                }
                if p == data.len() {
                    return Err(ReadScanError::MalformedAuxField {
                        tag: tag.to_string(),
                        reason: "string value is missing its NUL terminator".to_string(),
                    });
                }
                // H (hex byte array) is scanned for length but never surfaced.
                if val_type == b'Z' {
                    let s = String::from_utf8_lossy(&data[start..p]).into_owned();
                    fields.push((tag, AuxValue::String(s)));
                }
                p += 1;
            }
            b'B' => {
                let subtype = data[p];
                p += 1;
                let Some(elem_size) = array_element_size(subtype) else {
                    return Err(ReadScanError::MalformedAuxField {
                        tag: tag.to_string(),
                        reason: format!("unknown array subtype '{}'", subtype as char),
                    });
                };
                if p + 4 > data.len() {
                    return Err(truncated(tag, 4, data.len() - p));
                }
                let count =
                    u32::from_le_bytes([data[p], data[p + 1], data[p + 2], data[p + 3]]) as usize;
                p += 4;
                if count == 0 {
                    return Err(ReadScanError::MalformedAuxField {
                        tag: tag.to_string(),
                        reason: "array element count is zero".to_string(),
                    });
                }
                let skip = count.checked_mul(elem_size).ok_or_else(|| {
                    ReadScanError::MalformedAuxField {
                        tag: tag.to_string(),
                        reason: format!("array length {count} overflows"),
                    }
                })?;
                if p + skip > data.len() {
                    return Err(truncated(tag, skip, data.len() - p));
                }
                p += skip;
            }
            other => {
                return Err(ReadScanError::MalformedAuxField {
                    tag: tag.to_string(),
                    reason: format!("unknown aux type '{}'", other as char),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_decode_int32_tag() {
        let data = [b'X', b'1', b'i', 0x05, 0x00, 0x00, 0x00];
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"X1"), AuxValue::Int(5))]);
    }

    #[test]
    fn test_decode_z_string() {
        let data = [b'Z', b'1', b'Z', b'h', b'i', 0x00];
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"Z1"), AuxValue::String("hi".to_string()))]);
    }

    #[test]
    fn test_z_string_missing_terminator_fails() {
        let data = [b'Z', b'1', b'Z', b'h', b'i'];
        let err = decode_aux_fields(&data).unwrap_err();
        assert!(matches!(err, ReadScanError::MalformedAuxField { ref tag, .. } if tag == "Z1"));
    }

    #[rstest]
    #[case(b'c', &[0xfb][..], -5)]
    #[case(b'C', &[0xfb][..], 251)]
    #[case(b's', &[0xfe, 0xff][..], -2)]
    #[case(b'S', &[0xfe, 0xff][..], 65534)]
    #[case(b'i', &[0xd6, 0xff, 0xff, 0xff][..], -42)]
    fn test_integer_widths_widen_to_i32(
        #[case] val_type: u8,
        #[case] payload: &[u8],
        #[case] expected: i32,
    ) {
        let mut data = vec![b'N', b'M', val_type];
        data.extend_from_slice(payload);
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"NM"), AuxValue::Int(expected))]);
    }

    #[test]
    fn test_decode_char() {
        let data = [b'X', b'A', b'A', b'T'];
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"XA"), AuxValue::Char('T'))]);
    }

    #[test]
    fn test_decode_float() {
        let data = {
            let mut d = vec![b'A', b'S', b'f'];
            d.extend_from_slice(&1.5f32.to_le_bytes());
            d
        };
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"AS"), AuxValue::Float(1.5))]);
    }

    #[test]
    fn test_hex_value_discarded_but_skipped() {
        let mut data = vec![b'X', b'H', b'H', b'1', b'A', b'F', b'F', 0x00];
        data.extend_from_slice(&[b'X', b'1', b'i', 0x07, 0x00, 0x00, 0x00]);
        let fields = decode_aux_fields(&data).unwrap();
        // The H field contributes nothing; the following field still decodes.
        assert_eq!(fields, vec![(AuxTag(*b"X1"), AuxValue::Int(7))]);
    }

    #[test]
    fn test_b_array_skipped_structurally() {
        // B:s array with 3 elements, then a trailing int tag.
        let mut data = vec![b'B', b'A', b'B', b's', 0x03, 0x00, 0x00, 0x00];
        data.extend_from_slice(&[1, 0, 2, 0, 3, 0]);
        data.extend_from_slice(&[b'X', b'1', b'c', 0x09]);
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"X1"), AuxValue::Int(9))]);
    }

    #[test]
    fn test_b_array_zero_elements_fails() {
        let data = [b'B', b'0', b'B', b'i', 0x00, 0x00, 0x00, 0x00];
        let err = decode_aux_fields(&data).unwrap_err();
        assert!(err.to_string().contains("array element count is zero"));
    }

    #[test]
    fn test_b_array_unknown_subtype_fails() {
        let data = [b'B', b'X', b'B', b'q', 0x01, 0x00, 0x00, 0x00];
        let err = decode_aux_fields(&data).unwrap_err();
        assert!(err.to_string().contains("unknown array subtype 'q'"));
    }

    #[test]
    fn test_b_array_truncated_count_fails() {
        // Subtype present but only 2 of the 4 count bytes.
        let data = [b'B', b'X', b'B', b'i', 0x01, 0x00];
        assert!(decode_aux_fields(&data).is_err());
    }

    #[test]
    fn test_b_array_truncated_elements_fails() {
        // Claims 4 int32 elements but carries only 2 bytes.
        let data = [b'B', b'X', b'B', b'i', 0x04, 0x00, 0x00, 0x00, 0x01, 0x02];
        assert!(decode_aux_fields(&data).is_err());
    }

    #[rstest]
    #[case(&[b'X', b'1', b's', 0x05][..])]
    #[case(&[b'X', b'1', b'i', 0x05, 0x00][..])]
    #[case(&[b'X', b'1', b'f', 0x00, 0x00, 0x00][..])]
    fn test_truncated_numeric_payload_fails(#[case] data: &[u8]) {
        let err = decode_aux_fields(data).unwrap_err();
        assert!(matches!(err, ReadScanError::MalformedAuxField { ref tag, .. } if tag == "X1"));
    }

    #[test]
    fn test_unknown_type_names_tag() {
        let data = [b'Y', b'Y', b'?', 0x00];
        let err = decode_aux_fields(&data).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("YY"));
        assert!(msg.contains("unknown aux type '?'"));
    }

    #[test]
    fn test_trailing_short_bytes_terminate_cleanly() {
        // Fewer than 4 bytes remain after the first field: the loop stops.
        let data = [b'X', b'1', b'c', 0x01, b'Y', b'Y'];
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(fields, vec![(AuxTag(*b"X1"), AuxValue::Int(1))]);
    }

    #[test]
    fn test_multiple_fields_in_order() {
        let mut data = Vec::new();
        data.extend_from_slice(&[b'R', b'X', b'Z', b'A', b'C', b'G', b'T', 0x00]);
        data.extend_from_slice(&[b'N', b'M', b'C', 0x02]);
        data.extend_from_slice(&[b'X', b'A', b'A', b'+']);
        let fields = decode_aux_fields(&data).unwrap();
        assert_eq!(
            fields,
            vec![
                (AuxTag(*b"RX"), AuxValue::String("ACGT".to_string())),
                (AuxTag(*b"NM"), AuxValue::Int(2)),
                (AuxTag(*b"XA"), AuxValue::Char('+')),
            ]
        );
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let mut data = Vec::new();
        data.extend_from_slice(&[b'R', b'X', b'Z', b'A', b'C', 0x00]);
        data.extend_from_slice(&[b'N', b'M', b'i', 0x10, 0x00, 0x00, 0x00]);
        let first = decode_aux_fields(&data).unwrap();
        let second = decode_aux_fields(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_fields_kept_on_failure() {
        let mut data = Vec::new();
        data.extend_from_slice(&[b'N', b'M', b'C', 0x02]);
        data.extend_from_slice(&[b'X', b'1', b'i', 0x05, 0x00]); // truncated
        let mut fields = Vec::new();
        let result = decode_aux_fields_into(&data, &mut fields);
        assert!(result.is_err());
        assert_eq!(fields, vec![(AuxTag(*b"NM"), AuxValue::Int(2))]);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(decode_aux_fields(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_aux_tag_display() {
        assert_eq!(AuxTag::new(b'R', b'X').to_string(), "RX");
    }
}
