//! Error types for readscan.
//!
//! All library errors are variants of [`ReadScanError`]. The taxonomy follows
//! the failure modes of the reader: configuration errors surface at open time,
//! not-found errors fail the specific call, and malformed-input errors fail
//! conversion of a single record.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while opening, iterating, or querying alignment files.
#[derive(Error, Debug)]
pub enum ReadScanError {
    /// An unsupported option combination was requested. Raised at open time,
    /// before any record is read.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration was rejected
        reason: String,
    },

    /// The input file (or its index) could not be opened.
    #[error("Failed to open '{}': {source}", path.display())]
    OpenFile {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The input is not a BAM file or its header block is structurally invalid.
    #[error("Invalid BAM format: {reason}")]
    InvalidFormat {
        /// What was wrong with the file
        reason: String,
    },

    /// A textual header line carried a value that cannot be ignored.
    #[error("Invalid header line '{line}': {reason}")]
    InvalidHeader {
        /// The offending header line
        line: String,
        /// Why it was rejected
        reason: String,
    },

    /// A region query named a reference sequence absent from the header.
    #[error("Reference sequence '{name}' not found in header")]
    ReferenceNotFound {
        /// The unknown reference name
        name: String,
    },

    /// A region query used an empty, negative, or out-of-range interval.
    #[error("Invalid query interval [{start}, {end}) on '{name}'")]
    InvalidInterval {
        /// Reference sequence name
        name: String,
        /// 0-based inclusive start
        start: i64,
        /// 0-based exclusive end
        end: i64,
    },

    /// A region query was attempted but no `.bai` index was loaded.
    #[error("No index loaded; region queries require a companion .bai index")]
    MissingIndex,

    /// An aux field could not be decoded from the record's trailing bytes.
    #[error("Malformed aux field '{tag}': {reason}")]
    MalformedAuxField {
        /// Two-character tag of the offending field
        tag: String,
        /// Why decoding failed
        reason: String,
    },

    /// A record's binary layout is inconsistent with its declared lengths,
    /// or its flags contradict its data.
    #[error("Malformed record: {reason}")]
    MalformedRecord {
        /// Why conversion failed
        reason: String,
    },

    /// An operation was attempted on a reader after `close()`.
    #[error("Reader is closed")]
    ReaderClosed,

    /// An I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for readscan operations.
pub type Result<T> = std::result::Result<T, ReadScanError>;
