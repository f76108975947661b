#![deny(unsafe_code)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # readscan - normalized BAM record access
//!
//! This library decodes BAM alignment records into a normalized
//! [`ReadRecord`](record::ReadRecord) structure, supporting both full-file
//! scans and BAI-indexed region queries, with per-record filtering and seeded
//! downsampling.
//!
//! ## Modules
//!
//! - **[`reader`]** - [`BamReader`](reader::BamReader): open, scan, query, close
//! - **[`record`]** - normalized output types
//! - **[`convert`]** - raw record bytes to [`ReadRecord`](record::ReadRecord)
//! - **[`aux`]** - aux-field byte decoding
//! - **[`header`]** - parsed header metadata
//! - **[`requirements`]** - read-acceptance predicates
//! - **[`sampling`]** - seeded Bernoulli downsampling
//!
//! ## Quick Start
//!
//! ```no_run
//! use readscan_lib::reader::{BamReader, ReaderOptions};
//!
//! # fn main() -> readscan_lib::Result<()> {
//! let mut reader = BamReader::open("input.bam", ReaderOptions::default())?;
//! for record in reader.records()? {
//!     let record = record?;
//!     println!("{}\t{}", record.fragment_name, record.cigar_string());
//! }
//! reader.close()?;
//! # Ok(())
//! # }
//! ```

pub mod aux;
pub mod convert;
pub mod errors;
pub mod header;
pub mod progress;
pub mod raw_record;
pub mod reader;
pub mod record;
pub mod requirements;
pub mod sampling;

pub use errors::{ReadScanError, Result};
