//! BAM file reader with full-scan and indexed region-query cursors.
//!
//! [`BamReader::open`] validates options, reads the binary header block, and
//! loads a companion `.bai` index when one sits next to the file.
//! [`BamReader::records`] scans every record; [`BamReader::query`] visits the
//! index chunks overlapping a region. Both return a [`Records`] iterator that
//! decodes, filters, and downsamples records. The iterator borrows the reader
//! mutably, so at most one cursor can be active at a time.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use noodles::bam::bai;
use noodles::bgzf;
use noodles::bgzf::VirtualPosition;
use noodles::core::region::Interval;
use noodles::core::Position;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::csi::BinningIndex;

use crate::convert::{convert_record, AuxFieldHandling, LogRateLimiter};
use crate::errors::{ReadScanError, Result};
use crate::header::{parse_header_text, ContigInfo, HeaderInfo};
use crate::progress::ProgressTracker;
use crate::raw_record::{self, read_raw_record, RawRecord};
use crate::record::ReadRecord;
use crate::requirements::{MinBaseQualityMode, ReadRequirements};
use crate::sampling::Downsampler;

const BAM_MAGIC: [u8; 4] = *b"BAM\x01";

/// Options controlling how a [`BamReader`] decodes and filters records.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Whether aux fields are decoded or skipped
    pub aux_field_handling: AuxFieldHandling,
    /// Keep fraction for Bernoulli downsampling; 0.0 disables sampling
    pub downsample_fraction: f64,
    /// Seed for the downsampling generator
    pub random_seed: u64,
    /// Per-record filter; `None` keeps everything
    pub read_requirements: Option<ReadRequirements>,
    /// Buffer size hint for the compressed stream
    pub block_size: Option<usize>,
    /// Reference FASTA path, accepted for interface parity; unused for BAM
    pub reference_path: Option<PathBuf>,
}

/// Resources live only between `open` and `close`.
struct OpenState {
    stream: bgzf::io::Reader<BufReader<File>>,
    header: HeaderInfo,
    index: Option<bai::Index>,
    first_record: VirtualPosition,
}

/// A reader over one BAM file.
pub struct BamReader {
    path: PathBuf,
    options: ReaderOptions,
    state: Option<OpenState>,
    downsampler: Downsampler,
    limiter: LogRateLimiter,
}

impl BamReader {
    /// Opens `path`, reads its header block, and loads `<path>.bai` if it
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::InvalidConfiguration`] for unsupported
    /// options, [`ReadScanError::OpenFile`] when the file cannot be opened,
    /// and [`ReadScanError::InvalidFormat`] when the header block is not a
    /// BAM header.
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(reqs) = &options.read_requirements {
            if reqs.min_base_quality_mode == MinBaseQualityMode::EnforcedByReader {
                return Err(ReadScanError::InvalidConfiguration {
                    reason: "reader-enforced minimum base quality is not supported".to_string(),
                });
            }
        }
        let downsampler = Downsampler::new(options.downsample_fraction, options.random_seed)?;

        let file = File::open(&path)
            .map_err(|source| ReadScanError::OpenFile { path: path.clone(), source })?;
        let buf_reader = match options.block_size {
            Some(capacity) => BufReader::with_capacity(capacity, file),
            None => BufReader::new(file),
        };
        let mut stream = bgzf::io::Reader::new(buf_reader);

        let header = read_header_block(&mut stream)?;
        let first_record = stream.virtual_position();
        let index = load_index(&path)?;

        info!(
            "Opened '{}': {} contigs, {} read groups, index {}",
            path.display(),
            header.contigs.len(),
            header.read_groups.len(),
            if index.is_some() { "loaded" } else { "absent" }
        );

        Ok(Self {
            path,
            options,
            state: Some(OpenState { stream, header, index, first_record }),
            downsampler,
            limiter: LogRateLimiter::default(),
        })
    }

    /// The path this reader was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed header metadata.
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::ReaderClosed`] after `close`.
    pub fn header(&self) -> Result<&HeaderInfo> {
        self.state.as_ref().map(|s| &s.header).ok_or(ReadScanError::ReaderClosed)
    }

    /// Whether a `.bai` index was loaded at open time.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.index.is_some())
    }

    /// Starts a full scan from the first record.
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::ReaderClosed`] after `close`.
    pub fn records(&mut self) -> Result<Records<'_>> {
        {
            let state = self.state.as_mut().ok_or(ReadScanError::ReaderClosed)?;
            let first = state.first_record;
            state.stream.seek(first)?;
        }
        Ok(Records::new(self, Cursor::FullScan))
    }

    /// Starts a scan over records overlapping `[start, end)` (0-based,
    /// half-open) on `reference_name`. `end` is clamped to the contig length.
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::ReaderClosed`] after `close`,
    /// [`ReadScanError::MissingIndex`] when no index was loaded,
    /// [`ReadScanError::ReferenceNotFound`] for an unknown contig, and
    /// [`ReadScanError::InvalidInterval`] for an empty or out-of-range
    /// interval.
    pub fn query(&mut self, reference_name: &str, start: i64, end: i64) -> Result<Records<'_>> {
        let (chunks, ref_id, end) = {
            let state = self.state.as_ref().ok_or(ReadScanError::ReaderClosed)?;
            let index = state.index.as_ref().ok_or(ReadScanError::MissingIndex)?;

            let ref_id = state
                .header
                .contig_index(reference_name)
                .ok_or_else(|| ReadScanError::ReferenceNotFound {
                    name: reference_name.to_string(),
                })?;
            let contig_len = state.header.contigs[ref_id].n_bases;

            if start < 0 || end <= start || start >= contig_len {
                return Err(invalid_interval(reference_name, start, end));
            }
            let end = end.min(contig_len);

            let interval_start = to_position(start + 1)
                .ok_or_else(|| invalid_interval(reference_name, start, end))?;
            let interval_end =
                to_position(end).ok_or_else(|| invalid_interval(reference_name, start, end))?;

            let chunks = index.query(ref_id, Interval::from(interval_start..=interval_end))?;
            debug!(
                "Query {reference_name}:[{start}, {end}) maps to {} index chunks",
                chunks.len()
            );
            (chunks, ref_id, end)
        };

        let cursor = Cursor::Region {
            chunks,
            next_chunk: 0,
            in_chunk: false,
            ref_id: ref_id as i32,
            start,
            end,
        };
        Ok(Records::new(self, cursor))
    }

    /// Releases the index, header, and stream, in that order. Subsequent
    /// operations fail with [`ReadScanError::ReaderClosed`].
    ///
    /// # Errors
    ///
    /// Returns [`ReadScanError::ReaderClosed`] when already closed.
    pub fn close(&mut self) -> Result<()> {
        let state = self.state.take().ok_or(ReadScanError::ReaderClosed)?;
        let OpenState { stream, header, index, .. } = state;
        drop(index);
        drop(header);
        drop(stream);
        debug!("Closed '{}'", self.path.display());
        Ok(())
    }
}

fn invalid_interval(name: &str, start: i64, end: i64) -> ReadScanError {
    ReadScanError::InvalidInterval { name: name.to_string(), start, end }
}

fn to_position(coord_1based: i64) -> Option<Position> {
    usize::try_from(coord_1based).ok().and_then(|v| Position::try_from(v).ok())
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Reads the magic, text header, and binary contig table.
fn read_header_block<R: Read>(stream: &mut R) -> Result<HeaderInfo> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic)?;
    if magic != BAM_MAGIC {
        return Err(ReadScanError::InvalidFormat {
            reason: format!("bad magic {magic:02x?}, expected \"BAM\\x01\""),
        });
    }

    let l_text = read_i32(stream)?;
    let l_text = usize::try_from(l_text).map_err(|_| ReadScanError::InvalidFormat {
        reason: format!("negative header text length {l_text}"),
    })?;
    let mut text_bytes = vec![0u8; l_text];
    stream.read_exact(&mut text_bytes)?;
    let text = String::from_utf8_lossy(&text_bytes);
    let text = text.trim_end_matches('\0');

    let n_ref = read_i32(stream)?;
    let n_ref = usize::try_from(n_ref).map_err(|_| ReadScanError::InvalidFormat {
        reason: format!("negative reference count {n_ref}"),
    })?;

    let mut contigs = Vec::with_capacity(n_ref);
    for i in 0..n_ref {
        let l_name = read_i32(stream)?;
        let l_name = usize::try_from(l_name).map_err(|_| ReadScanError::InvalidFormat {
            reason: format!("negative name length for reference {i}"),
        })?;
        if l_name == 0 {
            return Err(ReadScanError::InvalidFormat {
                reason: format!("empty name for reference {i}"),
            });
        }
        let mut name_bytes = vec![0u8; l_name];
        stream.read_exact(&mut name_bytes)?;
        name_bytes.pop(); // NUL terminator
        let l_ref = read_i32(stream)?;
        contigs.push(ContigInfo {
            name: String::from_utf8_lossy(&name_bytes).into_owned(),
            n_bases: i64::from(l_ref),
            pos_in_fasta: i,
        });
    }

    parse_header_text(text, contigs)
}

/// Loads `<path>.bai` if present. A missing index is not an error; a present
/// but unreadable one is.
fn load_index(path: &Path) -> Result<Option<bai::Index>> {
    let mut bai_path = path.as_os_str().to_os_string();
    bai_path.push(".bai");
    let bai_path = PathBuf::from(bai_path);

    if !bai_path.exists() {
        return Ok(None);
    }
    let index = bai::fs::read(&bai_path)
        .map_err(|source| ReadScanError::OpenFile { path: bai_path, source })?;
    Ok(Some(index))
}

enum Cursor {
    /// Every record from the first.
    FullScan,
    /// Records overlapping `[start, end)` on `ref_id`, visited through the
    /// index chunks in order.
    Region {
        chunks: Vec<Chunk>,
        next_chunk: usize,
        in_chunk: bool,
        ref_id: i32,
        start: i64,
        end: i64,
    },
}

/// Iterator over decoded, filtered records. Fuses after the first error.
pub struct Records<'r> {
    reader: &'r mut BamReader,
    cursor: Cursor,
    buf: RawRecord,
    progress: ProgressTracker,
    done: bool,
}

impl<'r> Records<'r> {
    fn new(reader: &'r mut BamReader, cursor: Cursor) -> Self {
        Self {
            reader,
            cursor,
            buf: RawRecord::new(),
            progress: ProgressTracker::new("Scanned records"),
            done: false,
        }
    }

    /// Advances to the next raw record the cursor accepts. Returns `false` at
    /// the end of the scan or region.
    fn read_next_raw(&mut self) -> Result<bool> {
        let state = self.reader.state.as_mut().ok_or(ReadScanError::ReaderClosed)?;

        match &mut self.cursor {
            Cursor::FullScan => Ok(read_raw_record(&mut state.stream, &mut self.buf)? > 0),
            Cursor::Region { chunks, next_chunk, in_chunk, ref_id, start, end } => loop {
                if !*in_chunk {
                    let Some(chunk) = chunks.get(*next_chunk) else {
                        return Ok(false);
                    };
                    state.stream.seek(chunk.start())?;
                    *in_chunk = true;
                }
                if state.stream.virtual_position() >= chunks[*next_chunk].end() {
                    *in_chunk = false;
                    *next_chunk += 1;
                    continue;
                }

                if read_raw_record(&mut state.stream, &mut self.buf)? == 0 {
                    return Ok(false);
                }
                let data = self.buf.as_ref();
                if data.len() < 32 {
                    return Err(ReadScanError::MalformedRecord {
                        reason: format!(
                            "record is {} bytes, shorter than the 32-byte fixed header",
                            data.len()
                        ),
                    });
                }

                let tid = raw_record::ref_id(data);
                if tid != *ref_id {
                    // Coordinate-sorted input: a later (or unplaced) contig
                    // means no further overlaps are possible.
                    if tid > *ref_id || tid < 0 {
                        return Ok(false);
                    }
                    continue;
                }
                let pos = i64::from(raw_record::position(data));
                if pos >= *end {
                    return Ok(false);
                }
                // Zero-span records (e.g. all-insert CIGARs) still occupy one
                // base for overlap purposes.
                if pos + raw_record::reference_span(data).max(1) <= *start {
                    continue;
                }
                return Ok(true);
            },
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<ReadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            match self.read_next_raw() {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(false) => {
                    self.done = true;
                    self.progress.log_final();
                    return None;
                }
                Ok(true) => {}
            }
            self.progress.record_one();

            let BamReader { state, options, downsampler, limiter, .. } = &mut *self.reader;
            let Some(state) = state.as_ref() else {
                self.done = true;
                return Some(Err(ReadScanError::ReaderClosed));
            };

            match convert_record(
                self.buf.as_ref(),
                &state.header.contigs,
                options.aux_field_handling,
                limiter,
            ) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(record) => {
                    let keep = options
                        .read_requirements
                        .as_ref()
                        .is_none_or(|reqs| reqs.accepts(&record))
                        && downsampler.keep();
                    if keep {
                        return Some(Ok(record));
                    }
                }
            }
        }
    }
}
