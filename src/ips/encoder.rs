// IPS encoder: byte-for-byte diff and record emission.
//
// The diff is a single left-to-right scan over the modified buffer with two
// states, idle and recording. Each maximal run of differing bytes is closed
// before anything is written, so every record goes out as address, true
// length and payload together.
//
// Runs are cut into records of at most 65535 bytes. No record may start at
// 0x454F46, since that address encodes to the "EOF" sentinel: a run starting
// there is moved back one byte (carrying the unchanged byte before it), and a
// split point landing there is moved back one byte as well.

use std::io::{self, Write};

use log::{debug, trace};
use thiserror::Error;

use super::codec::{
    self, IPS_EOF, IPS_MAGIC, MAX_ADDRESS, MAX_RECORD_LEN, fits_address, is_reserved_address,
};
use super::record::{Payload, Record};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    /// A record would start beyond the 24-bit address space.
    #[error("record offset {offset:#X} exceeds the 24-bit IPS address space")]
    AddressOverflow { offset: u64 },
    /// A record would start at the address that reads back as "EOF".
    #[error("record offset {offset:#X} collides with the EOF marker")]
    ReservedAddress { offset: u32 },
    /// Literal records carry 1..=65535 bytes.
    #[error("literal record length {len} out of range")]
    InvalidRecordLength { len: usize },
    /// The truncated target length does not fit in 24 bits.
    #[error("target length {len} is too large for the IPS truncate extension")]
    TruncateLenOverflow { len: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Run scanner
// ---------------------------------------------------------------------------

/// A maximal run of differing bytes: `modified[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    Idle,
    Recording { start: usize },
}

/// Iterator over the differing runs between two buffers.
///
/// Bytes of `modified` past the end of `original` always differ.
pub struct Runs<'a> {
    original: &'a [u8],
    modified: &'a [u8],
    pos: usize,
}

impl<'a> Runs<'a> {
    fn new(original: &'a [u8], modified: &'a [u8]) -> Self {
        Self {
            original,
            modified,
            pos: 0,
        }
    }

    #[inline]
    fn differs(&self, a: usize) -> bool {
        self.original.get(a) != Some(&self.modified[a])
    }
}

impl Iterator for Runs<'_> {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        let mut state = ScanState::Idle;
        while self.pos < self.modified.len() {
            let a = self.pos;
            self.pos += 1;
            match (state, self.differs(a)) {
                (ScanState::Idle, true) => state = ScanState::Recording { start: a },
                (ScanState::Recording { start }, false) => return Some(Run { start, end: a }),
                _ => {}
            }
        }
        match state {
            ScanState::Recording { start } => Some(Run {
                start,
                end: self.modified.len(),
            }),
            ScanState::Idle => None,
        }
    }
}

/// Scan `original` and `modified` for runs of differing bytes.
pub fn diff<'a>(original: &'a [u8], modified: &'a [u8]) -> Runs<'a> {
    Runs::new(original, modified)
}

/// Cut a run into record spans: at most [`MAX_RECORD_LEN`] bytes each, none
/// starting at the reserved address.
///
/// `run` must come from [`diff`] over a buffer at least `run.end` long; a run
/// starting at the reserved address always has an unchanged byte before it.
pub fn record_spans(run: Run) -> impl Iterator<Item = Run> {
    let mut start = run.start;
    if is_reserved_address_usize(start) {
        start -= 1;
    }
    let end = run.end;
    std::iter::from_fn(move || {
        if start >= end {
            return None;
        }
        let mut len = (end - start).min(MAX_RECORD_LEN);
        if start + len < end && is_reserved_address_usize(start + len) {
            len -= 1;
        }
        let span = Run {
            start,
            end: start + len,
        };
        start += len;
        Some(span)
    })
}

fn is_reserved_address_usize(offset: usize) -> bool {
    u32::try_from(offset).is_ok_and(is_reserved_address)
}

/// Compute the full record list turning `original` into `modified`.
///
/// Truncation is not a record; see [`truncate_len`].
pub fn records(original: &[u8], modified: &[u8]) -> Result<Vec<Record>, EncodeError> {
    let mut out = Vec::new();
    for run in diff(original, modified) {
        for span in record_spans(run) {
            let offset = checked_offset(span.start)?;
            out.push(Record::literal(
                offset,
                modified[span.start..span.end].to_vec(),
            ));
        }
    }
    Ok(out)
}

/// Length to truncate the target to, when `modified` is shorter.
pub fn truncate_len(original: &[u8], modified: &[u8]) -> Result<Option<u32>, EncodeError> {
    if modified.len() >= original.len() {
        return Ok(None);
    }
    u32::try_from(modified.len())
        .ok()
        .filter(|&len| len <= MAX_ADDRESS)
        .map(Some)
        .ok_or(EncodeError::TruncateLenOverflow {
            len: modified.len() as u64,
        })
}

fn checked_offset(offset: usize) -> Result<u32, EncodeError> {
    u32::try_from(offset)
        .ok()
        .filter(|&o| fits_address(u64::from(o)))
        .ok_or(EncodeError::AddressOverflow {
            offset: offset as u64,
        })
}

// ---------------------------------------------------------------------------
// Stream writer
// ---------------------------------------------------------------------------

/// Counters collected while writing a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Records written.
    pub records: u64,
    /// Literal payload bytes written.
    pub payload_bytes: u64,
    /// Total patch size, framing included.
    pub patch_size: u64,
    /// Truncate length appended after the sentinel, if any.
    pub truncated_to: Option<u32>,
}

/// Writes a patch stream: magic on construction, records, then the sentinel
/// on [`finish`](PatchEncoder::finish).
pub struct PatchEncoder<W: Write> {
    writer: W,
    stats: EncodeStats,
}

impl<W: Write> PatchEncoder<W> {
    /// Start a patch, writing the "PATCH" header.
    pub fn new(mut writer: W) -> Result<Self, EncodeError> {
        writer.write_all(&IPS_MAGIC)?;
        Ok(Self {
            writer,
            stats: EncodeStats {
                patch_size: IPS_MAGIC.len() as u64,
                ..Default::default()
            },
        })
    }

    /// Write a literal record without copying `data`.
    pub fn write_literal(&mut self, offset: u32, data: &[u8]) -> Result<(), EncodeError> {
        check_address(offset)?;
        let len = u16::try_from(data.len())
            .ok()
            .filter(|&n| n > 0)
            .ok_or(EncodeError::InvalidRecordLength { len: data.len() })?;

        debug!("record {}: offset {offset:#08X}, length {len}", self.stats.records);
        trace!("  bytes: {data:02X?}");

        self.writer.write_all(&codec::encode_address(offset))?;
        self.writer.write_all(&codec::encode_length(len))?;
        self.writer.write_all(data)?;

        self.stats.records += 1;
        self.stats.payload_bytes += data.len() as u64;
        self.stats.patch_size += 5 + data.len() as u64;
        Ok(())
    }

    /// Write any record, RLE included.
    pub fn write_record(&mut self, record: &Record) -> Result<(), EncodeError> {
        match &record.payload {
            Payload::Literal(data) => self.write_literal(record.offset, data),
            Payload::Rle { count, value } => {
                check_address(record.offset)?;
                if *count == 0 {
                    return Err(EncodeError::InvalidRecordLength { len: 0 });
                }
                debug!(
                    "record {}: offset {:#08X}, RLE {count} x {value:#04X}",
                    self.stats.records, record.offset
                );
                record.encode(&mut self.writer)?;
                self.stats.records += 1;
                self.stats.patch_size += record.encoded_len() as u64;
                Ok(())
            }
        }
    }

    /// Records written so far.
    pub fn records_written(&self) -> u64 {
        self.stats.records
    }

    /// Write the sentinel and, if given, the truncate length. Returns the
    /// flushed writer and the final stats.
    pub fn finish(mut self, truncate: Option<u32>) -> Result<(W, EncodeStats), EncodeError> {
        if let Some(len) = truncate.filter(|&len| !fits_address(u64::from(len))) {
            return Err(EncodeError::TruncateLenOverflow {
                len: u64::from(len),
            });
        }
        self.writer.write_all(&IPS_EOF)?;
        self.stats.patch_size += IPS_EOF.len() as u64;
        if let Some(len) = truncate {
            debug!("truncate target to {len} bytes");
            self.writer.write_all(&codec::encode_address(len))?;
            self.stats.patch_size += 3;
            self.stats.truncated_to = Some(len);
        }
        self.writer.flush()?;
        Ok((self.writer, self.stats))
    }
}

fn check_address(offset: u32) -> Result<(), EncodeError> {
    if !fits_address(u64::from(offset)) {
        return Err(EncodeError::AddressOverflow {
            offset: u64::from(offset),
        });
    }
    if is_reserved_address(offset) {
        return Err(EncodeError::ReservedAddress { offset });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Encode the patch turning `original` into `modified`, writing it to
/// `writer`.
///
/// Runs are streamed straight from the scan; no record list is built.
pub fn encode_all<W: Write>(
    writer: W,
    original: &[u8],
    modified: &[u8],
) -> Result<EncodeStats, EncodeError> {
    let truncate = truncate_len(original, modified)?;
    let mut encoder = PatchEncoder::new(writer)?;
    for run in diff(original, modified) {
        for span in record_spans(run) {
            let offset = checked_offset(span.start)?;
            encoder.write_literal(offset, &modified[span.start..span.end])?;
        }
    }
    let (_, stats) = encoder.finish(truncate)?;
    debug!(
        "encoded {} records, {} payload bytes, patch {} bytes",
        stats.records, stats.payload_bytes, stats.patch_size
    );
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
