// IPS decoder: record parsing and in-place application.
//
// Follows the stream layout directly: verify the magic, then read records
// until the "EOF" sentinel, applying each one to the target before reading
// the next. Only one record is in memory at a time.
//
// Application is not transactional. If the patch turns out to be truncated
// or unreadable partway through, every record before the failure has
// already been written to the target.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use log::{debug, trace, warn};
use thiserror::Error;

use super::codec::{self, IPS_EOF, IPS_MAGIC};
use super::record::{Payload, Record};

// ---------------------------------------------------------------------------
// Decoder error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream does not start with "PATCH".
    #[error("bad magic: patch does not start with \"PATCH\"")]
    BadMagic,
    /// The stream ended inside a record, or before the "EOF" sentinel.
    #[error("patch truncated while reading {field} at byte {position}")]
    TruncatedStream { field: &'static str, position: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Patch target trait
// ---------------------------------------------------------------------------

/// Random-access storage a patch is applied to.
///
/// Writes past the current end extend the target; any gap between the old
/// end and the write offset reads back as zero.
pub trait PatchTarget {
    /// Write `data` starting at absolute `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Write `value` `count` times starting at absolute `offset`.
    fn fill_at(&mut self, offset: u64, count: usize, value: u8) -> io::Result<()>;

    /// Resize the target to exactly `len` bytes.
    fn set_target_len(&mut self, len: u64) -> io::Result<()>;
}

/// In-memory target.
impl PatchTarget for Vec<u8> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.len() {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(data);
        Ok(())
    }

    fn fill_at(&mut self, offset: u64, count: usize, value: u8) -> io::Result<()> {
        let start = offset as usize;
        let end = start + count;
        if end > self.len() {
            self.resize(end, 0);
        }
        self[start..end].fill(value);
        Ok(())
    }

    fn set_target_len(&mut self, len: u64) -> io::Result<()> {
        self.resize(len as usize, 0);
        Ok(())
    }
}

/// File target. Relies on the OS zero-filling holes left by seeking past
/// the end before writing.
impl PatchTarget for File {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)
    }

    fn fill_at(&mut self, offset: u64, count: usize, value: u8) -> io::Result<()> {
        PatchTarget::write_at(self, offset, &vec![value; count])
    }

    fn set_target_len(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

// ---------------------------------------------------------------------------
// Record reader
// ---------------------------------------------------------------------------

/// Streaming record parser.
///
/// Construction consumes and validates the magic. [`next_record`] then yields
/// records until the sentinel, after which the optional truncate length is
/// available from [`truncate_len`].
///
/// [`next_record`]: RecordReader::next_record
/// [`truncate_len`]: RecordReader::truncate_len
pub struct RecordReader<R: Read> {
    reader: R,
    position: u64,
    finished: bool,
    truncate_len: Option<u32>,
}

impl<R: Read> RecordReader<R> {
    /// Wrap `reader` and check the "PATCH" header.
    pub fn new(mut reader: R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 5];
        let n = read_full(&mut reader, &mut magic)?;
        if n < magic.len() || magic != IPS_MAGIC {
            return Err(DecodeError::BadMagic);
        }
        Ok(Self {
            reader,
            position: magic.len() as u64,
            finished: false,
            truncate_len: None,
        })
    }

    /// Parse the next record, or `None` once the sentinel has been read.
    pub fn next_record(&mut self) -> Result<Option<Record>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let mut addr = [0u8; 3];
        self.read_field(&mut addr, "record address")?;
        if addr == IPS_EOF {
            self.finished = true;
            self.read_truncate_len()?;
            return Ok(None);
        }
        let offset = codec::decode_address(addr);

        let mut len = [0u8; 2];
        self.read_field(&mut len, "record length")?;
        let len = codec::decode_length(len);

        let record = if len == 0 {
            let mut count = [0u8; 2];
            self.read_field(&mut count, "RLE count")?;
            let mut value = [0u8; 1];
            self.read_field(&mut value, "RLE value")?;
            Record::rle(offset, codec::decode_length(count), value[0])
        } else {
            let mut data = vec![0u8; usize::from(len)];
            self.read_field(&mut data, "record payload")?;
            Record::literal(offset, data)
        };
        Ok(Some(record))
    }

    /// Target length requested after the sentinel, if any.
    pub fn truncate_len(&self) -> Option<u32> {
        self.truncate_len
    }

    /// Bytes consumed from the patch so far.
    pub fn bytes_read(&self) -> u64 {
        self.position
    }

    fn read_field(&mut self, buf: &mut [u8], field: &'static str) -> Result<(), DecodeError> {
        let start = self.position;
        let n = read_full(&mut self.reader, buf)?;
        self.position += n as u64;
        if n < buf.len() {
            return Err(DecodeError::TruncatedStream {
                field,
                position: start,
            });
        }
        Ok(())
    }

    // A truncate length counts only when exactly 3 bytes follow the sentinel.
    fn read_truncate_len(&mut self) -> Result<(), DecodeError> {
        let mut trailer = [0u8; 4];
        let n = read_full(&mut self.reader, &mut trailer)?;
        self.position += n as u64;
        let [a, b, c, _] = trailer;
        match n {
            0 => {}
            3 => self.truncate_len = Some(codec::decode_address([a, b, c])),
            _ => warn!("ignoring trailing data after EOF marker"),
        }
        Ok(())
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// `read_exact` that reports how much it got instead of failing on a short
/// read.
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Counters collected while applying a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Records applied, of either kind.
    pub records: u64,
    /// How many of those were RLE records.
    pub rle_records: u64,
    /// Target bytes written.
    pub bytes_written: u64,
    /// Length the target was truncated to, if the patch asked for it.
    pub truncated_to: Option<u32>,
}

/// Apply one record to `target`.
pub fn apply_record<T: PatchTarget + ?Sized>(target: &mut T, record: &Record) -> io::Result<()> {
    let offset = u64::from(record.offset);
    match &record.payload {
        Payload::Literal(data) => target.write_at(offset, data),
        Payload::Rle { count, value } => {
            if *count == 0 {
                warn!("RLE record at {offset:#08X} has a zero repeat count");
            }
            target.fill_at(offset, usize::from(*count), *value)
        }
    }
}

/// Apply every record of `patch` to `target`, in stream order.
///
/// The magic is checked before anything is written. Later records overwrite
/// earlier ones where they overlap.
pub fn apply_patch<R: Read, T: PatchTarget + ?Sized>(
    patch: R,
    target: &mut T,
) -> Result<ApplyStats, DecodeError> {
    let mut reader = RecordReader::new(patch)?;
    let mut stats = ApplyStats::default();

    while let Some(record) = reader.next_record()? {
        match &record.payload {
            Payload::Literal(data) => {
                debug!(
                    "record {}: offset {:#08X}, length {}",
                    stats.records,
                    record.offset,
                    data.len()
                );
                trace!("  bytes: {data:02X?}");
            }
            Payload::Rle { count, value } => {
                debug!(
                    "record {}: offset {:#08X}, RLE {count} x {value:#04X}",
                    stats.records, record.offset
                );
                stats.rle_records += 1;
            }
        }
        apply_record(target, &record)?;
        stats.records += 1;
        stats.bytes_written += record.target_len() as u64;
    }

    if let Some(len) = reader.truncate_len() {
        debug!("truncating target to {len} bytes");
        target.set_target_len(u64::from(len))?;
        stats.truncated_to = Some(len);
    }

    debug!(
        "applied {} records ({} RLE), {} patch bytes read",
        stats.records,
        stats.rle_records,
        reader.bytes_read()
    );
    Ok(stats)
}

/// Apply an in-memory patch to a copy of `original`.
pub fn apply_all(original: &[u8], patch: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut target = original.to_vec();
    apply_patch(patch, &mut target)?;
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
