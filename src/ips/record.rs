// IPS record: one (offset, payload) patch unit.
//
// On disk a record is `address(3) length(2) data(length)`, or for the RLE
// form `address(3) 00 00 count(2) value(1)`.

use std::io::{self, Write};

use super::codec;

/// Payload of a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Literal bytes, 1..=65535 of them.
    Literal(Vec<u8>),
    /// `value` repeated `count` times.
    Rle { count: u16, value: u8 },
}

/// A single patch record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Absolute offset in the target (24 bits).
    pub offset: u32,
    pub payload: Payload,
}

impl Record {
    pub fn literal(offset: u32, data: Vec<u8>) -> Self {
        Self {
            offset,
            payload: Payload::Literal(data),
        }
    }

    pub fn rle(offset: u32, count: u16, value: u8) -> Self {
        Self {
            offset,
            payload: Payload::Rle { count, value },
        }
    }

    /// Number of target bytes this record writes.
    pub fn target_len(&self) -> usize {
        match &self.payload {
            Payload::Literal(data) => data.len(),
            Payload::Rle { count, .. } => usize::from(*count),
        }
    }

    /// Offset one past the last byte written.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + self.target_len() as u64
    }

    pub fn is_rle(&self) -> bool {
        matches!(self.payload, Payload::Rle { .. })
    }

    /// Size of the record on disk.
    pub fn encoded_len(&self) -> usize {
        match &self.payload {
            Payload::Literal(data) => 5 + data.len(),
            Payload::Rle { .. } => 8,
        }
    }

    /// Serialize the record.
    ///
    /// Literal payloads must be 1..=65535 bytes long: an empty literal would
    /// be read back as RLE. The encoder upholds this; the check here only
    /// guards direct callers.
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&codec::encode_address(self.offset))?;
        match &self.payload {
            Payload::Literal(data) => {
                let len = u16::try_from(data.len())
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("literal record length {} out of range", data.len()),
                        )
                    })?;
                w.write_all(&codec::encode_length(len))?;
                w.write_all(data)
            }
            Payload::Rle { count, value } => {
                w.write_all(&codec::encode_length(0))?;
                w.write_all(&codec::encode_length(*count))?;
                w.write_all(&[*value])
            }
        }
    }
}
