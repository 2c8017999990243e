// IPS record field codec.
//
// Addresses are 3 bytes and lengths 2 bytes, both big-endian. The stream is
// framed by the ASCII magic "PATCH" and the ASCII sentinel "EOF". Because the
// sentinel is read in place of an address, offset 0x454F46 can never be used
// as a record address.

// ---------------------------------------------------------------------------
// Framing constants
// ---------------------------------------------------------------------------

/// Stream header.
pub const IPS_MAGIC: [u8; 5] = *b"PATCH";

/// End-of-records sentinel.
pub const IPS_EOF: [u8; 3] = *b"EOF";

/// Largest offset representable in a 3-byte address field.
pub const MAX_ADDRESS: u32 = 0xFF_FFFF;

/// Largest literal payload / RLE repeat count.
pub const MAX_RECORD_LEN: usize = 0xFFFF;

/// The address whose encoding collides with [`IPS_EOF`].
pub const EOF_ADDRESS: u32 = 0x45_4F46;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a 24-bit offset, most significant byte first.
///
/// Bits above 24 are discarded; callers check [`fits_address`] first.
#[inline]
pub fn encode_address(offset: u32) -> [u8; 3] {
    [(offset >> 16) as u8, (offset >> 8) as u8, offset as u8]
}

/// Encode a 16-bit length, most significant byte first.
#[inline]
pub fn encode_length(len: u16) -> [u8; 2] {
    len.to_be_bytes()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[inline]
pub fn decode_address(bytes: [u8; 3]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

#[inline]
pub fn decode_length(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

// ---------------------------------------------------------------------------
// Address rules
// ---------------------------------------------------------------------------

/// True when `offset` would be read back as the end-of-records sentinel.
#[inline]
pub fn is_reserved_address(offset: u32) -> bool {
    offset == EOF_ADDRESS
}

/// True when `offset` fits in the 3-byte address field.
#[inline]
pub fn fits_address(offset: u64) -> bool {
    offset <= u64::from(MAX_ADDRESS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
