// IPS patch format implementation.
//
// # Modules
//
// - `codec`   : 3-byte address / 2-byte length fields, framing constants
// - `record`  : Record and payload types, on-disk record layout
// - `decoder` : Record parsing and in-place application
// - `encoder` : Byte-for-byte diff and record emission

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod record;

// Re-export key types for convenience.
pub use codec::{EOF_ADDRESS, IPS_EOF, IPS_MAGIC, MAX_ADDRESS, MAX_RECORD_LEN};
pub use decoder::{ApplyStats, DecodeError, PatchTarget, RecordReader, apply_all, apply_patch};
pub use encoder::{EncodeError, EncodeStats, PatchEncoder, encode_all};
pub use record::{Payload, Record};
