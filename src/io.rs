// File-level I/O helpers for applying and creating IPS patches.
//
// Provides `apply_file()` and `create_file()` convenience functions that
// wrap the in-memory codec with buffered file I/O. Optionally computes
// SHA-256 checksums of the resulting file (feature-gated behind `file-io`).

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::ips::decoder::{self, DecodeError};
use crate::ips::encoder::{self, EncodeError};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyFileStats {
    /// Target size before patching.
    pub original_size: u64,
    /// Target size after patching.
    pub patched_size: u64,
    /// Patch file size in bytes.
    pub patch_size: u64,
    /// Records applied.
    pub records: u64,
    /// RLE records among them.
    pub rle_records: u64,
    /// Target bytes written.
    pub bytes_written: u64,
    /// Length the target was truncated to, if the patch asked for it.
    pub truncated_to: Option<u32>,
    /// SHA-256 of the patched target (if `file-io` feature is enabled).
    pub patched_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `create_file()`.
#[derive(Debug, Clone)]
pub struct CreateFileStats {
    /// Original file size in bytes.
    pub original_size: u64,
    /// Modified file size in bytes.
    pub modified_size: u64,
    /// Patch output size in bytes.
    pub patch_size: u64,
    /// Records written.
    pub records: u64,
    /// Literal payload bytes written.
    pub payload_bytes: u64,
    /// Truncate length written after the sentinel, if any.
    pub truncated_to: Option<u32>,
    /// SHA-256 of the modified file (if `file-io` feature is enabled).
    pub modified_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, Error)]
pub enum IoError {
    /// I/O error (file open, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Patch encoding error.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    /// Patch decoding error.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to `target_path` in place.
///
/// The target must already exist; it is opened for random-access writes and
/// grown or truncated as the patch requires. The patch is streamed through a
/// `BufReader`. A failure partway leaves the target partially patched.
pub fn apply_file(target_path: &Path, patch_path: &Path) -> Result<ApplyFileStats, IoError> {
    let mut target = OpenOptions::new()
        .read(true)
        .write(true)
        .open(target_path)?;
    let original_size = target.metadata()?.len();

    let patch_file = File::open(patch_path)?;
    let patch_size = patch_file.metadata()?.len();
    let patch_reader = BufReader::with_capacity(BUF_SIZE, patch_file);

    let stats = decoder::apply_patch(patch_reader, &mut target)?;
    target.sync_data()?;
    let patched_size = target.metadata()?.len();

    debug!(
        "{}: {original_size} -> {patched_size} bytes",
        target_path.display()
    );

    #[cfg(feature = "file-io")]
    let patched_sha256 = {
        use std::io::{Seek, SeekFrom};
        target.seek(SeekFrom::Start(0))?;
        Some(sha256_reader(BufReader::with_capacity(BUF_SIZE, target))?)
    };
    #[cfg(not(feature = "file-io"))]
    let patched_sha256: Option<[u8; 32]> = None;

    Ok(ApplyFileStats {
        original_size,
        patched_size,
        patch_size,
        records: stats.records,
        rle_records: stats.rle_records,
        bytes_written: stats.bytes_written,
        truncated_to: stats.truncated_to,
        patched_sha256,
    })
}

// ---------------------------------------------------------------------------
// create_file
// ---------------------------------------------------------------------------

/// Create a patch turning `original_path` into `modified_path`, writing it
/// to `patch_path`.
///
/// Both inputs are read fully into memory before the scan. The patch output
/// uses `BufWriter`.
pub fn create_file(
    original_path: &Path,
    modified_path: &Path,
    patch_path: &Path,
) -> Result<CreateFileStats, IoError> {
    let original = std::fs::read(original_path)?;
    let modified = std::fs::read(modified_path)?;

    let patch_file = File::create(patch_path)?;
    let patch_writer = BufWriter::with_capacity(BUF_SIZE, patch_file);

    let stats = encoder::encode_all(patch_writer, &original, &modified)?;

    #[cfg(feature = "file-io")]
    let modified_sha256 = {
        use sha2::Digest;
        Some(sha2::Sha256::digest(&modified).into())
    };
    #[cfg(not(feature = "file-io"))]
    let modified_sha256: Option<[u8; 32]> = None;

    Ok(CreateFileStats {
        original_size: original.len() as u64,
        modified_size: modified.len() as u64,
        patch_size: stats.patch_size,
        records: stats.records,
        payload_bytes: stats.payload_bytes,
        truncated_to: stats.truncated_to,
        modified_sha256,
    })
}

// ---------------------------------------------------------------------------
// Hashing helper (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
fn sha256_reader<R: std::io::Read>(mut reader: R) -> std::io::Result<[u8; 32]> {
    use sha2::Digest;
    let mut hasher = sha2::Sha256::new();
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Lowercase hex rendering of a digest.
pub fn hex_digest(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_apply_file_roundtrip() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original.bin");
        let modified = dir.path().join("modified.bin");
        let patch = dir.path().join("patch.ips");
        let target = dir.path().join("target.bin");

        let original_data = b"The quick brown fox jumps over the lazy dog.";
        let modified_data = b"The quick brown cat jumps over the lazy dog!!!";
        std::fs::write(&original, original_data).unwrap();
        std::fs::write(&modified, modified_data).unwrap();
        std::fs::write(&target, original_data).unwrap();

        let create = create_file(&original, &modified, &patch).unwrap();
        assert_eq!(create.original_size, original_data.len() as u64);
        assert_eq!(create.modified_size, modified_data.len() as u64);
        assert_eq!(create.patch_size, std::fs::metadata(&patch).unwrap().len());
        assert!(create.records >= 2);

        let apply = apply_file(&target, &patch).unwrap();
        assert_eq!(apply.records, create.records);
        assert_eq!(apply.patched_size, modified_data.len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), modified_data);
    }

    #[test]
    fn apply_file_truncates_target() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original.bin");
        let modified = dir.path().join("modified.bin");
        let patch = dir.path().join("patch.ips");

        std::fs::write(&original, b"0123456789").unwrap();
        std::fs::write(&modified, b"01234").unwrap();

        let create = create_file(&original, &modified, &patch).unwrap();
        assert_eq!(create.records, 0);
        assert_eq!(create.truncated_to, Some(5));

        let apply = apply_file(&original, &patch).unwrap();
        assert_eq!(apply.truncated_to, Some(5));
        assert_eq!(std::fs::read(&original).unwrap(), b"01234");
    }

    #[test]
    fn bad_magic_leaves_file_unchanged() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target.bin");
        let patch = dir.path().join("bad.ips");
        std::fs::write(&target, b"abc").unwrap();
        std::fs::write(&patch, b"NOTAPATCH").unwrap();

        let err = apply_file(&target, &patch).unwrap_err();
        assert!(matches!(err, IoError::Decode(DecodeError::BadMagic)));
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        let out = dir.path().join("out.ips");

        assert!(matches!(
            create_file(&missing, &missing, &out),
            Err(IoError::Io(_))
        ));
        assert!(matches!(apply_file(&missing, &out), Err(IoError::Io(_))));
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_checksums_agree() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original.bin");
        let modified = dir.path().join("modified.bin");
        let patch = dir.path().join("patch.ips");

        std::fs::write(&original, b"checksum source").unwrap();
        std::fs::write(&modified, b"checksum target, longer").unwrap();

        let create = create_file(&original, &modified, &patch).unwrap();
        let apply = apply_file(&original, &patch).unwrap();
        assert!(create.modified_sha256.is_some());
        assert_eq!(apply.patched_sha256, create.modified_sha256);
    }

    #[test]
    fn hex_digest_format() {
        let mut digest = [0u8; 32];
        digest[0] = 0xAB;
        digest[31] = 0x01;
        let hex = hex_digest(&digest);
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab00"));
        assert!(hex.ends_with("01"));
    }
}
