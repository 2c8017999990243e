// End-to-end checks of the IPS codec against hand-built patch streams.
//
// These tests verify:
//   - The wire layout of encoder output
//   - RLE, out-of-order and overlapping records on the apply side
//   - Rejection of bad magic and truncated streams, on memory and file targets
//   - Trailing data after the EOF marker
//   - The EOF-address rule and the 24-bit limit on large buffers

use std::io::{Read, Seek, SeekFrom, Write};

use ipspatch::ips::{
    self, DecodeError, EOF_ADDRESS, EncodeError, IPS_EOF, IPS_MAGIC, MAX_RECORD_LEN,
    PatchEncoder, Record, RecordReader,
};

// ===========================================================================
// Helpers
// ===========================================================================

fn encode(original: &[u8], modified: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ips::encode_all(&mut out, original, modified).unwrap();
    out
}

fn build_patch(records: &[Record], truncate: Option<u32>) -> Vec<u8> {
    let mut enc = PatchEncoder::new(Vec::new()).unwrap();
    for rec in records {
        enc.write_record(rec).unwrap();
    }
    enc.finish(truncate).unwrap().0
}

fn read_records(patch: &[u8]) -> Vec<Record> {
    RecordReader::new(patch)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

// ===========================================================================
// Encoder output
// ===========================================================================

#[test]
fn concrete_scenario_bytes_and_roundtrip() {
    let original = [0x00, 0x00, 0x00, 0x00];
    let modified = [0x00, 0xFF, 0xFF, 0x00];
    let patch = encode(&original, &modified);
    assert_eq!(
        patch,
        [
            0x50, 0x41, 0x54, 0x43, 0x48, 0x00, 0x00, 0x01, 0x00, 0x02, 0xFF, 0xFF, 0x45, 0x4F,
            0x46
        ]
    );
    assert_eq!(ips::apply_all(&original, &patch).unwrap(), modified);
}

#[test]
fn identical_inputs_give_header_and_trailer_only() {
    let data: Vec<u8> = (0..=255).collect();
    let patch = encode(&data, &data);
    assert_eq!(&patch[..5], &IPS_MAGIC);
    assert_eq!(&patch[5..], &IPS_EOF);
}

#[test]
fn longer_modified_is_captured() {
    let original = b"short";
    let modified = b"short and then some more";
    let patch = encode(original, modified);
    let records = read_records(&patch);
    assert_eq!(records, vec![Record::literal(5, modified[5..].to_vec())]);
    assert_eq!(ips::apply_all(original, &patch).unwrap(), modified);
}

#[test]
fn encoder_never_emits_rle() {
    let original = vec![0u8; 1000];
    let modified = vec![0xAAu8; 1000];
    let records = read_records(&encode(&original, &modified));
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_rle());
}

#[test]
fn binary_random_like_roundtrip() {
    let mut original = Vec::with_capacity(4096);
    let mut state: u32 = 0xDEADBEEF;
    for _ in 0..4096 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        original.push((state >> 16) as u8);
    }
    let mut modified = original.clone();
    for i in (0..modified.len()).step_by(97) {
        modified[i] ^= 0x5A;
    }
    modified.truncate(3000);

    let patch = encode(&original, &modified);
    assert_eq!(ips::apply_all(&original, &patch).unwrap(), modified);
}

// ===========================================================================
// Applier behaviour
// ===========================================================================

#[test]
fn rle_record_on_zero_target() {
    let patch = build_patch(&[Record::rle(10, 5, 0xAA)], None);
    let patched = ips::apply_all(&[0u8; 20], &patch).unwrap();
    assert_eq!(patched.len(), 20);
    assert!(patched[..10].iter().all(|&b| b == 0));
    assert!(patched[10..15].iter().all(|&b| b == 0xAA));
    assert!(patched[15..].iter().all(|&b| b == 0));
}

#[test]
fn mixed_records_apply_in_order() {
    let patch = build_patch(
        &[
            Record::literal(4, b"WORLD".to_vec()),
            Record::rle(0, 4, b'-'),
            Record::literal(2, b"xy".to_vec()),
        ],
        None,
    );
    let patched = ips::apply_all(b"hello world", &patch).unwrap();
    assert_eq!(patched, b"--xyWORLDld");
}

#[test]
fn stats_count_records() {
    let patch = build_patch(
        &[Record::literal(0, vec![1, 2, 3]), Record::rle(8, 4, 9)],
        Some(10),
    );
    let mut target = vec![0u8; 16];
    let stats = ips::apply_patch(&patch[..], &mut target).unwrap();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.rle_records, 1);
    assert_eq!(stats.bytes_written, 7);
    assert_eq!(stats.truncated_to, Some(10));
    assert_eq!(target, [1, 2, 3, 0, 0, 0, 0, 0, 9, 9]);
}

#[test]
fn magic_rejection_on_file_keeps_size() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&[7u8; 32]).unwrap();

    let mut bogus = b"PATCX".to_vec();
    bogus.extend_from_slice(&[0, 0, 0, 0, 1, 0xFF]);
    bogus.extend_from_slice(&IPS_EOF);

    let err = ips::apply_patch(&bogus[..], &mut file).unwrap_err();
    assert!(matches!(err, DecodeError::BadMagic));
    assert_eq!(file.metadata().unwrap().len(), 32);
}

#[test]
fn trailing_data_after_eof_keeps_file_size() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"abcd").unwrap();

    let mut patch = build_patch(&[Record::literal(1, vec![b'B'])], None);
    patch.extend_from_slice(b"\r\n\r\n");
    let stats = ips::apply_patch(&patch[..], &mut file).unwrap();
    assert_eq!(stats.truncated_to, None);

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"aBcd");
}

#[test]
fn truncated_payload_on_file_target() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&[0u8; 8]).unwrap();

    let mut patch = IPS_MAGIC.to_vec();
    patch.extend_from_slice(&[0, 0, 2, 0, 3, 0x11]);
    let err = ips::apply_patch(&patch[..], &mut file).unwrap_err();
    assert!(matches!(err, DecodeError::TruncatedStream { .. }));

    let mut contents = Vec::new();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.read_to_end(&mut contents).unwrap();
    assert_eq!(contents, [0u8; 8]);
}

#[test]
fn every_cut_point_is_detected() {
    let patch = build_patch(
        &[Record::literal(3, vec![1, 2, 3, 4]), Record::rle(9, 3, 5)],
        None,
    );
    // Every proper prefix past the magic lacks the sentinel.
    for cut in IPS_MAGIC.len()..patch.len() {
        let err = ips::apply_all(&[0u8; 16], &patch[..cut]).unwrap_err();
        assert!(
            matches!(err, DecodeError::TruncatedStream { .. }),
            "cut at {cut}: {err}"
        );
    }
    for cut in 0..IPS_MAGIC.len() {
        assert!(matches!(
            ips::apply_all(&[], &patch[..cut]),
            Err(DecodeError::BadMagic)
        ));
    }
}

// ===========================================================================
// Large buffers
// ===========================================================================

#[test]
fn eof_address_run_roundtrip() {
    let len = EOF_ADDRESS as usize + 4;
    let original = vec![0x10u8; len];
    let mut modified = original.clone();
    modified[EOF_ADDRESS as usize..EOF_ADDRESS as usize + 2].copy_from_slice(&[1, 2]);

    let patch = encode(&original, &modified);
    // The sentinel must appear exactly once, at the end.
    let sentinel_hits = patch.windows(3).filter(|w| *w == IPS_EOF).count();
    assert_eq!(sentinel_hits, 1);
    assert_eq!(&patch[patch.len() - 3..], &IPS_EOF);

    let records = read_records(&patch);
    assert_eq!(
        records,
        vec![Record::literal(EOF_ADDRESS - 1, vec![0x10, 1, 2])]
    );
    assert_eq!(ips::apply_all(&original, &patch).unwrap(), modified);
}

#[test]
fn long_run_split_roundtrip() {
    let original = vec![0u8; 3 * MAX_RECORD_LEN];
    let modified = vec![1u8; 3 * MAX_RECORD_LEN + 7];
    let patch = encode(&original, &modified);
    let records = read_records(&patch);
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.target_len() <= MAX_RECORD_LEN));
    assert_eq!(ips::apply_all(&original, &patch).unwrap(), modified);
}

#[test]
fn address_overflow_is_an_error() {
    let len = (1usize << 24) + 16;
    let original = vec![0u8; len];
    let mut modified = original.clone();
    modified[len - 4] = 0xFF;

    let err = ips::encode_all(Vec::new(), &original, &modified).unwrap_err();
    assert!(matches!(err, EncodeError::AddressOverflow { offset } if offset == (len - 4) as u64));
}
