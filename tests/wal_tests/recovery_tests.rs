//! WAL Segment Recovery Tests
//!
//! Covered:
//! - Clean and empty segments
//! - Torn frames at the tail (cut back to the last whole entry)
//! - CRC mismatches (everything from the bad entry on is dropped)
//! - Verify mode, which reports the same numbers without touching the file

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use atlasts::config::WalSyncStrategy;
use atlasts::record::{TsRecord, Value};
use atlasts::wal::{Operation, RecoveryResult, WalEntry, WalRecovery, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn temp_segment() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let segment = temp.path().join("wal-000001.log");
    (temp, segment)
}

fn insert_op(time: i64) -> Operation {
    Operation::Insert(TsRecord::new("root.sg.d1", time).with_point("s1", Value::Int64(time)))
}

fn recover(segment: &PathBuf) -> (Vec<WalEntry>, RecoveryResult) {
    WalRecovery::recover(segment).unwrap()
}

/// Append `count` inserts through a writer
fn append_inserts(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite, 0).unwrap();
    for i in 0..count {
        writer.append(insert_op(i as i64)).unwrap();
    }
}

/// Replace the segment with hand-made bytes
fn write_raw(path: &PathBuf, chunks: &[&[u8]]) {
    let mut file = File::create(path).unwrap();
    for chunk in chunks {
        file.write_all(chunk).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Clean Segments
// =============================================================================

#[test]
fn test_empty_segment_recovers_nothing() {
    let (_temp, segment) = temp_segment();
    File::create(&segment).unwrap();

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_clean_segment_recovers_every_entry() {
    let (_temp, segment) = temp_segment();
    append_inserts(&segment, 10);

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);

    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
}

#[test]
fn test_recovered_operations_keep_kind_and_order() {
    let (_temp, segment) = temp_segment();
    {
        let mut writer = WalWriter::open(&segment, WalSyncStrategy::EveryWrite, 0).unwrap();
        writer.append(insert_op(1)).unwrap();
        writer
            .append(Operation::Delete {
                device: "root.sg.d1".to_string(),
                measurement: "s1".to_string(),
                time: 1,
            })
            .unwrap();
        writer.append(insert_op(2)).unwrap();
    }

    let (entries, result) = recover(&segment);

    assert_eq!(result.entries_recovered, 3);
    assert!(matches!(entries[0].operation, Operation::Insert(_)));
    assert!(matches!(entries[1].operation, Operation::Delete { .. }));
    assert!(matches!(entries[2].operation, Operation::Insert(_)));
}

// =============================================================================
// Torn Tails
// =============================================================================

#[test]
fn test_torn_header_is_cut_off() {
    let (_temp, segment) = temp_segment();
    let good = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    write_raw(&segment, &[&good, &[0u8; 8]]);

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&segment).unwrap().len(), good.len() as u64);
}

#[test]
fn test_torn_payload_is_cut_off() {
    let (_temp, segment) = temp_segment();
    let good = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    let mut bad = WalEntry::new(2, insert_op(2)).serialize().unwrap();
    bad.truncate(20);
    write_raw(&segment, &[&good, &bad]);

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_second_recovery_finds_clean_file() {
    let (_temp, segment) = temp_segment();
    let good = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    write_raw(&segment, &[&good, &[9u8; 3]]);

    WalRecovery::recover(&segment).unwrap();
    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 0);
    assert!(!result.was_truncated);
}

// =============================================================================
// Checksum Failures
// =============================================================================

#[test]
fn test_crc_mismatch_ends_valid_prefix() {
    let (_temp, segment) = temp_segment();
    let good = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    let mut bad = WalEntry::new(2, insert_op(2)).serialize().unwrap();
    if let Some(byte) = bad.last_mut() {
        *byte ^= 0xFF;
    }
    write_raw(&segment, &[&good, &bad]);

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_corrupt_first_entry_empties_segment() {
    let (_temp, segment) = temp_segment();
    let mut bytes = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    bytes[20] ^= 0xFF;
    write_raw(&segment, &[&bytes]);

    let (entries, result) = recover(&segment);

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 0);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&segment).unwrap().len(), 0);
}

// =============================================================================
// Verify Mode
// =============================================================================

#[test]
fn test_verify_reports_clean_segment() {
    let (_temp, segment) = temp_segment();
    append_inserts(&segment, 5);

    let result = WalRecovery::verify(&segment).unwrap();

    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 5);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_leaves_bad_tail_in_place() {
    let (_temp, segment) = temp_segment();
    let good = WalEntry::new(1, insert_op(1)).serialize().unwrap();
    write_raw(&segment, &[&good, &[0u8; 5]]);
    let before = std::fs::metadata(&segment).unwrap().len();

    let result = WalRecovery::verify(&segment).unwrap();

    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.entries_corrupted, 1);
    assert!(!result.was_truncated);
    assert_eq!(std::fs::metadata(&segment).unwrap().len(), before);
}

#[test]
fn test_verify_matches_recover_on_clean_segment() {
    let (_temp, segment) = temp_segment();
    append_inserts(&segment, 20);

    let verify_result = WalRecovery::verify(&segment).unwrap();
    let (entries, recover_result) = WalRecovery::recover(&segment).unwrap();

    assert_eq!(entries.len(), recover_result.entries_recovered as usize);
    assert_eq!(recover_result, verify_result);
}
