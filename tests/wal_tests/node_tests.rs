//! Tests for WAL nodes and the WAL manager
//!
//! These tests verify:
//! - Segment sealing at flush start
//! - Segment retirement on a successful flush end
//! - Segments kept after a failed flush
//! - Replay across sealed and live segments
//! - Reopen after a restart
//! - One node per name from the manager

use atlasts::config::WalSyncStrategy;
use atlasts::error::AtlasError;
use atlasts::record::{TsRecord, Value};
use atlasts::wal::{Operation, WalManager, WriteLogNode};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_node(temp: &TempDir) -> WriteLogNode {
    WriteLogNode::open(&temp.path().join("node"), "root.sg-bufferwrite", WalSyncStrategy::EveryWrite)
        .unwrap()
}

fn insert_op(time: i64) -> Operation {
    Operation::Insert(TsRecord::new("d1", time).with_point("s1", Value::Float(time as f32)))
}

// =============================================================================
// Segment Lifecycle Tests
// =============================================================================

#[test]
fn test_new_node_has_one_live_segment() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);

    assert_eq!(node.segments().unwrap().len(), 1);
    assert_eq!(node.sealed_count(), 0);
    assert_eq!(node.current_lsn(), 0);
}

#[test]
fn test_flush_start_seals_live_segment() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    node.write(insert_op(1)).unwrap();

    node.notify_flush_start().unwrap();

    assert_eq!(node.sealed_count(), 1);
    assert_eq!(node.segments().unwrap().len(), 2);
}

#[test]
fn test_successful_flush_end_retires_sealed_segments() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    node.write(insert_op(1)).unwrap();
    node.notify_flush_start().unwrap();
    node.write(insert_op(2)).unwrap();

    node.notify_flush_end(None).unwrap();

    assert_eq!(node.sealed_count(), 0);
    assert_eq!(node.segments().unwrap().len(), 1);
    let entries = node.replay_entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 2);
}

#[test]
fn test_failed_flush_end_keeps_sealed_segments() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    node.write(insert_op(1)).unwrap();
    node.notify_flush_start().unwrap();

    let error = AtlasError::Storage("disk full".to_string());
    node.notify_flush_end(Some(&error)).unwrap();

    assert_eq!(node.sealed_count(), 1);
    assert_eq!(node.replay_entries().unwrap().len(), 1);
}

#[test]
fn test_retained_segments_outlive_later_flushes_and_discard() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    node.write(insert_op(1)).unwrap();
    node.notify_flush_start().unwrap();
    let error = AtlasError::Storage("disk full".to_string());
    node.notify_flush_end(Some(&error)).unwrap();
    node.retain_sealed();

    assert_eq!(node.sealed_count(), 0);
    assert_eq!(node.retained_count(), 1);

    node.write(insert_op(2)).unwrap();
    node.notify_flush_start().unwrap();
    node.notify_flush_end(None).unwrap();
    node.discard_all().unwrap();

    let lsns: Vec<u64> = node.replay_entries().unwrap().iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, vec![1]);
    drop(node);

    // Sealed again on reopen, so the next successful flush retires them
    let node = open_node(&temp);
    assert_eq!(node.retained_count(), 0);
    assert_eq!(node.replay_entries().unwrap().len(), 1);
    node.notify_flush_start().unwrap();
    node.notify_flush_end(None).unwrap();
    assert!(node.replay_entries().unwrap().is_empty());
}

#[test]
fn test_lsn_continues_across_segments() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);

    assert_eq!(node.write(insert_op(1)).unwrap(), 1);
    node.notify_flush_start().unwrap();
    assert_eq!(node.write(insert_op(2)).unwrap(), 2);
    node.notify_flush_start().unwrap();
    assert_eq!(node.write(insert_op(3)).unwrap(), 3);

    let lsns: Vec<u64> = node.replay_entries().unwrap().iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, vec![1, 2, 3]);
}

#[test]
fn test_discard_all_leaves_empty_live_segment() {
    let temp = TempDir::new().unwrap();
    let node = open_node(&temp);
    node.write(insert_op(1)).unwrap();
    node.notify_flush_start().unwrap();
    node.write(insert_op(2)).unwrap();

    node.discard_all().unwrap();

    assert_eq!(node.sealed_count(), 0);
    assert_eq!(node.segments().unwrap().len(), 1);
    assert!(node.replay_entries().unwrap().is_empty());
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_reopen_replays_previous_entries() {
    let temp = TempDir::new().unwrap();
    {
        let node = open_node(&temp);
        node.write(insert_op(1)).unwrap();
        node.write(insert_op(2)).unwrap();
    }

    let node = open_node(&temp);
    assert_eq!(node.sealed_count(), 1);
    assert_eq!(node.current_lsn(), 2);

    let entries = node.replay_entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(node.write(insert_op(3)).unwrap(), 3);
}

#[test]
fn test_reopen_after_successful_flush_end_has_nothing_to_replay() {
    let temp = TempDir::new().unwrap();
    {
        let node = open_node(&temp);
        node.write(insert_op(1)).unwrap();
        node.notify_flush_start().unwrap();
        node.notify_flush_end(None).unwrap();
    }

    let node = open_node(&temp);
    assert!(node.replay_entries().unwrap().is_empty());
}

// =============================================================================
// Manager Tests
// =============================================================================

#[test]
fn test_manager_returns_same_node_for_name() {
    let temp = TempDir::new().unwrap();
    let manager = WalManager::new(temp.path(), WalSyncStrategy::EveryWrite).unwrap();

    let a = manager.get_node("root.a-bufferwrite").unwrap();
    let b = manager.get_node("root.a-bufferwrite").unwrap();
    let c = manager.get_node("root.b-bufferwrite").unwrap();

    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert!(!std::sync::Arc::ptr_eq(&a, &c));
    assert_eq!(manager.node_count(), 2);
    assert_eq!(a.dir(), temp.path().join("root.a-bufferwrite"));
}

#[test]
fn test_manager_delete_node_removes_directory() {
    let temp = TempDir::new().unwrap();
    let manager = WalManager::new(temp.path(), WalSyncStrategy::EveryWrite).unwrap();
    let node = manager.get_node("root.a-bufferwrite").unwrap();
    node.write(insert_op(1)).unwrap();
    drop(node);

    manager.delete_node("root.a-bufferwrite").unwrap();

    assert_eq!(manager.node_count(), 0);
    assert!(!temp.path().join("root.a-bufferwrite").exists());
}
