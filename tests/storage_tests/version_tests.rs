//! Version Controller Tests
//!
//! Tests verify:
//! - Strictly increasing versions
//! - Reservation files on disk
//! - No version reuse after a restart
//! - Shared use from several threads

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use atlasts::version::{FileVersionController, SimpleVersionController, VersionController};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn reservation_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("Version-"))
        .collect();
    names.sort();
    names
}

// =============================================================================
// Simple Controller Tests
// =============================================================================

#[test]
fn test_simple_controller_counts_from_start() {
    let controller = SimpleVersionController::new(5);
    assert_eq!(controller.current_version(), 5);
    assert_eq!(controller.next_version().unwrap(), 6);
    assert_eq!(controller.next_version().unwrap(), 7);
    assert_eq!(controller.current_version(), 7);
}

#[test]
fn test_simple_controller_unique_across_threads() {
    let controller = Arc::new(SimpleVersionController::new(0));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                (0..250)
                    .map(|_| controller.next_version().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for v in handle.join().unwrap() {
            assert!(seen.insert(v));
        }
    }
    assert_eq!(seen.len(), 1000);
    assert_eq!(controller.current_version(), 1000);
}

// =============================================================================
// File Controller Tests
// =============================================================================

#[test]
fn test_file_controller_reserves_first_window() {
    let temp = TempDir::new().unwrap();
    let controller = FileVersionController::open(temp.path(), 10).unwrap();

    assert_eq!(controller.current_version(), 0);
    assert_eq!(reservation_files(temp.path()), vec!["Version-10"]);
}

#[test]
fn test_file_controller_moves_reservation_forward() {
    let temp = TempDir::new().unwrap();
    let controller = FileVersionController::open(temp.path(), 10).unwrap();

    for expected in 1..=11 {
        assert_eq!(controller.next_version().unwrap(), expected);
    }
    assert_eq!(reservation_files(temp.path()), vec!["Version-20"]);
}

#[test]
fn test_file_controller_never_reuses_after_restart() {
    let temp = TempDir::new().unwrap();
    let last = {
        let controller = FileVersionController::open(temp.path(), 10).unwrap();
        controller.next_version().unwrap();
        controller.next_version().unwrap();
        controller.next_version().unwrap()
    };

    let controller = FileVersionController::open(temp.path(), 10).unwrap();
    let next = controller.next_version().unwrap();

    assert!(next > last);
    assert_eq!(next, 11);
}

#[test]
fn test_file_controller_rejects_zero_interval() {
    let temp = TempDir::new().unwrap();
    assert!(FileVersionController::open(temp.path(), 0).is_err());
}
