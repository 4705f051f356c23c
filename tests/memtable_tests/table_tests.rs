//! MemTable Tests
//!
//! Tests verify:
//! - Writes, type checks and point counting
//! - Deletes by upper-bound timestamp
//! - Deep copies that are independent of the source
//! - Query snapshots that survive later writes
//! - Merged series views (ordering, later source wins)
//! - Restoring an older table in front of a newer one

use std::sync::Arc;

use atlasts::error::AtlasError;
use atlasts::memtable::{MemSeries, MemTable, SeriesKey, SeriesView};
use atlasts::record::{DataType, TimeValuePair, TsRecord, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn write_f64(table: &mut MemTable, device: &str, measurement: &str, time: i64, value: f64) {
    table
        .write(device, measurement, DataType::Double, time, Value::Double(value))
        .unwrap();
}

fn times(points: &[TimeValuePair]) -> Vec<i64> {
    points.iter().map(|p| p.time).collect()
}

fn series_of(table: &MemTable, device: &str, measurement: &str) -> Arc<MemSeries> {
    table.query(device, measurement, DataType::Double).unwrap()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let table = MemTable::new();
    assert!(table.is_empty());
    assert_eq!(table.point_count(), 0);
    assert_eq!(table.series_count(), 0);
}

#[test]
fn test_write_and_query() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 10, 1.0);
    write_f64(&mut table, "d1", "s1", 5, 2.0);
    write_f64(&mut table, "d1", "s2", 7, 3.0);

    assert_eq!(table.point_count(), 3);
    assert_eq!(table.series_count(), 2);

    let series = series_of(&table, "d1", "s1");
    assert_eq!(times(series.points()), vec![10, 5]);
    assert_eq!(times(&series.sorted()), vec![5, 10]);
    assert_eq!(series.min_time(), Some(5));
    assert_eq!(series.max_time(), Some(10));
}

#[test]
fn test_query_missing_series_or_wrong_type() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    assert!(table.query("d1", "missing", DataType::Double).is_none());
    assert!(table.query("d1", "s1", DataType::Int32).is_none());
}

#[test]
fn test_write_rejects_type_change() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    let result = table.write("d1", "s1", DataType::Int32, 2, Value::Int32(2));
    assert!(matches!(result, Err(AtlasError::TypeMismatch { .. })));
    assert_eq!(table.point_count(), 1);
}

#[test]
fn test_write_rejects_value_of_other_type() {
    let mut table = MemTable::new();
    let result = table.write("d1", "s1", DataType::Int64, 1, Value::Boolean(true));
    assert!(matches!(result, Err(AtlasError::TypeMismatch { .. })));
    assert!(table.is_empty());
}

#[test]
fn test_write_record_is_all_or_nothing() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s2", 1, 1.0);

    let record = TsRecord::new("d1", 2)
        .with_point("s1", Value::Double(1.0))
        .with_point("s2", Value::Int32(7));
    assert!(table.write_record(&record).is_err());

    assert_eq!(table.point_count(), 1);
    assert!(table.query("d1", "s1", DataType::Double).is_none());
}

#[test]
fn test_series_sorted_by_key() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d2", "s1", 1, 1.0);
    write_f64(&mut table, "d1", "s2", 1, 1.0);
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    let keys: Vec<String> = table.series().iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, vec!["d1.s1", "d1.s2", "d2.s1"]);
}

#[test]
fn test_series_key_display() {
    assert_eq!(SeriesKey::new("root.sg.d1", "s1").to_string(), "root.sg.d1.s1");
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_up_to_timestamp() {
    let mut table = MemTable::new();
    for t in 1..=10 {
        write_f64(&mut table, "d1", "s1", t, t as f64);
    }

    let removed = table.delete("d1", "s1", 4);

    assert_eq!(removed, 4);
    assert_eq!(table.point_count(), 6);
    assert_eq!(times(&series_of(&table, "d1", "s1").sorted()), (5..=10).collect::<Vec<_>>());
}

#[test]
fn test_delete_everything_removes_series() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    assert_eq!(table.delete("d1", "s1", 100), 1);
    assert_eq!(table.series_count(), 0);
    assert!(table.is_empty());
}

#[test]
fn test_delete_unknown_series_is_noop() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    assert_eq!(table.delete("d9", "s1", 100), 0);
    assert_eq!(table.point_count(), 1);
}

// =============================================================================
// Copy-on-Write Tests
// =============================================================================

#[test]
fn test_copy_is_independent() {
    let mut original = MemTable::new();
    for t in 1..=5 {
        write_f64(&mut original, "d1", "s1", t, t as f64);
    }

    let mut copy = original.copy();
    copy.delete("d1", "s1", 3);
    write_f64(&mut copy, "d1", "s1", 6, 6.0);

    assert_eq!(original.point_count(), 5);
    assert_eq!(times(&series_of(&original, "d1", "s1").sorted()), vec![1, 2, 3, 4, 5]);
    assert_eq!(times(&series_of(&copy, "d1", "s1").sorted()), vec![4, 5, 6]);
}

#[test]
fn test_query_snapshot_survives_later_writes() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);

    let snapshot = series_of(&table, "d1", "s1");
    write_f64(&mut table, "d1", "s1", 2, 2.0);
    table.delete("d1", "s1", 1);

    assert_eq!(times(snapshot.points()), vec![1]);
    assert_eq!(times(series_of(&table, "d1", "s1").points()), vec![2]);
}

#[test]
fn test_clear() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 1, 1.0);
    table.clear();
    assert!(table.is_empty());
    assert_eq!(table.series_count(), 0);
}

// =============================================================================
// Series View Tests
// =============================================================================

#[test]
fn test_view_merges_sources_in_time_order() {
    let mut older = MemTable::new();
    let mut newer = MemTable::new();
    write_f64(&mut older, "d1", "s1", 3, 3.0);
    write_f64(&mut older, "d1", "s1", 1, 1.0);
    write_f64(&mut newer, "d1", "s1", 2, 2.0);
    write_f64(&mut newer, "d1", "s1", 4, 4.0);

    let mut view = SeriesView::new(DataType::Double);
    view.add_source(series_of(&older, "d1", "s1"));
    view.add_source(series_of(&newer, "d1", "s1"));

    assert_eq!(view.source_count(), 2);
    assert_eq!(view.len(), 4);
    assert_eq!(view.iter().map(|p| p.time).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(view.max_time(), Some(4));
}

#[test]
fn test_view_later_source_wins_on_equal_time() {
    let mut older = MemTable::new();
    let mut newer = MemTable::new();
    write_f64(&mut older, "d1", "s1", 5, 1.0);
    write_f64(&mut newer, "d1", "s1", 5, 2.0);

    let mut view = SeriesView::new(DataType::Double);
    view.add_source(series_of(&older, "d1", "s1"));
    view.add_source(series_of(&newer, "d1", "s1"));

    assert_eq!(view.points(), &[TimeValuePair::new(5, Value::Double(2.0))]);
}

#[test]
fn test_view_last_write_wins_within_source() {
    let mut table = MemTable::new();
    write_f64(&mut table, "d1", "s1", 5, 1.0);
    write_f64(&mut table, "d1", "s1", 5, 9.0);

    let mut view = SeriesView::new(DataType::Double);
    view.add_source(series_of(&table, "d1", "s1"));

    let values: Vec<_> = (&view).into_iter().map(|p| p.value.clone()).collect();
    assert_eq!(values, vec![Value::Double(9.0)]);
}

#[test]
fn test_empty_view() {
    let view = SeriesView::new(DataType::Int64);
    assert!(view.is_empty());
    assert_eq!(view.len(), 0);
    assert_eq!(view.max_time(), None);
    assert_eq!(view.data_type(), DataType::Int64);
}

// =============================================================================
// Restore Tests
// =============================================================================

#[test]
fn test_absorb_older_puts_old_points_first() {
    let mut older = MemTable::new();
    write_f64(&mut older, "d1", "s1", 5, 1.0);
    write_f64(&mut older, "d2", "s1", 1, 1.0);

    let mut newer = MemTable::new();
    write_f64(&mut newer, "d1", "s1", 5, 2.0);

    let restored = newer.absorb_older(&older);

    assert_eq!(restored, 2);
    assert_eq!(newer.point_count(), 3);
    let sorted = series_of(&newer, "d1", "s1").sorted();
    assert_eq!(sorted, vec![TimeValuePair::new(5, Value::Double(2.0))]);
    assert!(newer.query("d2", "s1", DataType::Double).is_some());
}

#[test]
fn test_absorb_older_skips_conflicting_type() {
    let mut older = MemTable::new();
    older.write("d1", "s1", DataType::Int32, 1, Value::Int32(1)).unwrap();

    let mut newer = MemTable::new();
    write_f64(&mut newer, "d1", "s1", 2, 2.0);

    assert_eq!(newer.absorb_older(&older), 0);
    assert_eq!(newer.point_count(), 1);
}
