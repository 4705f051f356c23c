//! MemTable implementation
//!
//! HashMap of copy-on-write series. The table itself is not synchronized;
//! the owning processor guards it with its swap/read lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AtlasError, Result};
use crate::record::{DataType, TsRecord, Value};

use super::{MemSeries, SeriesKey};

/// In-memory table of buffered points
#[derive(Debug, Default)]
pub struct MemTable {
    series: HashMap<SeriesKey, Arc<MemSeries>>,
    point_count: usize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one point to a series, creating the series on first write
    pub fn write(
        &mut self,
        device: &str,
        measurement: &str,
        data_type: DataType,
        time: i64,
        value: Value,
    ) -> Result<()> {
        self.check_type(device, measurement, data_type)?;
        if value.data_type() != data_type {
            return Err(AtlasError::TypeMismatch {
                series: format!("{}.{}", device, measurement),
                existing: data_type,
                requested: value.data_type(),
            });
        }

        let key = SeriesKey::new(device, measurement);
        let series = self
            .series
            .entry(key)
            .or_insert_with(|| Arc::new(MemSeries::new(data_type)));
        Arc::make_mut(series).push(time, value);
        self.point_count += 1;
        Ok(())
    }

    /// Append every point of a record, or none of them
    pub fn write_record(&mut self, record: &TsRecord) -> Result<()> {
        for point in &record.points {
            self.check_type(&record.device, &point.measurement, point.value.data_type())?;
        }
        for point in &record.points {
            self.write(
                &record.device,
                &point.measurement,
                point.value.data_type(),
                record.time,
                point.value.clone(),
            )?;
        }
        Ok(())
    }

    /// Fail if the series exists with a different declared type
    pub fn check_type(&self, device: &str, measurement: &str, data_type: DataType) -> Result<()> {
        let key = SeriesKey::new(device, measurement);
        match self.series.get(&key) {
            Some(existing) if existing.data_type() != data_type => Err(AtlasError::TypeMismatch {
                series: key.to_string(),
                existing: existing.data_type(),
                requested: data_type,
            }),
            _ => Ok(()),
        }
    }

    /// Drop all points of a series with `time <= upper_bound`
    ///
    /// Returns the number of points removed. A series left empty is removed.
    pub fn delete(&mut self, device: &str, measurement: &str, upper_bound: i64) -> usize {
        let key = SeriesKey::new(device, measurement);
        let Some(series) = self.series.get_mut(&key) else {
            return 0;
        };

        let removed = Arc::make_mut(series).delete_up_to(upper_bound);
        if series.is_empty() {
            self.series.remove(&key);
        }
        self.point_count -= removed;
        removed
    }

    /// Fully independent deep clone
    pub fn copy(&self) -> MemTable {
        let series = self
            .series
            .iter()
            .map(|(k, s)| (k.clone(), Arc::new(MemSeries::clone(s))))
            .collect();
        MemTable {
            series,
            point_count: self.point_count,
        }
    }

    /// Snapshot of one series if it exists with the requested type
    pub fn query(
        &self,
        device: &str,
        measurement: &str,
        data_type: DataType,
    ) -> Option<Arc<MemSeries>> {
        self.series
            .get(&SeriesKey::new(device, measurement))
            .filter(|s| s.data_type() == data_type)
            .cloned()
    }

    /// All series in key order (for flush)
    pub fn series(&self) -> Vec<(&SeriesKey, &MemSeries)> {
        let mut all: Vec<_> = self.series.iter().map(|(k, s)| (k, s.as_ref())).collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }

    /// Put `older` points in front of this table's points, series by series
    ///
    /// A series whose types disagree keeps this table's data only. Returns
    /// the number of points taken from `older`.
    pub fn absorb_older(&mut self, older: &MemTable) -> usize {
        let mut restored = 0;
        for (key, old) in &older.series {
            match self.series.get_mut(key) {
                None => {
                    self.series.insert(key.clone(), Arc::new(MemSeries::clone(old)));
                    restored += old.len();
                }
                Some(current) if current.data_type() == old.data_type() => {
                    let mut merged = MemSeries::clone(old);
                    for p in current.points() {
                        merged.push(p.time, p.value.clone());
                    }
                    restored += old.len();
                    *current = Arc::new(merged);
                }
                Some(_) => {
                    tracing::warn!(series = %key, "dropping restored series with conflicting type");
                }
            }
        }
        self.point_count += restored;
        restored
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Clear all entries (after a finished flush)
    pub fn clear(&mut self) {
        self.series.clear();
        self.point_count = 0;
    }
}
