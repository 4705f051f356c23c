//! Per-series point buffer

use crate::record::{DataType, TimeValuePair, Value};

/// Points of one series in arrival order
#[derive(Debug, Clone)]
pub struct MemSeries {
    data_type: DataType,
    points: Vec<TimeValuePair>,
}

impl MemSeries {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            points: Vec::new(),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn push(&mut self, time: i64, value: Value) {
        self.points.push(TimeValuePair::new(time, value));
    }

    /// Remove every point with `time <= upper_bound`, returning how many went
    pub fn delete_up_to(&mut self, upper_bound: i64) -> usize {
        let before = self.points.len();
        self.points.retain(|p| p.time > upper_bound);
        before - self.points.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Raw points in arrival order
    pub fn points(&self) -> &[TimeValuePair] {
        &self.points
    }

    /// Points sorted by time, keeping the last-written value per timestamp
    pub fn sorted(&self) -> Vec<TimeValuePair> {
        sort_dedup(self.points.iter().cloned())
    }

    pub fn min_time(&self) -> Option<i64> {
        self.points.iter().map(|p| p.time).min()
    }

    pub fn max_time(&self) -> Option<i64> {
        self.points.iter().map(|p| p.time).max()
    }
}

/// Stable sort by time; on equal timestamps the later item wins
pub(crate) fn sort_dedup(points: impl IntoIterator<Item = TimeValuePair>) -> Vec<TimeValuePair> {
    let mut all: Vec<TimeValuePair> = points.into_iter().collect();
    all.sort_by_key(|p| p.time);

    let mut out: Vec<TimeValuePair> = Vec::with_capacity(all.len());
    for point in all {
        match out.last_mut() {
            Some(last) if last.time == point.time => *last = point,
            _ => out.push(point),
        }
    }
    out
}
