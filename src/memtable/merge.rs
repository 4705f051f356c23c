//! Lazily merged read view over buffered series
//!
//! A view holds snapshots of the flush buffer's and the work buffer's
//! series for one key. Nothing is sorted until the view is first read.

use std::sync::{Arc, OnceLock};

use crate::record::{DataType, TimeValuePair};

use super::series::{sort_dedup, MemSeries};

/// Read-only merge of buffered series, oldest source first
///
/// On equal timestamps the value from the later source wins, so the work
/// buffer overrides the flush buffer.
#[derive(Debug)]
pub struct SeriesView {
    data_type: DataType,
    sources: Vec<Arc<MemSeries>>,
    merged: OnceLock<Vec<TimeValuePair>>,
}

impl SeriesView {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            sources: Vec::new(),
            merged: OnceLock::new(),
        }
    }

    /// Append a source; later sources take precedence
    pub fn add_source(&mut self, series: Arc<MemSeries>) {
        self.merged = OnceLock::new();
        self.sources.push(series);
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Sorted, de-duplicated points (computed on first call)
    pub fn points(&self) -> &[TimeValuePair] {
        self.merged.get_or_init(|| {
            sort_dedup(
                self.sources
                    .iter()
                    .flat_map(|s| s.points().iter().cloned()),
            )
        })
    }

    pub fn iter(&self) -> SeriesViewIter<'_> {
        SeriesViewIter {
            points: self.points(),
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.iter().all(|s| s.is_empty())
    }

    pub fn max_time(&self) -> Option<i64> {
        self.points().last().map(|p| p.time)
    }
}

/// Iterator over a [`SeriesView`] in time order
pub struct SeriesViewIter<'a> {
    points: &'a [TimeValuePair],
    pos: usize,
}

impl<'a> Iterator for SeriesViewIter<'a> {
    type Item = &'a TimeValuePair;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.points.get(self.pos)?;
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.points.len() - self.pos;
        (rest, Some(rest))
    }
}

impl<'a> IntoIterator for &'a SeriesView {
    type Item = &'a TimeValuePair;
    type IntoIter = SeriesViewIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
