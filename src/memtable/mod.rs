//! MemTable Module
//!
//! In-memory buffer of not-yet-durable points.
//!
//! ## Responsibilities
//! - Append points per (device, measurement) series
//! - Range tombstones: drop every point at or before a timestamp
//! - Deep copies, so a frozen buffer captured by a flush is never mutated
//! - Snapshot reads that survive later writes (copy-on-write series)
//!
//! ## Data Structure Choice
//! `HashMap<SeriesKey, Arc<MemSeries>>`:
//! - Writes go through `Arc::make_mut`, which only clones a series when a
//!   reader still holds the previous snapshot
//! - Flush iteration sorts the keys, so chunk order in the file is stable

mod merge;
mod series;
mod table;

use std::fmt;

pub use merge::{SeriesView, SeriesViewIter};
pub use series::MemSeries;
pub(crate) use series::sort_dedup;
pub use table::MemTable;

/// Identity of a series inside a memtable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub device: String,
    pub measurement: String,
}

impl SeriesKey {
    pub fn new(device: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.measurement)
    }
}
