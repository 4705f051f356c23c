//! Storage Module
//!
//! Durable, append-only storage of flushed memtables.
//!
//! ## Responsibilities
//! - Append one chunk group (one chunk per series) per flush generation
//! - Tag every chunk with the generation's version
//! - Restore checkpoints so a crashed writer resumes at the last good length
//! - Finalize the file with an index footer; afterwards it is immutable
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header: Magic "ATTS" (4) | Version (2) │
//! ├────────────────────────────────────────┤
//! │ Chunk group, version v1                │
//! │   [Len (4)][CRC (4)][Chunk payload]    │
//! │   ... one chunk per series ...         │
//! ├────────────────────────────────────────┤
//! │ Chunk group, version v2 ...            │
//! ├────────────────────────────────────────┤
//! │ Index (bincode: chunk metadata+schema) │
//! ├────────────────────────────────────────┤
//! │ Footer: IndexOffset (8) | IndexLen (8) │
//! │         IndexCRC (4)    | Magic (4)    │
//! └────────────────────────────────────────┘
//! ```

mod tsfile;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memtable::MemTable;
use crate::record::DataType;

pub use tsfile::{RestoreCheckpoint, TsFileReader, TsFileWriter};

/// Location and summary of one chunk in a durable file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub device: String,
    pub measurement: String,
    pub data_type: DataType,
    /// Flush generation that wrote this chunk
    pub version: u64,
    /// Offset of the chunk frame in the file
    pub offset: u64,
    /// Size of the chunk frame in bytes
    pub size: u32,
    pub num_points: u32,
    pub start_time: i64,
    pub end_time: i64,
}

impl ChunkMetadata {
    pub fn matches(&self, device: &str, measurement: &str, data_type: DataType) -> bool {
        self.device == device && self.measurement == measurement && self.data_type == data_type
    }
}

/// Measurements registered for a durable file and their types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSchema {
    measurements: BTreeMap<String, DataType>,
}

impl FileSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a measurement (builder style)
    pub fn with_measurement(mut self, measurement: impl Into<String>, data_type: DataType) -> Self {
        self.register(measurement, data_type);
        self
    }

    pub fn register(&mut self, measurement: impl Into<String>, data_type: DataType) {
        self.measurements.insert(measurement.into(), data_type);
    }

    pub fn get(&self, measurement: &str) -> Option<DataType> {
        self.measurements.get(measurement).copied()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataType)> {
        self.measurements.iter()
    }
}

/// Handle of a closed durable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsFileResource {
    pub path: PathBuf,
    pub closed: bool,
}

impl TsFileResource {
    pub fn new(path: impl Into<PathBuf>, closed: bool) -> Self {
        Self {
            path: path.into(),
            closed,
        }
    }
}

/// A partition's list of closed file resources
pub type ResourceList = Arc<RwLock<Vec<TsFileResource>>>;

/// Append-only writer a processor flushes into
///
/// All methods take `&self`: a flush task appends on a worker thread while
/// readers ask for chunk metadata.
pub trait DurableWriter: Send + Sync {
    /// Durably append every non-empty series of `memtable`, tagged `version`
    ///
    /// Metadata of the appended chunks stays pending until
    /// [`DurableWriter::append_metadata`] publishes it.
    fn append_chunk_group(&self, memtable: &MemTable, version: u64) -> Result<()>;

    /// Record the current valid length and metadata for crash recovery
    fn write_restore_checkpoint(&self) -> Result<()>;

    /// Make pending chunk metadata visible to readers
    fn append_metadata(&self);

    /// Visible chunk metadata of one series, in append order
    fn chunk_metadata(&self, device: &str, measurement: &str, data_type: DataType)
        -> Vec<ChunkMetadata>;

    /// Write the index footer; no appends are accepted afterwards
    fn finalize(&self, schema: &FileSchema) -> Result<()>;

    fn path(&self) -> &Path;

    fn restore_file_path(&self) -> &Path;
}
