//! TsFile Module
//!
//! Single-file durable format for one processor.
//!
//! ## Chunk Frame
//! ```text
//! ┌─────────┬─────────┬──────────────────────────────────────────────┐
//! │ Len (4) │ CRC (4) │ Payload (Len bytes)                          │
//! └─────────┴─────────┴──────────────────────────────────────────────┘
//! Payload: [DevLen u16][Device][MeasLen u16][Measurement][Type u8]
//!          [Version u64][Count u32] then Count × [Time i64][Value]
//! Value:   Boolean u8 | Int32 i32 | Int64 i64 | Float f32 | Double f64
//!          | Text [Len u32][Bytes]
//! ```
//! All integers little-endian. CRC covers the payload only.

mod chunk;
mod reader;
mod restore;
mod writer;

use serde::{Deserialize, Serialize};

pub use reader::TsFileReader;
pub use restore::RestoreCheckpoint;
pub use writer::TsFileWriter;

use super::{ChunkMetadata, FileSchema};

// =============================================================================
// Shared Constants (used by writer, reader, chunk codec)
// =============================================================================

/// Magic bytes identifying an AtlasTS durable file
pub(crate) const MAGIC: &[u8; 4] = b"ATTS";

/// Current file format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) = 6 bytes
pub(crate) const HEADER_SIZE: u64 = 6;

/// Footer size: IndexOffset (8) + IndexLen (8) + IndexCRC (4) + Magic (4) = 24 bytes
pub(crate) const FOOTER_SIZE: u64 = 24;

/// Chunk frame prefix: Len (4) + CRC (4)
pub(crate) const CHUNK_FRAME_HEADER: usize = 8;

/// Suffix of the restore checkpoint side file
pub(crate) const RESTORE_SUFFIX: &str = ".restore";

/// Index block written at finalize
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FileIndex {
    pub chunks: Vec<ChunkMetadata>,
    pub schema: FileSchema,
}
