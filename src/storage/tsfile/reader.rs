//! TsFile Reader
//!
//! Opens finalized files and reads chunks back through the footer index.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{AtlasError, Result};
use crate::memtable::sort_dedup;
use crate::record::{DataType, TimeValuePair};
use crate::storage::{ChunkMetadata, FileSchema};

use super::chunk::decode_chunk;
use super::{FileIndex, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for a finalized durable file with its index held in memory
pub struct TsFileReader {
    path: PathBuf,
    file: File,
    index: FileIndex,
}

impl TsFileReader {
    /// Open a finalized file
    ///
    /// Validates header magic/version, footer magic and the index CRC, then
    /// loads the index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(AtlasError::Storage(format!(
                "{} is too small to be a finalized file ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        if &header[0..4] != MAGIC {
            return Err(AtlasError::Storage(format!(
                "Invalid file magic: expected ATTS, got {:?}",
                &header[0..4]
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(AtlasError::Storage(format!(
                "Unsupported file version: {}",
                version
            )));
        }

        // Read footer
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;
        if &footer[20..24] != MAGIC {
            return Err(AtlasError::Storage(format!(
                "{} is not finalized (missing footer magic)",
                path.display()
            )));
        }
        let index_offset = le_u64(&footer[0..8]);
        let index_len = le_u64(&footer[8..16]);
        let expected = le_u32(&footer[16..20]);

        if index_offset + index_len + FOOTER_SIZE != file_size {
            return Err(AtlasError::Storage(format!(
                "footer of {} points outside the file",
                path.display()
            )));
        }

        // Load index into memory
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_bytes = vec![0u8; index_len as usize];
        file.read_exact(&mut index_bytes)?;
        let actual = crc32fast::hash(&index_bytes);
        if actual != expected {
            return Err(AtlasError::ChecksumMismatch { expected, actual });
        }
        let index: FileIndex = bincode::deserialize(&index_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every chunk in append order
    pub fn chunk_metadata(&self) -> &[ChunkMetadata] {
        &self.index.chunks
    }

    pub fn schema(&self) -> &FileSchema {
        &self.index.schema
    }

    /// Chunks of one series in append order
    pub fn chunks_for(
        &self,
        device: &str,
        measurement: &str,
        data_type: DataType,
    ) -> Vec<ChunkMetadata> {
        self.index
            .chunks
            .iter()
            .filter(|m| m.matches(device, measurement, data_type))
            .cloned()
            .collect()
    }

    /// Read one chunk's points
    pub fn read_chunk(&mut self, meta: &ChunkMetadata) -> Result<Vec<TimeValuePair>> {
        read_chunk_from(&mut self.file, meta)
    }

    /// Read a whole series; on equal timestamps the larger version wins
    pub fn read_series(
        &mut self,
        device: &str,
        measurement: &str,
        data_type: DataType,
    ) -> Result<Vec<TimeValuePair>> {
        let chunks = self.chunks_for(device, measurement, data_type);
        merge_chunks(&mut self.file, chunks)
    }

    /// Read chunks of a file that may still be open for writing
    pub fn read_chunks_at(path: &Path, chunks: &[ChunkMetadata]) -> Result<Vec<TimeValuePair>> {
        let mut file = File::open(path)?;
        merge_chunks(&mut file, chunks.to_vec())
    }
}

fn merge_chunks(file: &mut File, mut chunks: Vec<ChunkMetadata>) -> Result<Vec<TimeValuePair>> {
    // Ascending version, so later (newer) chunks override in sort_dedup
    chunks.sort_by_key(|m| m.version);
    let mut all = Vec::new();
    for meta in &chunks {
        all.extend(read_chunk_from(file, meta)?);
    }
    Ok(sort_dedup(all))
}

fn read_chunk_from(file: &mut File, meta: &ChunkMetadata) -> Result<Vec<TimeValuePair>> {
    file.seek(SeekFrom::Start(meta.offset))?;
    let mut frame = vec![0u8; meta.size as usize];
    file.read_exact(&mut frame)?;

    let chunk = decode_chunk(&frame)?;
    if chunk.device != meta.device
        || chunk.measurement != meta.measurement
        || chunk.data_type != meta.data_type
        || chunk.version != meta.version
    {
        return Err(AtlasError::Storage(format!(
            "chunk at offset {} does not match its metadata",
            meta.offset
        )));
    }
    Ok(chunk.points)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}
