//! TsFile Writer
//!
//! Appends chunk groups to a new durable file, keeps restore checkpoints and
//! writes the index footer on finalize.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};

use crate::error::{AtlasError, Result};
use crate::memtable::MemTable;
use crate::record::DataType;
use crate::storage::{ChunkMetadata, DurableWriter, FileSchema};

use super::chunk::encode_chunk;
use super::{FileIndex, RestoreCheckpoint, HEADER_SIZE, MAGIC, RESTORE_SUFFIX, VERSION};

/// Restorable writer for one durable file
///
/// ## Concurrency:
/// - `state`: file handle and append bookkeeping, held for the whole
///   append / checkpoint / finalize step
/// - `visible`: published metadata, read by queries without touching `state`
pub struct TsFileWriter {
    path: PathBuf,
    restore_path: PathBuf,
    state: Mutex<WriterState>,
    visible: RwLock<Vec<ChunkMetadata>>,
}

struct WriterState {
    file: File,
    /// End of the last complete chunk group
    position: u64,
    /// Appended but not yet published
    pending: Vec<ChunkMetadata>,
    /// Every chunk durably appended, published or not
    appended: Vec<ChunkMetadata>,
    finalized: bool,
}

impl TsFileWriter {
    /// Create a new file, or resume one left behind with a restore checkpoint
    ///
    /// Resuming truncates the file to the checkpoint's valid length and
    /// reloads its chunk metadata. A file that exists without a checkpoint
    /// was already finalized and is rejected.
    pub fn open(path: &Path) -> Result<Self> {
        let restore_path = Self::restore_path_for(path);

        let (file, position, appended) = match RestoreCheckpoint::read(&restore_path)? {
            Some(checkpoint) if path.exists() => {
                let file = OpenOptions::new().read(true).write(true).open(path)?;
                let len = file.metadata()?.len();
                if len < checkpoint.valid_length {
                    return Err(AtlasError::Storage(format!(
                        "{} is shorter ({} bytes) than its restore checkpoint ({} bytes)",
                        path.display(),
                        len,
                        checkpoint.valid_length
                    )));
                }
                file.set_len(checkpoint.valid_length)?;
                tracing::info!(
                    file = %path.display(),
                    valid_length = checkpoint.valid_length,
                    dropped = len - checkpoint.valid_length,
                    chunks = checkpoint.chunks.len(),
                    "resumed durable file from restore checkpoint"
                );
                (file, checkpoint.valid_length, checkpoint.chunks)
            }
            _ => {
                if path.exists() && fs::metadata(path)?.len() > 0 {
                    return Err(AtlasError::Storage(format!(
                        "{} already exists without a restore checkpoint",
                        path.display()
                    )));
                }
                let mut file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?;
                file.write_all(MAGIC)?;
                file.write_all(&VERSION.to_le_bytes())?;
                file.sync_all()?;
                (file, HEADER_SIZE, Vec::new())
            }
        };

        let writer = Self {
            path: path.to_path_buf(),
            restore_path,
            state: Mutex::new(WriterState {
                file,
                position,
                pending: Vec::new(),
                appended: appended.clone(),
                finalized: false,
            }),
            visible: RwLock::new(appended),
        };

        // A fresh file gets its first checkpoint right away, so "exists
        // without checkpoint" always means "finalized"
        writer.write_restore_checkpoint()?;
        Ok(writer)
    }

    /// Path of the restore side file for a data file
    pub fn restore_path_for(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(RESTORE_SUFFIX);
        PathBuf::from(name)
    }

    /// End of the last complete chunk group
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().finalized
    }

    /// Number of published chunks
    pub fn visible_chunk_count(&self) -> usize {
        self.visible.read().len()
    }
}

impl DurableWriter for TsFileWriter {
    fn append_chunk_group(&self, memtable: &MemTable, version: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.finalized {
            return Err(AtlasError::Storage(format!(
                "{} is finalized, cannot append",
                self.path.display()
            )));
        }

        // Encode the whole group first; it is written with one call so a
        // failure can be rolled back to `start`
        let start = state.position;
        let mut buf = BytesMut::new();
        let mut chunks = Vec::new();
        for (key, series) in memtable.series() {
            if series.is_empty() {
                continue;
            }
            chunks.push(encode_chunk(&mut buf, key, series, version, start)?);
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let file = &mut state.file;
        let written = file
            .seek(SeekFrom::Start(start))
            .and_then(|_| file.write_all(&buf))
            .and_then(|_| file.sync_data());
        if let Err(e) = written {
            // Best effort: drop the partial group so the next append starts clean
            let _ = state.file.set_len(start);
            return Err(AtlasError::Io(e));
        }

        state.position = start + buf.len() as u64;
        state.appended.extend(chunks.iter().cloned());
        state.pending.extend(chunks);
        tracing::debug!(
            file = %self.path.display(),
            version,
            bytes = buf.len(),
            "appended chunk group"
        );
        Ok(())
    }

    fn write_restore_checkpoint(&self) -> Result<()> {
        let state = self.state.lock();
        if state.finalized {
            return Ok(());
        }
        RestoreCheckpoint {
            valid_length: state.position,
            chunks: state.appended.clone(),
        }
        .write_atomic(&self.restore_path)
    }

    fn append_metadata(&self) {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut state.pending);
        self.visible.write().extend(pending);
    }

    fn chunk_metadata(
        &self,
        device: &str,
        measurement: &str,
        data_type: DataType,
    ) -> Vec<ChunkMetadata> {
        self.visible
            .read()
            .iter()
            .filter(|m| m.matches(device, measurement, data_type))
            .cloned()
            .collect()
    }

    fn finalize(&self, schema: &FileSchema) -> Result<()> {
        let mut state = self.state.lock();
        if state.finalized {
            return Err(AtlasError::Storage(format!(
                "{} is already finalized",
                self.path.display()
            )));
        }

        let index = FileIndex {
            chunks: state.appended.clone(),
            schema: schema.clone(),
        };
        let index_bytes = bincode::serialize(&index)?;
        let index_offset = state.position;
        let index_crc = crc32fast::hash(&index_bytes);

        // Write index block and footer:
        // index_offset (8) + index_len (8) + index_crc (4) + magic (4)
        state.file.seek(SeekFrom::Start(index_offset))?;
        state.file.write_all(&index_bytes)?;
        state.file.write_all(&index_offset.to_le_bytes())?;
        state.file.write_all(&(index_bytes.len() as u64).to_le_bytes())?;
        state.file.write_all(&index_crc.to_le_bytes())?;
        state.file.write_all(MAGIC)?;
        state.file.sync_all()?;

        state.finalized = true;
        let pending = std::mem::take(&mut state.pending);
        self.visible.write().extend(pending);
        drop(state);

        if self.restore_path.exists() {
            fs::remove_file(&self.restore_path)?;
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn restore_file_path(&self) -> &Path {
        &self.restore_path
    }
}
