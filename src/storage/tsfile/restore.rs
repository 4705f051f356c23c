//! Restore checkpoints
//!
//! A checkpoint records how many bytes of the durable file are known good
//! and the metadata of every chunk inside that prefix. It lives next to
//! the data file as `{file}.restore` and is replaced atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::storage::ChunkMetadata;

/// Recovery point of an unfinished durable file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreCheckpoint {
    /// Bytes of the data file covered by this checkpoint
    pub valid_length: u64,
    /// Chunks inside the valid prefix, in append order
    pub chunks: Vec<ChunkMetadata>,
}

impl RestoreCheckpoint {
    /// Persist as `[CRC (4)][bincode]` via temp file + rename
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let crc = crc32fast::hash(&body);

        let tmp = tmp_path(path);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&crc.to_le_bytes())?;
            file.write_all(&body)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a checkpoint; `Ok(None)` when no checkpoint file exists
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        if bytes.len() < 4 {
            return Err(AtlasError::Storage(format!(
                "restore file {} is truncated",
                path.display()
            )));
        }

        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[..4]);
        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(&bytes[4..]);
        if expected != actual {
            return Err(AtlasError::ChecksumMismatch { expected, actual });
        }

        Ok(Some(bincode::deserialize(&bytes[4..])?))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
