//! WAL Node
//!
//! One processor's write-ahead log, split into segments at flush
//! boundaries.
//!
//! ## Segment Lifecycle
//! ```text
//!  live: wal-000003.log ──notify_flush_start──▶ sealed (awaiting flush)
//!                                              │
//!            notify_flush_end(None) ───────────┼──▶ deleted
//!            notify_flush_end(Some(err)) ──────┴──▶ kept, retried with the next flush
//!                                              │
//!            retain_sealed() ──────────────────┴──▶ retained until the node reopens
//! ```
//!
//! Retained segments hold data that reached neither memory nor the durable
//! file. Neither a later flush nor `discard_all` deletes them; the next
//! open seals them again so the owner can replay them.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::WalSyncStrategy;
use crate::error::{AtlasError, Result};

use super::{Operation, WalEntry, WalReader, WalRecovery, WalWriter};

/// Write-ahead log of one processor
pub struct WriteLogNode {
    name: String,
    dir: PathBuf,
    sync_strategy: WalSyncStrategy,
    state: Mutex<NodeState>,
}

struct NodeState {
    writer: WalWriter,
    live_seq: u64,
    /// Segments whose data sits in a flush generation (or a failed one)
    sealed: Vec<PathBuf>,
    /// Segments of dropped generations, never deleted by this node
    retained: Vec<PathBuf>,
}

impl WriteLogNode {
    const SEGMENT_PREFIX: &'static str = "wal-";
    const SEGMENT_SUFFIX: &'static str = ".log";

    /// Open a node directory, recovering any segments left by a previous run
    ///
    /// Left-over segments are sealed; a fresh live segment is started.
    pub fn open(dir: &Path, name: &str, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let existing = Self::list_segments(dir)?;
        let mut last_lsn = 0;
        for (_, path) in &existing {
            let (_, result) = WalRecovery::recover(path)?;
            if result.entries_recovered > 0 || result.entries_corrupted > 0 {
                tracing::info!(
                    node = name,
                    segment = %path.display(),
                    recovered = result.entries_recovered,
                    corrupted = result.entries_corrupted,
                    last_lsn = result.last_lsn,
                    "recovered WAL segment"
                );
            }
            last_lsn = last_lsn.max(result.last_lsn);
        }

        let live_seq = existing.last().map(|(seq, _)| seq + 1).unwrap_or(1);
        let writer = WalWriter::open(&Self::segment_path(dir, live_seq), sync_strategy, last_lsn)?;

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            sync_strategy,
            state: Mutex::new(NodeState {
                writer,
                live_seq,
                sealed: existing.into_iter().map(|(_, p)| p).collect(),
                retained: Vec::new(),
            }),
        })
    }

    /// Append an operation to the live segment
    pub fn write(&self, operation: Operation) -> Result<u64> {
        self.state.lock().writer.append(operation)
    }

    /// Seal the live segment; its entries now belong to the starting flush
    pub fn notify_flush_start(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.writer.sync()?;

        let next_seq = state.live_seq + 1;
        let last_lsn = state.writer.current_lsn();
        let writer = WalWriter::open(
            &Self::segment_path(&self.dir, next_seq),
            self.sync_strategy,
            last_lsn,
        )?;
        let sealed = std::mem::replace(&mut state.writer, writer);
        state.sealed.push(sealed.path().to_path_buf());
        state.live_seq = next_seq;

        tracing::debug!(node = %self.name, sealed = state.sealed.len(), "sealed WAL segment");
        Ok(())
    }

    /// Retire sealed segments after a successful flush, keep them otherwise
    pub fn notify_flush_end(&self, error: Option<&AtlasError>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(e) = error {
            tracing::warn!(
                node = %self.name,
                error = %e,
                kept = state.sealed.len(),
                "flush failed, keeping sealed WAL segments"
            );
            return Ok(());
        }

        for path in state.sealed.drain(..) {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        tracing::debug!(node = %self.name, "retired sealed WAL segments");
        Ok(())
    }

    /// Move the sealed segments out of the flush cycle
    ///
    /// Used when a failed generation's data is dropped from memory: its
    /// segments then survive later flushes and `discard_all`.
    pub fn retain_sealed(&self) {
        let mut state = self.state.lock();
        let moved = state.sealed.len();
        let sealed = std::mem::take(&mut state.sealed);
        state.retained.extend(sealed);
        if moved > 0 {
            tracing::warn!(
                node = %self.name,
                moved,
                retained = state.retained.len(),
                "retaining WAL segments of dropped flush"
            );
        }
    }

    /// Every entry still on disk, sealed segments first, in LSN order
    pub fn replay_entries(&self) -> Result<Vec<WalEntry>> {
        let mut state = self.state.lock();
        state.writer.sync()?;

        let mut entries = Vec::new();
        for (_, path) in Self::list_segments(&self.dir)? {
            for entry in WalReader::open(&path)?.entries() {
                match entry {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        tracing::warn!(segment = %path.display(), error = %e, "skipping WAL tail");
                        break;
                    }
                }
            }
        }
        entries.sort_by_key(|e| e.lsn);
        Ok(entries)
    }

    /// Drop every segment except retained ones (all other data is durable
    /// elsewhere) and start fresh
    pub fn discard_all(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.writer.sync()?;
        state.sealed.clear();

        let next_seq = state.live_seq + 1;
        let last_lsn = state.writer.current_lsn();
        let writer = WalWriter::open(
            &Self::segment_path(&self.dir, next_seq),
            self.sync_strategy,
            last_lsn,
        )?;
        state.writer = writer;
        state.live_seq = next_seq;

        for (seq, path) in Self::list_segments(&self.dir)? {
            if seq != next_seq && !state.retained.contains(&path) {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.state.lock().writer.sync()
    }

    pub fn current_lsn(&self) -> u64 {
        self.state.lock().writer.current_lsn()
    }

    pub fn sealed_count(&self) -> usize {
        self.state.lock().sealed.len()
    }

    pub fn retained_count(&self) -> usize {
        self.state.lock().retained.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Segment files on disk, ordered by sequence number
    pub fn segments(&self) -> Result<Vec<PathBuf>> {
        Ok(Self::list_segments(&self.dir)?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn segment_path(dir: &Path, seq: u64) -> PathBuf {
        dir.join(format!("{}{:06}{}", Self::SEGMENT_PREFIX, seq, Self::SEGMENT_SUFFIX))
    }

    /// "wal-000042.log" → Some(42)
    fn parse_segment_seq(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_string_lossy();
        name.strip_prefix(Self::SEGMENT_PREFIX)?
            .strip_suffix(Self::SEGMENT_SUFFIX)?
            .parse()
            .ok()
    }

    fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
        let mut segments = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(seq) = Self::parse_segment_seq(&path) {
                    segments.push((seq, path));
                }
            }
        }
        segments.sort();
        Ok(segments)
    }
}
