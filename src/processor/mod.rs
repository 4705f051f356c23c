//! Buffer-Write Processor
//!
//! Buffers incoming points for one storage group in memory and drains them,
//! a generation at a time, into one durable file.
//!
//! ## Responsibilities
//! - Admit inserts through the memory accountant and the WAL
//! - Swap the work buffer into the flush slot and hand it to the pool
//! - Apply deletes to both buffers without disturbing a running flush
//! - Answer point queries from a merged view of both buffers
//! - Finalize the durable file on close
//!
//! ## Buffer States
//! ```text
//!             flush()                       task finalizer
//!   Idle ──────────────▶ Flushing ──────────────────────────▶ Idle
//!   work: W              work: W' (fresh)                     work: W'
//!   flush: None          flush: Some(W)                       flush: None
//!                        (delete ⇒ flush: Some(copy(W) - d))
//! ```
//!
//! ## Locking
//! - `flush_lock`: serializes `flush()` callers (and the close path)
//! - `buffers`: guards the two buffer pointers; held for swaps, deletes,
//!   query snapshots and the task finalizer, never across I/O

mod builder;
mod callbacks;
mod task;

pub use builder::ProcessorBuilder;
pub use callbacks::{Action, Callbacks};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::config::FlushFailurePolicy;
use crate::error::{AtlasError, Result};
use crate::flush::{FlushHandle, FlushPool};
use crate::memory::{bytes_to_string, MemController, MemOwner, UsageLevel};
use crate::memtable::{MemTable, SeriesView};
use crate::record::{DataType, TsRecord, Value};
use crate::storage::{ChunkMetadata, DurableWriter, FileSchema, ResourceList, TsFileResource};
use crate::version::VersionController;
use crate::wal::{Operation, WriteLogNode};

/// Suffix of the WAL node name owned by a processor
pub const LOG_NODE_SUFFIX: &str = "-bufferwrite";

/// Write buffer of one storage group
///
/// Inserts, deletes, flushes and close come from a single caller thread;
/// queries may come from any thread. One flush task of this processor runs
/// on the pool at a time.
pub struct BufferWriteProcessor {
    shared: Arc<Shared>,

    /// Serializes flush generations
    flush_lock: Mutex<()>,

    /// Handle of the latest flush generation
    flush_handle: Mutex<FlushHandle>,

    flush_pool: Arc<FlushPool>,
    version_controller: Arc<dyn VersionController>,
    schema: FileSchema,
    resources: ResourceList,
    base_dir: PathBuf,
    insert_file: PathBuf,
    memtable_threshold: u64,

    /// Wall clock of the last flush() call in ns, -1 before the first
    last_flush_time: AtomicI64,
    closed: AtomicBool,
}

/// State the processor shares with its in-flight flush task
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) buffers: RwLock<Buffers>,
    pub(crate) writer: Arc<dyn DurableWriter>,
    pub(crate) log_node: Option<Arc<WriteLogNode>>,
    pub(crate) callbacks: Callbacks,
    pub(crate) mem_controller: Arc<MemController>,
    pub(crate) mem_owner: MemOwner,

    /// Bytes reported to the accountant since the last swap
    pub(crate) mem_size: AtomicU64,

    /// Records admitted since the last swap
    pub(crate) pending_values: AtomicU64,

    pub(crate) failed_flushes: AtomicU64,
    pub(crate) failure_policy: FlushFailurePolicy,
}

pub(crate) struct Buffers {
    pub(crate) work: MemTable,
    pub(crate) flush: Option<Arc<MemTable>>,
}

impl BufferWriteProcessor {
    /// Start building a processor named `name` on top of `ctx`
    pub fn builder<'a>(
        ctx: &'a crate::StorageContext,
        name: impl Into<String>,
    ) -> ProcessorBuilder<'a> {
        ProcessorBuilder::new(ctx, name)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Admit one record
    ///
    /// Returns `Ok(false)` when the memory accountant is at the dangerous
    /// tier; nothing is written in that case. A flush is triggered when the
    /// buffered footprint crosses the memtable threshold.
    pub fn insert(&self, record: &TsRecord) -> Result<bool> {
        self.ensure_open()?;

        // Step 1: Reject type conflicts before anything is accounted or logged
        {
            let buffers = self.shared.buffers.read();
            for point in &record.points {
                buffers.work.check_type(
                    &record.device,
                    &point.measurement,
                    point.value.data_type(),
                )?;
            }
        }

        // Step 2: Memory admission
        let mem_usage = record.mem_size();
        let shared = &self.shared;
        match shared.mem_controller.report_use(shared.mem_owner, mem_usage) {
            UsageLevel::Safe => {}
            UsageLevel::Warning => {
                tracing::warn!(
                    processor = %shared.name,
                    device = %record.device,
                    time = record.time,
                    total = %bytes_to_string(shared.mem_controller.total_usage()),
                    "memory usage above warning threshold"
                );
            }
            UsageLevel::Dangerous => {
                tracing::warn!(
                    processor = %shared.name,
                    device = %record.device,
                    time = record.time,
                    total = %bytes_to_string(shared.mem_controller.total_usage()),
                    "memory usage dangerous, rejecting insert"
                );
                return Ok(false);
            }
        }

        // Step 3: WAL, then the work buffer
        if let Err(e) = self.append_work(record) {
            shared.mem_controller.report_free(shared.mem_owner, mem_usage);
            return Err(e);
        }

        shared.pending_values.fetch_add(1, Ordering::SeqCst);
        let buffered = shared.mem_size.fetch_add(mem_usage, Ordering::SeqCst) + mem_usage;

        // Step 4: Threshold check
        if buffered > self.memtable_threshold {
            tracing::info!(
                processor = %shared.name,
                buffered = %bytes_to_string(buffered),
                threshold = %bytes_to_string(self.memtable_threshold),
                "memtable threshold reached, flushing"
            );
            self.flush()?;
        }
        Ok(true)
    }

    /// Parse `raw` as `data_type` and insert it as a single-point record
    pub fn insert_value(
        &self,
        device: &str,
        measurement: &str,
        time: i64,
        data_type: DataType,
        raw: &str,
    ) -> Result<bool> {
        let value = Value::parse(data_type, raw)?;
        self.insert(&TsRecord::new(device, time).with_point(measurement, value))
    }

    /// Remove every buffered point of a series with `time <= timestamp`
    ///
    /// A running flush keeps the buffer it captured; the flush slot is
    /// replaced by a copy with the delete applied.
    pub fn delete(&self, device: &str, measurement: &str, timestamp: i64) -> Result<()> {
        self.ensure_open()?;

        if let Some(node) = &self.shared.log_node {
            node.write(Operation::Delete {
                device: device.to_string(),
                measurement: measurement.to_string(),
                time: timestamp,
            })?;
        }

        let mut buffers = self.shared.buffers.write();
        let removed = buffers.work.delete(device, measurement, timestamp);
        let mut removed_flushing = 0;
        if let Some(flushing) = &buffers.flush {
            let mut copy = flushing.copy();
            removed_flushing = copy.delete(device, measurement, timestamp);
            buffers.flush = Some(Arc::new(copy));
        }
        drop(buffers);

        tracing::debug!(
            processor = %self.shared.name,
            device,
            measurement,
            timestamp,
            removed,
            removed_flushing,
            "deleted buffered points"
        );
        Ok(())
    }

    // =========================================================================
    // Flush and Close
    // =========================================================================

    /// Start a flush generation
    ///
    /// Waits for the previous generation first. When nothing is pending the
    /// returned handle is already resolved to success.
    pub fn flush(&self) -> Result<FlushHandle> {
        self.ensure_open()?;
        self.start_flush()
    }

    /// Flush what is buffered, finalize the durable file and retire the WAL
    ///
    /// The processor is closed afterwards even when this returns an error.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(AtlasError::ProcessorClosed(self.shared.name.clone()));
        }
        let start = Instant::now();

        let result = self.close_inner();
        self.shared.mem_controller.deregister(self.shared.mem_owner);

        match &result {
            Ok(()) => tracing::info!(
                processor = %self.shared.name,
                file = %self.insert_file.display(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "closed processor"
            ),
            Err(e) => tracing::error!(
                processor = %self.shared.name,
                error = %e,
                "failed to close processor"
            ),
        }
        result.map_err(|e| AtlasError::Close {
            name: self.shared.name.clone(),
            reason: e.to_string(),
        })
    }

    fn close_inner(&self) -> Result<()> {
        // Step 1: Drain the buffers
        let flushed = self.start_flush()?.wait();
        if !flushed {
            tracing::warn!(
                processor = %self.shared.name,
                "final flush failed, finalizing file with what is durable"
            );
        }

        // Step 2: Seal the durable file
        self.shared.writer.finalize(&self.schema)?;

        // Step 3: Owner hooks
        (self.shared.callbacks.after_close)()?;
        (self.shared.callbacks.after_flush)()?;

        // Step 4: Publish the closed file
        self.resources
            .write()
            .push(TsFileResource::new(self.insert_file.clone(), true));

        // Step 5: Retire the WAL, unless it still holds unflushed data
        if let Some(node) = &self.shared.log_node {
            if flushed {
                node.discard_all()?;
            } else {
                tracing::warn!(
                    processor = %self.shared.name,
                    node = node.name(),
                    "keeping WAL segments of failed flush"
                );
            }
        }
        Ok(())
    }

    /// One flush generation; callers check the closed flag
    fn start_flush(&self) -> Result<FlushHandle> {
        let _guard = self.flush_lock.lock();
        let shared = &self.shared;

        let now = now_nanos();
        let last = self.last_flush_time.swap(now, Ordering::SeqCst);
        if last >= 0 {
            tracing::info!(
                processor = %shared.name,
                interval_ms = (now - last) / 1_000_000,
                "flush requested"
            );
        } else {
            tracing::info!(processor = %shared.name, "first flush requested");
        }

        // Step 1: One generation at a time
        let previous = self.flush_handle.lock().clone();
        if !previous.wait() {
            tracing::debug!(processor = %shared.name, "previous flush generation failed");
        }

        // Step 2: Nothing to do
        if shared.pending_values.load(Ordering::SeqCst) == 0 {
            let handle = FlushHandle::ready(true);
            *self.flush_handle.lock() = handle.clone();
            return Ok(handle);
        }

        // Step 3: Owner veto
        if let Err(e) = (shared.callbacks.before_flush)() {
            tracing::error!(processor = %shared.name, error = %e, "before-flush action failed");
            return Err(e);
        }

        // Step 4: Data written from here on belongs to the next generation
        if let Some(node) = &shared.log_node {
            node.notify_flush_start()?;
        }
        shared.pending_values.store(0, Ordering::SeqCst);

        // Step 5: Swap
        let captured = {
            let mut buffers = shared.buffers.write();
            if buffers.flush.is_none() {
                let frozen = std::mem::take(&mut buffers.work);
                buffers.flush = Some(Arc::new(frozen));
            }
            buffers.flush.clone()
        };
        let Some(captured) = captured else {
            return Err(AtlasError::Storage("flush slot empty after swap".into()));
        };

        // Step 6: Version, then memory release
        let minted = self.version_controller.next_version();
        let generation_bytes = shared.mem_size.swap(0, Ordering::SeqCst);
        shared.mem_controller.report_free(shared.mem_owner, generation_bytes);

        let version = match minted {
            Ok(version) => version,
            Err(e) => {
                tracing::error!(processor = %shared.name, error = %e, "cannot mint flush version");
                if let Some(node) = &shared.log_node {
                    let _ = node.notify_flush_end(Some(&e));
                }
                shared.finish_generation(false, false, generation_bytes);
                let handle = FlushHandle::ready(false);
                *self.flush_handle.lock() = handle.clone();
                return Err(e);
            }
        };

        tracing::info!(
            processor = %shared.name,
            version,
            points = captured.point_count(),
            series = captured.series_count(),
            bytes = %bytes_to_string(generation_bytes),
            "submitting flush"
        );

        // Step 7: Hand off
        let task_shared = Arc::clone(shared);
        let handle = self.flush_pool.submit(move || {
            task::run_flush(task_shared, captured, version, generation_bytes)
        });
        *self.flush_handle.lock() = handle.clone();
        Ok(handle)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Buffered points of one series plus the durable chunks already visible
    ///
    /// The view merges the flush buffer then the work buffer; on equal
    /// timestamps the work buffer wins.
    pub fn query_buffer_data(
        &self,
        device: &str,
        measurement: &str,
        data_type: DataType,
    ) -> (SeriesView, Vec<ChunkMetadata>) {
        let buffers = self.shared.buffers.read();

        let mut view = SeriesView::new(data_type);
        if let Some(flushing) = &buffers.flush {
            if let Some(series) = flushing.query(device, measurement, data_type) {
                view.add_source(series);
            }
        }
        if let Some(series) = buffers.work.query(device, measurement, data_type) {
            view.add_source(series);
        }
        let metadata = self
            .shared
            .writer
            .chunk_metadata(device, measurement, data_type);

        (view, metadata)
    }

    /// True while a flush generation owns the flush slot
    pub fn is_flushing(&self) -> bool {
        self.shared.buffers.read().flush.is_some()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn insert_file_path(&self) -> &Path {
        &self.insert_file
    }

    pub fn log_node(&self) -> Option<&Arc<WriteLogNode>> {
        self.shared.log_node.as_ref()
    }

    /// Nanoseconds since the epoch of the last flush request, -1 if none
    pub fn last_flush_time(&self) -> i64 {
        self.last_flush_time.load(Ordering::SeqCst)
    }

    pub fn flush_handle(&self) -> FlushHandle {
        self.flush_handle.lock().clone()
    }

    pub fn failed_flush_count(&self) -> u64 {
        self.shared.failed_flushes.load(Ordering::SeqCst)
    }

    /// Bytes buffered since the last swap
    pub fn memory_usage(&self) -> u64 {
        self.shared.mem_size.load(Ordering::SeqCst)
    }

    /// Records admitted since the last swap
    pub fn pending_values(&self) -> u64 {
        self.shared.pending_values.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn resources(&self) -> &ResourceList {
        &self.resources
    }

    pub fn schema(&self) -> &FileSchema {
        &self.schema
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AtlasError::ProcessorClosed(self.shared.name.clone()));
        }
        Ok(())
    }

    fn append_work(&self, record: &TsRecord) -> Result<()> {
        if let Some(node) = &self.shared.log_node {
            node.write(Operation::Insert(record.clone()))?;
        }
        self.shared.buffers.write().work.write_record(record)
    }

    /// Rebuild the work buffer from WAL entries left by a previous run
    fn replay_log(&self, node: &WriteLogNode) -> Result<()> {
        let entries = node.replay_entries()?;
        if entries.is_empty() {
            return Ok(());
        }

        let shared = &self.shared;
        let mut inserts = 0u64;
        let mut deletes = 0u64;
        let mut buffers = shared.buffers.write();
        for entry in entries {
            match entry.operation {
                Operation::Insert(record) => {
                    if let Err(e) = buffers.work.write_record(&record) {
                        tracing::warn!(lsn = entry.lsn, error = %e, "skipping WAL insert");
                        continue;
                    }
                    let mem_usage = record.mem_size();
                    let level = shared.mem_controller.report_use(shared.mem_owner, mem_usage);
                    if level != UsageLevel::Dangerous {
                        shared.mem_size.fetch_add(mem_usage, Ordering::SeqCst);
                    }
                    shared.pending_values.fetch_add(1, Ordering::SeqCst);
                    inserts += 1;
                }
                Operation::Delete {
                    device,
                    measurement,
                    time,
                } => {
                    buffers.work.delete(&device, &measurement, time);
                    deletes += 1;
                }
            }
        }
        drop(buffers);

        tracing::info!(
            processor = %shared.name,
            inserts,
            deletes,
            "replayed WAL into work buffer"
        );
        Ok(())
    }
}

impl Drop for BufferWriteProcessor {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            // The task touches the accountant in its finalizer
            let handle = self.flush_handle.lock().clone();
            handle.wait();
            self.shared.mem_controller.deregister(self.shared.mem_owner);
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
