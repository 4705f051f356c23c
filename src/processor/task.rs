//! Flush task run on the worker pool

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::config::FlushFailurePolicy;
use crate::error::Result;
use crate::memory::{bytes_to_string, UsageLevel};
use crate::memtable::MemTable;

use super::Shared;

/// Runs `Shared::finish_generation` when dropped, panics included
struct GenerationGuard {
    shared: Arc<Shared>,
    succeeded: bool,
    /// The generation's points reached the durable file
    written: bool,
    bytes: u64,
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.shared
            .finish_generation(self.succeeded, self.written, self.bytes);
    }
}

/// Write one captured generation to the durable file
///
/// The flush slot is cleared before the pool resolves the handle.
pub(crate) fn run_flush(
    shared: Arc<Shared>,
    memtable: Arc<MemTable>,
    version: u64,
    bytes: u64,
) -> bool {
    let start = Instant::now();
    let mut guard = GenerationGuard {
        shared: Arc::clone(&shared),
        succeeded: false,
        written: false,
        bytes,
    };
    tracing::debug!(processor = %shared.name, version, "flush task started");

    let outcome = write_generation(&shared, &memtable, version, &mut guard.written);
    drop(memtable);

    if let Some(node) = &shared.log_node {
        if let Err(e) = node.notify_flush_end(outcome.as_ref().err()) {
            tracing::error!(processor = %shared.name, error = %e, "WAL flush-end notification failed");
        }
    }

    match &outcome {
        Ok(()) => tracing::info!(
            processor = %shared.name,
            version,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "flush finished"
        ),
        Err(e) => tracing::error!(
            processor = %shared.name,
            version,
            error = %e,
            "flush failed"
        ),
    }

    guard.succeeded = outcome.is_ok();
    outcome.is_ok()
}

fn write_generation(
    shared: &Shared,
    memtable: &MemTable,
    version: u64,
    written: &mut bool,
) -> Result<()> {
    if memtable.is_empty() {
        *written = true;
    } else {
        shared.writer.append_chunk_group(memtable, version)?;
        *written = true;
        shared.writer.write_restore_checkpoint()?;
    }
    (shared.callbacks.after_flush)()
}

impl Shared {
    /// Close a flush generation: clear the flush slot and publish metadata
    ///
    /// Both happen under the buffers lock so a query sees either the flush
    /// buffer or the chunks written from it. A failure after the chunks were
    /// written loses nothing, so neither policy applies to it.
    pub(crate) fn finish_generation(&self, succeeded: bool, written: bool, bytes: u64) {
        let mut buffers = self.buffers.write();

        if !succeeded {
            self.failed_flushes.fetch_add(1, Ordering::SeqCst);
        }

        if !succeeded && written {
            tracing::warn!(processor = %self.name, "flush failed after its chunks were written");
        }

        if !succeeded && !written {
            let lost = buffers.flush.as_ref().map(|m| m.point_count()).unwrap_or(0);

            match self.failure_policy {
                FlushFailurePolicy::Discard => {
                    tracing::warn!(processor = %self.name, points = lost, "discarding failed flush buffer");
                    if let Some(node) = &self.log_node {
                        node.retain_sealed();
                    }
                }
                FlushFailurePolicy::Restore => {
                    if let Some(failed) = buffers.flush.take() {
                        let restored = buffers.work.absorb_older(&failed);
                        self.pending_values
                            .fetch_add(restored as u64, Ordering::SeqCst);
                        let level = self.mem_controller.report_use(self.mem_owner, bytes);
                        if level == UsageLevel::Dangerous {
                            tracing::warn!(
                                processor = %self.name,
                                bytes = %bytes_to_string(bytes),
                                "restored buffer exceeds memory budget"
                            );
                        } else {
                            self.mem_size.fetch_add(bytes, Ordering::SeqCst);
                        }
                        tracing::warn!(processor = %self.name, points = restored, "restored failed flush buffer");
                    }
                }
            }
        }

        buffers.flush = None;
        self.writer.append_metadata();
    }
}
