//! Flush worker pool

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender, TrySendError};

use crate::error::{AtlasError, Result};

use super::FlushHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of flush workers fed by a bounded queue
///
/// Dropping the pool closes the queue; workers drain what is queued and
/// exit, and the drop joins them.
pub struct FlushPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl FlushPool {
    /// Spawn `workers` threads behind a queue of `queue_capacity` tasks
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            return Err(AtlasError::Config(format!(
                "flush pool needs workers > 0 and capacity > 0, got {} and {}",
                workers, queue_capacity
            )));
        }

        let (sender, receiver) = channel::bounded::<Job>(queue_capacity);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("atlasts-flush-{}", id))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                    tracing::debug!(worker = id, "flush worker exiting");
                })?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Queue a task; the handle resolves with the task's result
    ///
    /// A panicking task resolves its handle to `false`.
    pub fn submit<F>(&self, task: F) -> FlushHandle
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let handle = FlushHandle::pending();
        let completion = handle.clone();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|_| {
                tracing::error!("flush task panicked");
                false
            });
            completion.complete(result);
        });

        let Some(sender) = self.sender.as_ref() else {
            handle.complete(false);
            return handle;
        };

        let sent = match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                tracing::warn!("flush queue full, waiting for a free slot");
                sender.send(job).map_err(|_| ())
            }
            Err(TrySendError::Disconnected(_)) => Err(()),
        };
        if sent.is_err() {
            tracing::error!("flush pool is shut down, task rejected");
            handle.complete(false);
        }
        handle
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }
}

impl Drop for FlushPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("flush worker panicked during shutdown");
            }
        }
    }
}
