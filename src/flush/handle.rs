//! Flush completion handle

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Completion handle of one submitted flush task
///
/// Cloning shares the same completion slot. The boolean result says whether
/// the task succeeded; a resolved handle only means the generation finished.
#[derive(Clone)]
pub struct FlushHandle {
    slot: Arc<Slot>,
}

struct Slot {
    result: Mutex<Option<bool>>,
    done: Condvar,
}

impl FlushHandle {
    /// Unresolved handle, completed later through [`FlushHandle::complete`]
    pub(crate) fn pending() -> Self {
        Self {
            slot: Arc::new(Slot {
                result: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// Handle that is already resolved
    pub fn ready(result: bool) -> Self {
        let handle = Self::pending();
        handle.complete(result);
        handle
    }

    pub(crate) fn complete(&self, result: bool) {
        let mut slot = self.slot.result.lock();
        if slot.is_none() {
            *slot = Some(result);
            self.slot.done.notify_all();
        }
    }

    /// Block until the task finished and return its result
    pub fn wait(&self) -> bool {
        let mut slot = self.slot.result.lock();
        loop {
            if let Some(result) = *slot {
                return result;
            }
            self.slot.done.wait(&mut slot);
        }
    }

    pub fn is_done(&self) -> bool {
        self.slot.result.lock().is_some()
    }

    /// Result if resolved, without blocking
    pub fn result(&self) -> Option<bool> {
        *self.slot.result.lock()
    }
}

impl std::fmt::Debug for FlushHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushHandle")
            .field("result", &self.result())
            .finish()
    }
}
