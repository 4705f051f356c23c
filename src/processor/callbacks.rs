//! Callbacks supplied by the owner of a processor

use crate::error::Result;

/// Zero-argument, side-effecting, fallible hook
pub type Action = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Hooks a processor calls around flushes and close
///
/// - `before_flush`: must succeed before a flush generation starts
/// - `after_flush`: after a generation's durable append, and once more at close
/// - `after_close`: once, after the durable file is finalized
pub struct Callbacks {
    pub(crate) before_flush: Action,
    pub(crate) after_flush: Action,
    pub(crate) after_close: Action,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            before_flush: Box::new(|| Ok(())),
            after_flush: Box::new(|| Ok(())),
            after_close: Box::new(|| Ok(())),
        }
    }
}

impl Callbacks {
    /// No-op callbacks
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_flush<F>(mut self, action: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.before_flush = Box::new(action);
        self
    }

    pub fn after_flush<F>(mut self, action: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.after_flush = Box::new(action);
        self
    }

    pub fn after_close<F>(mut self, action: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.after_close = Box::new(action);
        self
    }
}
