//! Flush Module
//!
//! Bounded worker pool that runs flush tasks off the caller's thread.
//!
//! ## Responsibilities
//! - Fixed number of worker threads shared by every processor of a node
//! - Bounded task queue (crossbeam channel)
//! - Completion handles with blocking `wait()` and non-blocking `is_done()`

mod handle;
mod pool;

pub use handle::FlushHandle;
pub use pool::FlushPool;
