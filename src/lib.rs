//! # AtlasTS
//!
//! A time-series buffer-write engine with:
//! - Copy-on-write in-memory buffers (work + flush) per storage group
//! - Asynchronous flushing on a bounded worker pool
//! - Write-Ahead Logging (WAL) with flush-boundary segments
//! - Tiered memory admission (safe / warning / dangerous)
//! - Merged point-in-time reads across both buffers and durable chunks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  BufferWriteProcessor                        │
//! │        insert / delete / flush / close / query               │
//! └──────┬──────────────────┬──────────────────────┬────────────┘
//!        │                  │                      │
//!        ▼                  ▼                      ▼
//! ┌─────────────┐   ┌───────────────┐      ┌──────────────┐
//! │ MemController│   │ WriteLogNode  │      │  MemTables   │
//! │ (admission) │   │    (WAL)      │      │ work │ flush │
//! └─────────────┘   └───────────────┘      └──────┬───────┘
//!                                                 │ swap
//!                                                 ▼
//!                                         ┌──────────────┐
//!                                         │  FlushPool   │
//!                                         │  (workers)   │
//!                                         └──────┬───────┘
//!                                                │
//!                                                ▼
//!                                         ┌──────────────┐
//!                                         │ TsFileWriter │
//!                                         │  (durable)   │
//!                                         └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod record;

pub mod memtable;
pub mod memory;
pub mod version;
pub mod flush;
pub mod storage;
pub mod wal;
pub mod context;
pub mod processor;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::{Config, FlushFailurePolicy, WalSyncStrategy};
pub use context::StorageContext;
pub use flush::{FlushHandle, FlushPool};
pub use memtable::{MemTable, SeriesView};
pub use processor::{BufferWriteProcessor, Callbacks, ProcessorBuilder};
pub use record::{DataPoint, DataType, TimeValuePair, TsRecord, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasTS
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
