//! Write-Ahead Log
//!
//! Every insert and delete reaches a processor's log node before it touches
//! a memtable, so buffered points survive a crash until a flush makes them
//! durable.
//!
//! ## Layout
//! ```text
//! {data_dir}/wal/{processor}-bufferwrite/
//!     wal-000001.log   sealed: belongs to a flush generation
//!     wal-000002.log   live: receives new entries
//!
//! entry frame: [lsn u64][crc u32][len u32][bincode(WalEntry)]
//! ```
//! LSNs increase across segments. The CRC covers the payload only; a torn
//! or corrupt frame ends the readable part of a segment.

mod entry;
mod manager;
mod node;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry, HEADER_SIZE};
pub use manager::WalManager;
pub use node::WriteLogNode;
pub use reader::{WalIterator, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
