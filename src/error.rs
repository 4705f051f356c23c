//! Error types for AtlasTS
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::record::DataType;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasTS operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cannot parse {value:?} as {data_type:?}")]
    InvalidValue { data_type: DataType, value: String },

    #[error("Series {series} is {existing:?}, cannot write {requested:?}")]
    TypeMismatch {
        series: String,
        existing: DataType,
        requested: DataType,
    },

    // -------------------------------------------------------------------------
    // Processor Errors
    // -------------------------------------------------------------------------
    #[error("Callback {name} failed: {reason}")]
    Callback { name: &'static str, reason: String },

    #[error("Cannot create processor {name}: {reason}")]
    Construction { name: String, reason: String },

    #[error("Processor {0} is closed")]
    ProcessorClosed(String),

    #[error("Failed to close processor {name}: {reason}")]
    Close { name: String, reason: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for AtlasError {
    fn from(e: bincode::Error) -> Self {
        AtlasError::Serialization(e.to_string())
    }
}

impl AtlasError {
    /// Build a callback failure from any displayable reason
    pub fn callback(name: &'static str, reason: impl ToString) -> Self {
        AtlasError::Callback {
            name,
            reason: reason.to_string(),
        }
    }
}
