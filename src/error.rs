//! Error types for dawnkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using DawnError
pub type Result<T> = std::result::Result<T, DawnError>;

/// Unified error type for dawnkv operations
#[derive(Debug, Error)]
pub enum DawnError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    /// A complete frame whose contents do not check out.
    /// Trailing partial frames never produce this error.
    #[error("Log corruption at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("Invalid log header: {0}")]
    InvalidHeader(String),

    #[error("Record too large: {0} bytes")]
    RecordTooLarge(usize),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Database is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
