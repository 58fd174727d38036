//! Error types for MPDB

use thiserror::Error;

/// Result type alias for MPDB operations
pub type Result<T> = std::result::Result<T, MpdbError>;

/// Main error type shared across MPDB crates
#[derive(Error, Debug)]
pub enum MpdbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
