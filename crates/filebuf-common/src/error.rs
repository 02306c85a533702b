//! Error types for filebuf.

use thiserror::Error;

/// Result type alias using FileBufError.
pub type Result<T> = std::result::Result<T, FileBufError>;

/// Errors that can occur in filebuf operations.
#[derive(Debug, Error)]
pub enum FileBufError {
    // Request validation errors
    #[error("Negative offset: {offset}")]
    InvalidOffset { offset: i64 },

    #[error("Offset and length out of bounds: offset {offset}, length {length}, file size {file_size}")]
    OutOfBounds {
        offset: i64,
        length: u64,
        file_size: u64,
    },

    // Backing store errors
    #[error("Backing store I/O failed at offset {offset} after {transferred} bytes: {source}")]
    BackingStore {
        offset: u64,
        transferred: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

impl FileBufError {
    /// Returns the number of bytes moved before a backing store failure.
    ///
    /// Validation and configuration errors never transfer anything.
    pub fn transferred(&self) -> usize {
        match self {
            FileBufError::BackingStore { transferred, .. } => *transferred,
            _ => 0,
        }
    }

    /// Returns true if the request was rejected before any I/O happened.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FileBufError::InvalidOffset { .. } | FileBufError::OutOfBounds { .. }
        )
    }
}
