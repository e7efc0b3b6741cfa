//! Error types for the storage subsystem.

use thiserror::Error;

use vantage_core::CryptoError;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write exceeds the policy limit for a single object.
    #[error("Insufficient space: write of {requested} bytes exceeds limit of {limit} bytes")]
    InsufficientSpace {
        /// Size of the rejected write in bytes.
        requested: u64,
        /// Policy limit in bytes.
        limit: u64,
    },

    /// The event payload could not be encoded into a data block.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Wraps encryption capability errors.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The requested file does not exist in the directory.
    #[error("File not found: {name}")]
    FileNotFound {
        /// Name of the missing file.
        name: String,
    },
}
