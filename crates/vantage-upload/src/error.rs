//! Error types for the upload subsystem.

use thiserror::Error;

/// Result type alias for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error variants for upload operations.
///
/// Transport-level outcomes (HTTP status codes, network timeouts) are not
/// errors here; they are classified into [`crate::UploadStatus`] so the
/// worker can decide between retry and drop. `UploadError` covers only
/// failures to form or initiate a request, which are terminal for the batch.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload request could not be constructed for this batch.
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),

    /// The HTTP client could not be initialized.
    #[error("Upload client error: {0}")]
    Client(String),
}
