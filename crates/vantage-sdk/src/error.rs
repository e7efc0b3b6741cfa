//! Error types for SDK initialization and feature registration.

use thiserror::Error;

use vantage_storage::StorageError;
use vantage_upload::UploadError;

/// Result type alias for SDK operations.
pub type SdkResult<T> = Result<T, SdkError>;

/// Error variants for SDK operations.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Storage could not be initialized for a feature.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The upload transport could not be initialized.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A feature with this name is already registered.
    #[error("Feature already registered: {name}")]
    DuplicateFeature {
        /// The conflicting feature name.
        name: String,
    },
}
