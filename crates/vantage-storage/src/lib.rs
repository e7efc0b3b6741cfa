#![warn(missing_docs)]

//! Vantage storage subsystem: the durable on-disk event queue.
//!
//! Events arrive as opaque byte payloads, are framed into length-prefixed
//! data blocks, and appended to batch files named after their creation time.
//! Files live in per-consent directories ("unauthorized" for pending consent,
//! "authorized" for granted) and are migrated or deleted when consent
//! resolves. The [`Storage`] actor serializes all filesystem access for one
//! feature so concurrent producers and the upload worker never race on a file.

pub mod block;
pub mod error;
pub mod file;
pub mod migrator;
pub mod orchestrator;
pub mod reader;
pub mod storage;
pub mod writer;

pub use block::{BlockReader, BlockType, DataBlock, BLOCK_HEADER_LENGTH};
pub use error::{StorageError, StorageResult};
pub use file::{Directory, File};
pub use migrator::{migrator_for_consent_change, DataMigrator, DeleteAllFiles, MoveAllFiles};
pub use orchestrator::{
    file_creation_millis, file_name_from_millis, FilesOrchestrator, RemovalReason,
    StoragePerformance,
};
pub use reader::{Batch, FileReader};
pub use storage::{FeatureDirectories, Storage, StorageConfig};
pub use writer::FileWriter;
