//! Files orchestration: which file to write to, which file to read from.
//!
//! The orchestrator is the only component that creates, selects and deletes
//! batch files inside one directory. Writers and readers act exclusively
//! through its handles. File names encode their creation time in
//! milliseconds, which gives chronological ordering for oldest-first reads
//! and age-based eligibility without extra bookkeeping.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use vantage_core::{Clock, Telemetry};

use crate::error::{StorageError, StorageResult};
use crate::file::{Directory, File};

/// Converts a creation timestamp in milliseconds into a file name.
pub fn file_name_from_millis(millis: u64) -> String {
    millis.to_string()
}

/// Parses a file name back into its creation timestamp in milliseconds.
///
/// Returns `None` for names that were not produced by
/// [`file_name_from_millis`].
pub fn file_creation_millis(name: &str) -> Option<u64> {
    name.parse().ok()
}

/// Size, age and count limits governing batch files in one directory.
#[derive(Debug, Clone)]
pub struct StoragePerformance {
    /// Maximum size of a single batch file in bytes.
    pub max_file_size: u64,
    /// Maximum combined size of all files in the directory in bytes; the
    /// oldest files are evicted beyond this cap.
    pub max_dir_size: u64,
    /// A file older than this no longer accepts appends.
    pub max_file_age_for_write: Duration,
    /// A file younger than this is not yet offered for reading, letting
    /// in-flight writes finish first.
    pub min_file_age_for_read: Duration,
    /// A file older than this is considered obsolete and deleted unread.
    pub max_file_age_for_read: Duration,
    /// Maximum number of objects appended to a single file.
    pub max_objects_in_file: u64,
    /// Maximum size of a single written object in bytes.
    pub max_object_size: u64,
}

impl Default for StoragePerformance {
    fn default() -> Self {
        Self {
            max_file_size: 4 * 1024 * 1024,
            max_dir_size: 512 * 1024 * 1024,
            max_file_age_for_write: Duration::from_millis(4_750),
            min_file_age_for_read: Duration::from_millis(5_250),
            max_file_age_for_read: Duration::from_secs(18 * 60 * 60),
            max_objects_in_file: 500,
            max_object_size: 512 * 1024,
        }
    }
}

/// Why a batch file was removed from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The upload finished with a terminal intake response code.
    IntakeCode {
        /// The HTTP response code observed.
        response_code: u16,
    },
    /// The file exceeded the maximum read age before it was uploaded.
    Obsolete,
    /// The file was evicted to keep the directory under its size cap.
    Purged,
    /// The upload request could not be formed for this batch.
    Invalid,
    /// The file was drained by an explicit flush.
    Flushed,
}

impl RemovalReason {
    fn as_str(&self) -> String {
        match self {
            RemovalReason::IntakeCode { response_code } => {
                format!("intake-code-{response_code}")
            }
            RemovalReason::Obsolete => "obsolete".to_string(),
            RemovalReason::Purged => "purged".to_string(),
            RemovalReason::Invalid => "invalid".to_string(),
            RemovalReason::Flushed => "flushed".to_string(),
        }
    }

    /// Flush-driven removals are a test/teardown aid and skew batch metrics.
    fn include_in_metrics(&self) -> bool {
        !matches!(self, RemovalReason::Flushed)
    }
}

/// Name of the metric emitted when a writable file stops accepting appends.
pub const BATCH_CLOSED_METRIC: &str = "batch_closed";
/// Name of the metric emitted when a batch file is removed from disk.
pub const BATCH_DELETED_METRIC: &str = "batch_deleted";

/// Orchestrates batch files in a single directory.
pub struct FilesOrchestrator {
    directory: Directory,
    performance: StoragePerformance,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn Telemetry>,
    /// Track name included in batch metrics, or `None` to skip metrics.
    track_name: Option<String>,
    /// Name of the last file returned by `get_writable_file`.
    last_writable_file_name: Option<String>,
    /// Objects appended to the last writable file. Approximate: assumes
    /// appends succeed, which holds for all but a negligible fraction.
    last_writable_file_objects: u64,
    /// Accumulated write sizes for the last writable file, same caveat.
    last_writable_file_size: u64,
}

impl FilesOrchestrator {
    /// Creates an orchestrator over `directory`.
    pub fn new(
        directory: Directory,
        performance: StoragePerformance,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn Telemetry>,
        track_name: Option<String>,
    ) -> Self {
        Self {
            directory,
            performance,
            clock,
            telemetry,
            track_name,
            last_writable_file_name: None,
            last_writable_file_objects: 0,
            last_writable_file_size: 0,
        }
    }

    /// Returns the performance policy in force.
    pub fn performance(&self) -> &StoragePerformance {
        &self.performance
    }

    /// Returns the directory this orchestrator owns.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Returns a file accepting a write of `write_size` bytes, reusing the
    /// current writable file while it is fresh, under size and under its
    /// object budget, and rotating to a new file otherwise.
    pub fn get_writable_file(&mut self, write_size: u64) -> StorageResult<File> {
        self.validate(write_size)?;

        if let Some(file) = self.reuse_last_writable_file(write_size) {
            self.last_writable_file_objects += 1;
            self.last_writable_file_size += write_size;
            return Ok(file);
        }
        self.create_new_writable_file(write_size, false)
    }

    /// Always creates a new writable file, bypassing the reuse heuristic.
    ///
    /// Used when the caller requires write isolation, such as one event per
    /// file for crash fidelity.
    pub fn get_new_writable_file(&mut self, write_size: u64) -> StorageResult<File> {
        self.validate(write_size)?;
        self.create_new_writable_file(write_size, true)
    }

    /// Returns the oldest file eligible for reading, excluding the given
    /// names, or `None` if no file qualifies.
    ///
    /// Eligibility: file age within `[min_file_age_for_read,
    /// max_file_age_for_read]`. Files older than the upper bound are deleted
    /// as obsolete on the way. Errors are reported to telemetry and produce
    /// `None`.
    pub fn get_readable_file(&mut self, excluding: &HashSet<String>) -> Option<File> {
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to obtain readable file: {e}"));
                return None;
            }
        };

        let now = self.clock.now_millis();
        let mut candidates: Vec<(File, u64)> = Vec::new();
        for file in files {
            let Some(created) = file_creation_millis(file.name()) else {
                warn!(file = file.name(), "ignoring file with unparsable name");
                continue;
            };
            let age = Duration::from_millis(now.saturating_sub(created));
            if age > self.performance.max_file_age_for_read {
                self.delete(&file, RemovalReason::Obsolete);
                continue;
            }
            if excluding.contains(file.name()) {
                continue;
            }
            candidates.push((file, created));
        }

        let (oldest, created) = candidates.into_iter().min_by_key(|(_, created)| *created)?;
        let age = Duration::from_millis(now.saturating_sub(created));
        if age < self.performance.min_file_age_for_read {
            return None;
        }
        Some(oldest)
    }

    /// Returns the oldest file not in `excluding`, ignoring the read-age
    /// window.
    ///
    /// Used when draining storage at shutdown, where waiting out
    /// `min_file_age_for_read` would strand batches still settling.
    pub fn get_flushable_file(&mut self, excluding: &HashSet<String>) -> Option<File> {
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to obtain flushable file: {e}"));
                return None;
            }
        };

        files
            .into_iter()
            .filter(|file| !excluding.contains(file.name()))
            .filter_map(|file| {
                let created = file_creation_millis(file.name())?;
                Some((file, created))
            })
            .min_by_key(|(_, created)| *created)
            .map(|(file, _)| file)
    }

    /// Deletes a batch file, reporting the removal reason to telemetry.
    ///
    /// Deletion failures are swallowed into telemetry; deleting an
    /// already-deleted file is a no-op.
    pub fn delete(&mut self, file: &File, reason: RemovalReason) {
        if let Err(e) = file.delete() {
            self.telemetry
                .error(&format!("Failed to delete file: {e}"));
            return;
        }
        if self.last_writable_file_name.as_deref() == Some(file.name()) {
            // The writable file is gone; the next write must rotate.
            self.last_writable_file_name = None;
        }
        self.send_batch_deleted_metric(file.name(), reason);
    }

    fn validate(&self, write_size: u64) -> StorageResult<()> {
        if write_size > self.performance.max_object_size {
            return Err(StorageError::InsufficientSpace {
                requested: write_size,
                limit: self.performance.max_object_size,
            });
        }
        Ok(())
    }

    fn create_new_writable_file(&mut self, write_size: u64, forced_new: bool) -> StorageResult<File> {
        // Purging walks the whole directory, so do it only on rotation
        // rather than on every write.
        self.purge_directory_if_needed();

        if let Some(closed) = self.last_writable_file_name.take() {
            self.send_batch_closed_metric(&closed, forced_new);
        }

        // Two rotations within one millisecond would collide on the same
        // name; bump until it is free so no existing batch gets clobbered.
        let mut millis = self.clock.now_millis();
        let mut name = file_name_from_millis(millis);
        while self.directory.has_file(&name) {
            millis += 1;
            name = file_name_from_millis(millis);
        }
        let file = self.directory.create_file(&name)?;
        debug!(file = name.as_str(), "created new writable file");
        self.last_writable_file_name = Some(name);
        self.last_writable_file_objects = 1;
        self.last_writable_file_size = write_size;
        Ok(file)
    }

    fn reuse_last_writable_file(&self, write_size: u64) -> Option<File> {
        let name = self.last_writable_file_name.as_deref()?;
        if !self.directory.has_file(name) {
            // Expected when the last writable file was deleted meanwhile.
            return None;
        }

        let result: StorageResult<Option<File>> = (|| {
            let file = self.directory.file(name)?;
            let created = file_creation_millis(file.name()).unwrap_or(0);
            let age = Duration::from_millis(self.clock.now_millis().saturating_sub(created));

            let recent_enough = age <= self.performance.max_file_age_for_write;
            let has_room = file.size()? + write_size <= self.performance.max_file_size;
            let under_object_budget =
                self.last_writable_file_objects + 1 <= self.performance.max_objects_in_file;

            Ok((recent_enough && has_room && under_object_budget).then_some(file))
        })();

        match result {
            Ok(file) => file,
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to reuse last writable file: {e}"));
                None
            }
        }
    }

    /// Deletes oldest files until the directory fits its size cap again.
    fn purge_directory_if_needed(&mut self) {
        let result: StorageResult<()> = (|| {
            let mut files: Vec<(File, u64, u64)> = Vec::new();
            for file in self.directory.files()? {
                let created = file_creation_millis(file.name()).unwrap_or(0);
                let size = file.size()?;
                files.push((file, created, size));
            }
            files.sort_by_key(|(_, created, _)| *created);

            let total: u64 = files.iter().map(|(_, _, size)| size).sum();
            if total <= self.performance.max_dir_size {
                return Ok(());
            }

            let to_free = total - self.performance.max_dir_size;
            let mut freed = 0u64;
            for (file, _, size) in files {
                if freed >= to_free {
                    break;
                }
                warn!(file = file.name(), size = size, "evicting oldest file under storage pressure");
                self.delete(&file, RemovalReason::Purged);
                freed += size;
            }
            Ok(())
        })();

        if let Err(e) = result {
            self.telemetry
                .error(&format!("Failed to purge files directory: {e}"));
        }
    }

    fn send_batch_closed_metric(&self, file_name: &str, forced_new: bool) {
        let Some(track) = &self.track_name else {
            return;
        };
        let created = file_creation_millis(file_name).unwrap_or(0);
        let duration_ms = self.clock.now_millis().saturating_sub(created);
        self.telemetry.metric(
            BATCH_CLOSED_METRIC,
            json!({
                "track": track,
                "batch_size": self.last_writable_file_size,
                "batch_events_count": self.last_writable_file_objects,
                "batch_duration_ms": duration_ms,
                "forced_new": forced_new,
            }),
        );
    }

    fn send_batch_deleted_metric(&self, file_name: &str, reason: RemovalReason) {
        let Some(track) = &self.track_name else {
            return;
        };
        if !reason.include_in_metrics() {
            return;
        }
        let created = file_creation_millis(file_name).unwrap_or(0);
        let age_ms = self.clock.now_millis().saturating_sub(created);
        self.telemetry.metric(
            BATCH_DELETED_METRIC,
            json!({
                "track": track,
                "batch_age_ms": age_ms,
                "removal_reason": reason.as_str(),
            }),
        );
    }
}
