//! Consent-driven data migration between storage directories.
//!
//! Two composable strategies cover the whole lifecycle: delete everything in
//! a directory, or move everything into another directory. Migration runs in
//! response to consent transitions and must never crash startup or block
//! subsequent writes, so every strategy swallows its own IO errors into
//! telemetry.

use std::sync::Arc;

use tracing::{debug, warn};

use vantage_core::{Telemetry, TrackingConsent};

use crate::file::Directory;

/// A migration step over one or two directories.
pub trait DataMigrator: Send {
    /// Runs the migration. Errors are reported to telemetry, never returned.
    fn migrate(&self);
}

/// Deletes all files in a directory.
pub struct DeleteAllFiles {
    directory: Directory,
    telemetry: Arc<dyn Telemetry>,
}

impl DeleteAllFiles {
    /// Creates the strategy for the given directory.
    pub fn new(directory: Directory, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            directory,
            telemetry,
        }
    }
}

impl DataMigrator for DeleteAllFiles {
    fn migrate(&self) {
        match self.directory.delete_all_files() {
            Ok(deleted) => {
                debug!(
                    directory = %self.directory.path().display(),
                    deleted = deleted,
                    "deleted all files"
                );
            }
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to delete unauthorized data: {e}"));
            }
        }
    }
}

/// Moves all files from one directory into another.
pub struct MoveAllFiles {
    source: Directory,
    destination: Directory,
    telemetry: Arc<dyn Telemetry>,
}

impl MoveAllFiles {
    /// Creates the strategy for the given source and destination.
    pub fn new(source: Directory, destination: Directory, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            source,
            destination,
            telemetry,
        }
    }
}

impl DataMigrator for MoveAllFiles {
    fn migrate(&self) {
        match self.source.move_all_files_to(&self.destination) {
            Ok(moved) => {
                debug!(
                    source = %self.source.path().display(),
                    destination = %self.destination.path().display(),
                    moved = moved,
                    "moved all files"
                );
            }
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to move unauthorized data: {e}"));
            }
        }
    }
}

/// Resolves the migration for a consent transition, or `None` for a no-op.
///
/// `pending → granted` authorizes quarantined data; `pending → notGranted`
/// discards it. Once consent left `pending`, past data is never moved again.
pub fn migrator_for_consent_change(
    old: TrackingConsent,
    new: TrackingConsent,
    unauthorized: &Directory,
    authorized: &Directory,
    telemetry: &Arc<dyn Telemetry>,
) -> Option<Box<dyn DataMigrator>> {
    match (old, new) {
        (TrackingConsent::Pending, TrackingConsent::Granted) => Some(Box::new(MoveAllFiles::new(
            unauthorized.clone(),
            authorized.clone(),
            Arc::clone(telemetry),
        ))),
        (TrackingConsent::Pending, TrackingConsent::NotGranted) => Some(Box::new(
            DeleteAllFiles::new(unauthorized.clone(), Arc::clone(telemetry)),
        )),
        _ => None,
    }
}

/// Unconditionally removes a deprecated storage directory left by older SDK
/// versions. Runs once on init; failure is logged and ignored.
pub fn wipe_legacy_directory(directory: &Directory) {
    if !directory.exists() {
        return;
    }
    if let Err(e) = directory.delete() {
        warn!(
            directory = %directory.path().display(),
            error = %e,
            "failed to delete legacy data directory"
        );
    }
}
