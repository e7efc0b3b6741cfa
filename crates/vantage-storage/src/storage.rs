//! Storage facade: one serialized task per feature.
//!
//! All filesystem access for a feature funnels through a single tokio task,
//! so producer writes, upload reads and consent migrations never interleave
//! mid-operation on one file. Producers enqueue writes and return
//! immediately; the upload worker awaits request/response commands over the
//! same channel.
//!
//! No cross-process locking is provided: if the host application shares the
//! storage root between processes (e.g. an app extension), behavior is
//! undefined.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vantage_core::{Clock, ConsentProvider, DataEncryption, Event, Telemetry, TrackingConsent};

use crate::error::StorageResult;
use crate::file::Directory;
use crate::migrator::{migrator_for_consent_change, wipe_legacy_directory};
use crate::orchestrator::{FilesOrchestrator, RemovalReason, StoragePerformance};
use crate::reader::{Batch, FileReader};
use crate::writer::FileWriter;

/// On-disk layout version; bumped when the file format changes.
const STORAGE_VERSION: &str = "v2";
/// Layout version used by deprecated SDK releases, wiped on init.
const LEGACY_STORAGE_VERSION: &str = "v1";

/// The pair of consent-partitioned directories for one feature.
#[derive(Debug, Clone)]
pub struct FeatureDirectories {
    /// Holds batches written while consent is pending.
    pub unauthorized: Directory,
    /// Holds batches eligible for upload.
    pub authorized: Directory,
}

impl FeatureDirectories {
    /// Creates `<root>/<feature>/v2/{unauthorized,authorized}` and deletes
    /// any deprecated `v1` directory left by older SDK versions.
    pub fn create(root: &Path, feature: &str) -> StorageResult<Self> {
        let feature_root = root.join(feature);
        wipe_legacy_directory(&Directory::at(feature_root.join(LEGACY_STORAGE_VERSION)));

        let versioned = feature_root.join(STORAGE_VERSION);
        Ok(Self {
            unauthorized: Directory::create(versioned.join("unauthorized"))?,
            authorized: Directory::create(versioned.join("authorized"))?,
        })
    }
}

/// Storage tuning for one feature.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Size/age/count policy applied to both directories.
    pub performance: StoragePerformance,
    /// When set, every event is recorded in its own file.
    pub force_new_file: bool,
    /// Track name for batch metrics, or `None` to skip them.
    pub track_name: Option<String>,
}

enum Command {
    Write(Event),
    ConsentChanged {
        old: TrackingConsent,
        new: TrackingConsent,
    },
    ReadNextBatch {
        reply: oneshot::Sender<Option<Batch>>,
    },
    ReadFlushableBatch {
        reply: oneshot::Sender<Option<Batch>>,
    },
    MarkBatchAsRead {
        batch: Batch,
        reason: RemovalReason,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the serialized storage task of one feature.
pub struct Storage {
    commands: mpsc::UnboundedSender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Storage {
    /// Spawns the storage task and wires it to consent transitions.
    pub fn spawn(
        directories: FeatureDirectories,
        config: StorageConfig,
        clock: Arc<dyn Clock>,
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
        consent: &ConsentProvider,
    ) -> Arc<Self> {
        let unauthorized_orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            directories.unauthorized.clone(),
            config.performance.clone(),
            Arc::clone(&clock),
            Arc::clone(&telemetry),
            None,
        )));
        let authorized_orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            directories.authorized.clone(),
            config.performance.clone(),
            Arc::clone(&clock),
            Arc::clone(&telemetry),
            config.track_name.clone(),
        )));

        let unauthorized_writer = FileWriter::new(
            Arc::clone(&unauthorized_orchestrator),
            encryption.clone(),
            Arc::clone(&telemetry),
            config.force_new_file,
        );
        let authorized_writer = FileWriter::new(
            Arc::clone(&authorized_orchestrator),
            encryption.clone(),
            Arc::clone(&telemetry),
            config.force_new_file,
        );
        let reader = FileReader::new(
            Arc::clone(&authorized_orchestrator),
            encryption,
            Arc::clone(&telemetry),
        );

        let (commands, inbox) = mpsc::unbounded_channel();

        let consent_commands = commands.clone();
        consent.subscribe(Box::new(move |old, new| {
            let _ = consent_commands.send(Command::ConsentChanged { old, new });
        }));

        let worker = StorageWorker {
            inbox,
            consent: consent.current(),
            unauthorized_writer,
            authorized_writer,
            reader,
            directories,
            telemetry,
        };
        let task = tokio::spawn(worker.run());

        Arc::new(Self {
            commands,
            task: Mutex::new(Some(task)),
        })
    }

    /// Enqueues an event write and returns immediately.
    ///
    /// The event is routed by the consent in force when the command is
    /// processed: pending data is quarantined, granted data becomes upload
    /// eligible and not-granted data is dropped.
    pub fn write(&self, event: Event) {
        if self.commands.send(Command::Write(event)).is_err() {
            warn!("storage task is stopped; dropping event");
        }
    }

    /// Returns the next unread batch of authorized data, if any.
    pub async fn read_next_batch(&self) -> Option<Batch> {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::ReadNextBatch { reply })
            .is_err()
        {
            return None;
        }
        response.await.unwrap_or(None)
    }

    /// Returns the next unread batch of authorized data without waiting out
    /// the minimum read age, if any.
    ///
    /// Meant for draining storage at shutdown, where files whose write
    /// window is still open must not be left behind.
    pub async fn read_flushable_batch(&self) -> Option<Batch> {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::ReadFlushableBatch { reply })
            .is_err()
        {
            return None;
        }
        response.await.unwrap_or(None)
    }

    /// Deletes the batch's source file and records it as served.
    pub async fn mark_batch_as_read(&self, batch: Batch, reason: RemovalReason) {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(Command::MarkBatchAsRead {
                batch,
                reason,
                reply,
            })
            .is_err()
        {
            return;
        }
        let _ = response.await;
    }

    /// Stops the storage task after the commands already enqueued are
    /// processed. Unread files stay on disk.
    pub async fn stop(&self) {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Stop { reply }).is_ok() {
            let _ = response.await;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

struct StorageWorker {
    inbox: mpsc::UnboundedReceiver<Command>,
    consent: TrackingConsent,
    unauthorized_writer: FileWriter,
    authorized_writer: FileWriter,
    reader: FileReader,
    directories: FeatureDirectories,
    telemetry: Arc<dyn Telemetry>,
}

impl StorageWorker {
    async fn run(mut self) {
        while let Some(command) = self.inbox.recv().await {
            match command {
                Command::Write(event) => self.handle_write(&event),
                Command::ConsentChanged { old, new } => self.handle_consent_change(old, new),
                Command::ReadNextBatch { reply } => {
                    let _ = reply.send(self.reader.read_next_batch());
                }
                Command::ReadFlushableBatch { reply } => {
                    let _ = reply.send(self.reader.read_flushable_batch());
                }
                Command::MarkBatchAsRead {
                    batch,
                    reason,
                    reply,
                } => {
                    self.reader.mark_batch_as_read(&batch, reason);
                    let _ = reply.send(());
                }
                Command::Stop { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }
        debug!("storage task stopped");
    }

    fn handle_write(&self, event: &Event) {
        match self.consent {
            TrackingConsent::Pending => self.unauthorized_writer.write(event),
            TrackingConsent::Granted => self.authorized_writer.write(event),
            TrackingConsent::NotGranted => {
                debug!("consent not granted; dropping event");
            }
        }
    }

    fn handle_consent_change(&mut self, old: TrackingConsent, new: TrackingConsent) {
        self.consent = new;
        if let Some(migrator) = migrator_for_consent_change(
            old,
            new,
            &self.directories.unauthorized,
            &self.directories.authorized,
            &self.telemetry,
        ) {
            migrator.migrate();
        }
    }
}
