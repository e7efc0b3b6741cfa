//! Background worker that drains storage into the intake endpoint.
//!
//! Each cycle pulls up to a bounded number of batches from storage. A batch
//! with a terminal outcome (accepted, or permanently rejected by the server)
//! is deleted; the first retryable failure ends the cycle and leaves the
//! batch on disk. The delay until the next cycle resets to its minimum after
//! a cycle that delivered data and grows after a failed or idle one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use vantage_core::Telemetry;
use vantage_storage::{Batch, RemovalReason, Storage};

use crate::delay::{UploadDelay, UploadPerformance};
use crate::request::RequestBuilder;
use crate::uploader::DataUploader;

/// Upload worker tuning for one feature.
#[derive(Debug, Clone)]
pub struct UploadWorkerConfig {
    /// Cycle cadence bounds and adjustment rate.
    pub performance: UploadPerformance,
    /// Upper bound on batches uploaded within one cycle.
    pub max_batches_per_upload: usize,
}

impl Default for UploadWorkerConfig {
    fn default() -> Self {
        Self {
            performance: UploadPerformance::default(),
            max_batches_per_upload: 10,
        }
    }
}

/// Outcome of one upload cycle, used to steer the delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// At least one batch was delivered and none failed.
    Delivered,
    /// An attempt failed with a retryable status or transport error.
    Failed,
    /// No batch was eligible for upload.
    Idle,
}

/// Handle to the background upload task of one feature.
pub struct UploadWorker {
    storage: Arc<Storage>,
    uploader: Arc<dyn DataUploader>,
    request_builder: RequestBuilder,
    telemetry: Arc<dyn Telemetry>,
    config: UploadWorkerConfig,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UploadWorker {
    /// Spawns the periodic upload task.
    pub fn spawn(
        storage: Arc<Storage>,
        uploader: Arc<dyn DataUploader>,
        request_builder: RequestBuilder,
        telemetry: Arc<dyn Telemetry>,
        config: UploadWorkerConfig,
    ) -> Arc<Self> {
        let (shutdown, mut stopped) = watch::channel(false);

        let worker = Arc::new(Self {
            storage,
            uploader,
            request_builder,
            telemetry,
            config,
            shutdown,
            task: Mutex::new(None),
        });

        let runner = Arc::clone(&worker);
        let task = tokio::spawn(async move {
            let mut delay = UploadDelay::new(runner.config.performance.clone());
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay.current()) => {}
                    _ = stopped.changed() => break,
                }
                match runner.upload_cycle().await {
                    CycleOutcome::Delivered => delay.reset_to_minimum(),
                    CycleOutcome::Failed | CycleOutcome::Idle => delay.increase(),
                }
            }
            debug!("upload task stopped");
        });
        *worker.task.lock() = Some(task);

        worker
    }

    /// Uploads up to `max_batches_per_upload` batches.
    ///
    /// Terminal outcomes delete the batch; the first retryable failure ends
    /// the cycle with the batch still on disk, to be offered again later.
    async fn upload_cycle(&self) -> CycleOutcome {
        let mut delivered = false;
        for _ in 0..self.config.max_batches_per_upload {
            let Some(batch) = self.storage.read_next_batch().await else {
                break;
            };
            match self.upload_batch(batch).await {
                BatchOutcome::Delivered => delivered = true,
                BatchOutcome::Dropped => {}
                BatchOutcome::Retry => return CycleOutcome::Failed,
            }
        }
        if delivered {
            CycleOutcome::Delivered
        } else {
            CycleOutcome::Idle
        }
    }

    async fn upload_batch(&self, batch: Batch) -> BatchOutcome {
        let events: Vec<_> = batch.events.iter().map(|e| e.data.clone()).collect();
        let request = match self.request_builder.build(&events) {
            Ok(request) => request,
            Err(e) => {
                // The batch can never form a valid request; keeping it
                // would wedge the queue behind it forever.
                self.telemetry
                    .error(&format!("Failed to build upload request: {e}"));
                self.storage
                    .mark_batch_as_read(batch, RemovalReason::Invalid)
                    .await;
                return BatchOutcome::Dropped;
            }
        };

        let status = match self.uploader.upload(&request).await {
            Ok(status) => status,
            Err(e) => {
                self.telemetry.error(&format!("Failed to upload batch: {e}"));
                self.storage
                    .mark_batch_as_read(batch, RemovalReason::Invalid)
                    .await;
                return BatchOutcome::Dropped;
            }
        };

        if status.needs_retry {
            debug!(
                file = batch.file_name(),
                status = %status,
                "batch upload failed; will retry"
            );
            return BatchOutcome::Retry;
        }

        if status.unauthorized() {
            warn!(status = %status, "client token rejected by intake");
        }
        let accepted = status.accepted();
        if !accepted {
            debug!(
                file = batch.file_name(),
                status = %status,
                "batch permanently rejected; dropping"
            );
        }
        let response_code = status.response_code.unwrap_or(0);
        self.storage
            .mark_batch_as_read(batch, RemovalReason::IntakeCode { response_code })
            .await;
        if accepted {
            BatchOutcome::Delivered
        } else {
            BatchOutcome::Dropped
        }
    }

    /// Attempts to deliver every remaining batch once, then deletes each
    /// regardless of outcome. Intended for orderly shutdown when the host
    /// will not run again soon.
    ///
    /// Reads through the flush path, so batches still inside their write
    /// window are drained too rather than left on disk.
    pub async fn flush(&self) {
        while let Some(batch) = self.storage.read_flushable_batch().await {
            let events: Vec<_> = batch.events.iter().map(|e| e.data.clone()).collect();
            if let Ok(request) = self.request_builder.build(&events) {
                if let Err(e) = self.uploader.upload(&request).await {
                    self.telemetry
                        .error(&format!("Failed to upload batch during flush: {e}"));
                }
            }
            self.storage
                .mark_batch_as_read(batch, RemovalReason::Flushed)
                .await;
        }
    }

    /// Stops the periodic task. Batches not yet uploaded stay on disk.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

enum BatchOutcome {
    Delivered,
    Dropped,
    Retry,
}
