//! End-to-end pipeline tests: write through the SDK handle, upload through a
//! scripted transport, and inspect what reaches the intake and what stays on
//! disk.
//!
//! Tests run with paused tokio time so upload cycles fire deterministically;
//! the storage clock is a separate mock so file age policies are driven
//! explicitly.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use vantage_core::{Event, MockClock, NopTelemetry, TrackingConsent};
use vantage_sdk::{CoreConfig, FeatureConfig, VantageCore};
use vantage_upload::{DataUploader, UploadRequest, UploadResult, UploadStatus};

/// Records request bodies and replays a script of statuses; accepts once the
/// script is exhausted.
struct RecordingUploader {
    script: Mutex<VecDeque<UploadStatus>>,
    bodies: Mutex<Vec<Vec<u8>>>,
}

impl RecordingUploader {
    fn new(script: impl IntoIterator<Item = UploadStatus>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            bodies: Mutex::new(Vec::new()),
        })
    }

    fn accepting() -> Arc<Self> {
        Self::new([])
    }

    fn bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.lock().clone()
    }
}

#[async_trait]
impl DataUploader for RecordingUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult<UploadStatus> {
        self.bodies.lock().push(request.body.clone());
        Ok(self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| UploadStatus::from_response_code(202)))
    }
}

fn core_with(
    root: &Path,
    consent: TrackingConsent,
    clock: Arc<MockClock>,
) -> VantageCore {
    let config = CoreConfig {
        initial_consent: consent,
        ..CoreConfig::new(root, "key")
    };
    VantageCore::with_components(config, clock, None, Arc::new(NopTelemetry))
}

fn feature() -> FeatureConfig {
    let mut config = FeatureConfig::new("logs", "https://intake.example.com/logs");
    config.storage.performance.min_file_age_for_read = Duration::ZERO;
    config.compression = false;
    config
}

fn dir_len(root: &Path, consent_dir: &str) -> usize {
    std::fs::read_dir(root.join("logs/v2").join(consent_dir))
        .unwrap()
        .count()
}

/// Yields to the storage task so writes enqueued so far land on disk before
/// the test advances the storage clock.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_no_data_loss_and_write_order() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Granted, MockClock::new(1_000_000));
    let uploader = RecordingUploader::accepting();
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    let scope = core.scope("logs").unwrap();
    scope.write(Event::new(&b"\"a\""[..]));
    scope.write(Event::new(&b"\"b\""[..]));
    scope.write(Event::new(&b"\"c\""[..]));

    tokio::time::sleep(Duration::from_secs(30)).await;
    core.stop().await;

    // Same clock instant, so all three share one file and one request.
    assert_eq!(uploader.bodies(), vec![b"[\"a\",\"b\",\"c\"]".to_vec()]);
    assert_eq!(dir_len(tmp.path(), "authorized"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oldest_batch_uploads_first() {
    let tmp = TempDir::new().unwrap();
    let clock = MockClock::new(1_000_000);
    let core = core_with(tmp.path(), TrackingConsent::Granted, Arc::clone(&clock));
    let uploader = RecordingUploader::accepting();
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    let scope = core.scope("logs").unwrap();
    scope.write(Event::new(&b"\"old\""[..]));
    settle().await;
    // Past max_file_age_for_write: the next write rotates to a new file.
    clock.advance(10_000);
    scope.write(Event::new(&b"\"new\""[..]));
    settle().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    core.stop().await;

    assert_eq!(
        uploader.bodies(),
        vec![b"[\"old\"]".to_vec(), b"[\"new\"]".to_vec()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fresh_file_is_reused_and_stale_file_rotated() {
    let tmp = TempDir::new().unwrap();
    let clock = MockClock::new(1_000_000);
    let core = core_with(tmp.path(), TrackingConsent::Granted, Arc::clone(&clock));
    // Never delivers, so files accumulate for inspection.
    let uploader = RecordingUploader::new(
        std::iter::repeat_with(|| UploadStatus::from_network_error("offline")).take(64),
    );
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    let scope = core.scope("logs").unwrap();
    scope.write(Event::new(&b"\"a\""[..]));
    settle().await;
    clock.advance(1_000); // still fresh: reused
    scope.write(Event::new(&b"\"b\""[..]));
    settle().await;
    clock.advance(10_000); // stale: rotated
    scope.write(Event::new(&b"\"c\""[..]));
    settle().await;

    core.stop().await;
    assert_eq!(dir_len(tmp.path(), "authorized"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failure_keeps_batch_until_delivered() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Granted, MockClock::new(1_000_000));
    let uploader = RecordingUploader::new([UploadStatus::from_response_code(503)]);
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    core.scope("logs").unwrap().write(Event::new(&b"\"a\""[..]));

    tokio::time::sleep(Duration::from_secs(60)).await;
    core.stop().await;

    // First attempt failed with 503; the same batch was offered again.
    assert_eq!(
        uploader.bodies(),
        vec![b"[\"a\"]".to_vec(), b"[\"a\"]".to_vec()]
    );
    assert_eq!(dir_len(tmp.path(), "authorized"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_rejection_drops_batch_without_retry() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Granted, MockClock::new(1_000_000));
    let uploader = RecordingUploader::new([UploadStatus::from_response_code(400)]);
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    core.scope("logs").unwrap().write(Event::new(&b"\"a\""[..]));

    tokio::time::sleep(Duration::from_secs(60)).await;
    core.stop().await;

    assert_eq!(uploader.bodies(), vec![b"[\"a\"]".to_vec()]);
    assert_eq!(dir_len(tmp.path(), "authorized"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_consent_granted_migrates_pending_data_once() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Pending, MockClock::new(1_000_000));
    let uploader = RecordingUploader::accepting();
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    core.scope("logs").unwrap().write(Event::new(&b"\"early\""[..]));
    settle().await;
    assert_eq!(dir_len(tmp.path(), "unauthorized"), 1);

    core.set_tracking_consent(TrackingConsent::Granted);
    // Setting the same consent again must not disturb migrated data.
    core.set_tracking_consent(TrackingConsent::Granted);
    settle().await;
    assert_eq!(dir_len(tmp.path(), "unauthorized"), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    core.stop().await;

    assert_eq!(uploader.bodies(), vec![b"[\"early\"]".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_consent_not_granted_wipes_pending_data() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Pending, MockClock::new(1_000_000));
    let uploader = RecordingUploader::accepting();
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    let scope = core.scope("logs").unwrap();
    scope.write(Event::new(&b"\"a\""[..]));
    scope.write(Event::new(&b"\"b\""[..]));
    settle().await;

    core.set_tracking_consent(TrackingConsent::NotGranted);
    // Writes after revocation are dropped outright.
    scope.write(Event::new(&b"\"late\""[..]));

    tokio::time::sleep(Duration::from_secs(30)).await;
    core.stop().await;

    assert!(uploader.bodies().is_empty());
    assert_eq!(dir_len(tmp.path(), "unauthorized"), 0);
    assert_eq!(dir_len(tmp.path(), "authorized"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_drains_storage_at_shutdown() {
    let tmp = TempDir::new().unwrap();
    let core = core_with(tmp.path(), TrackingConsent::Granted, MockClock::new(1_000_000));
    // First attempt fails; flush still removes the batch after one retry.
    let uploader = RecordingUploader::new([
        UploadStatus::from_network_error("offline"),
        UploadStatus::from_network_error("offline"),
    ]);
    core.register_feature_with_uploader(feature(), uploader.clone())
        .unwrap();

    core.scope("logs").unwrap().write(Event::new(&b"\"a\""[..]));
    settle().await;

    core.flush_and_stop().await;

    assert_eq!(dir_len(tmp.path(), "authorized"), 0);
    assert!(!uploader.bodies().is_empty());
}
