//! The SDK instance: an explicit handle owning every feature pipeline.
//!
//! There is no process-wide singleton; the host application constructs a
//! [`VantageCore`], registers features on it and keeps the handle for the
//! lifetime of data collection. Each registered feature gets its own storage
//! actor and upload worker, all sharing the instance's clock, consent and
//! telemetry.
//!
//! Must be constructed inside a tokio runtime: feature registration spawns
//! background tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use vantage_core::{
    Clock, ConsentProvider, DataEncryption, Event, SystemClock, Telemetry, NopTelemetry,
    TrackingConsent,
};
use vantage_storage::{FeatureDirectories, Storage};
use vantage_upload::{DataUploader, HttpUploader, RequestBuilder, UploadWorker};

use crate::config::{CoreConfig, FeatureConfig};
use crate::error::{SdkError, SdkResult};

struct Feature {
    storage: Arc<Storage>,
    worker: Arc<UploadWorker>,
}

/// One SDK instance; owns the pipelines of all registered features.
pub struct VantageCore {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    consent: ConsentProvider,
    features: Mutex<HashMap<String, Feature>>,
}

impl VantageCore {
    /// Creates an instance with the system clock, no encryption and no-op
    /// telemetry. No IO happens until a feature is registered.
    pub fn new(config: CoreConfig) -> Self {
        Self::with_components(config, Arc::new(SystemClock), None, Arc::new(NopTelemetry))
    }

    /// Creates an instance with explicit clock, encryption and telemetry.
    pub fn with_components(
        config: CoreConfig,
        clock: Arc<dyn Clock>,
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let consent = ConsentProvider::new(config.initial_consent);
        Self {
            config,
            clock,
            encryption,
            telemetry,
            consent,
            features: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a feature, spawning its storage actor and upload worker.
    pub fn register_feature(&self, feature: FeatureConfig) -> SdkResult<()> {
        let uploader = HttpUploader::new(self.config.upload_timeout)?;
        self.register_feature_with_uploader(feature, Arc::new(uploader))
    }

    /// Registers a feature with a custom upload transport.
    pub fn register_feature_with_uploader(
        &self,
        feature: FeatureConfig,
        uploader: Arc<dyn DataUploader>,
    ) -> SdkResult<()> {
        let mut features = self.features.lock();
        if features.contains_key(&feature.name) {
            return Err(SdkError::DuplicateFeature { name: feature.name });
        }

        let directories = FeatureDirectories::create(&self.config.storage_root, &feature.name)?;
        let storage = Storage::spawn(
            directories,
            feature.storage,
            Arc::clone(&self.clock),
            self.encryption.clone(),
            Arc::clone(&self.telemetry),
            &self.consent,
        );
        let request_builder = RequestBuilder::new(feature.endpoint_url, self.config.api_key.clone())
            .with_format(feature.payload_format)
            .with_compression(feature.compression);
        let worker = UploadWorker::spawn(
            Arc::clone(&storage),
            uploader,
            request_builder,
            Arc::clone(&self.telemetry),
            feature.upload,
        );

        info!(feature = feature.name.as_str(), "registered feature");
        features.insert(feature.name, Feature { storage, worker });
        Ok(())
    }

    /// Returns a write handle for a registered feature.
    pub fn scope(&self, feature: &str) -> Option<FeatureScope> {
        self.features.lock().get(feature).map(|f| FeatureScope {
            storage: Arc::clone(&f.storage),
        })
    }

    /// Sets the tracking consent, migrating stored data accordingly.
    pub fn set_tracking_consent(&self, consent: TrackingConsent) {
        self.consent.set(consent);
    }

    /// Returns the consent currently in force.
    pub fn tracking_consent(&self) -> TrackingConsent {
        self.consent.current()
    }

    /// Stops every feature pipeline. Batches not yet uploaded stay on disk
    /// for the next instance.
    pub async fn stop(&self) {
        for (name, feature) in self.take_features() {
            feature.worker.stop().await;
            feature.storage.stop().await;
            info!(feature = name.as_str(), "stopped feature");
        }
    }

    /// Attempts one delivery of every stored batch, then stops. Batches are
    /// deleted whether or not delivery succeeded.
    pub async fn flush_and_stop(&self) {
        for (name, feature) in self.take_features() {
            feature.worker.stop().await;
            feature.worker.flush().await;
            feature.storage.stop().await;
            info!(feature = name.as_str(), "flushed and stopped feature");
        }
    }

    fn take_features(&self) -> Vec<(String, Feature)> {
        self.features.lock().drain().collect()
    }
}

/// Write handle for one feature.
#[derive(Clone)]
pub struct FeatureScope {
    storage: Arc<Storage>,
}

impl FeatureScope {
    /// Enqueues an event for durable storage; returns immediately.
    pub fn write(&self, event: Event) {
        self.storage.write(event);
    }
}
