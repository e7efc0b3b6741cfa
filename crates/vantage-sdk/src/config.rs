//! SDK and per-feature configuration.

use std::path::PathBuf;
use std::time::Duration;

use vantage_core::TrackingConsent;
use vantage_storage::StorageConfig;
use vantage_upload::{PayloadFormat, UploadWorkerConfig};

/// Configuration shared by every feature of one SDK instance.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root directory under which each feature gets its own subtree.
    pub storage_root: PathBuf,
    /// API key sent with every upload request.
    pub api_key: String,
    /// Consent in force before the host application sets one explicitly.
    pub initial_consent: TrackingConsent,
    /// Per-request timeout for the HTTP transport.
    pub upload_timeout: Duration,
}

impl CoreConfig {
    /// Creates a config with pending consent and a 30 second upload timeout.
    pub fn new(storage_root: impl Into<PathBuf>, api_key: impl Into<String>) -> Self {
        Self {
            storage_root: storage_root.into(),
            api_key: api_key.into(),
            initial_consent: TrackingConsent::Pending,
            upload_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration of one feature's storage and upload pipeline.
#[derive(Debug, Clone)]
pub struct FeatureConfig {
    /// Feature name, also the name of its storage subdirectory.
    pub name: String,
    /// Intake endpoint its batches are uploaded to.
    pub endpoint_url: String,
    /// Storage policy for this feature's batch files.
    pub storage: StorageConfig,
    /// Upload cadence and per-cycle batch limit.
    pub upload: UploadWorkerConfig,
    /// Framing applied when joining events into one request body.
    pub payload_format: PayloadFormat,
    /// Whether request bodies may be deflate-compressed.
    pub compression: bool,
}

impl FeatureConfig {
    /// Creates a feature config with default policies, JSON-array framing
    /// and compression enabled.
    pub fn new(name: impl Into<String>, endpoint_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint_url: endpoint_url.into(),
            storage: StorageConfig::default(),
            upload: UploadWorkerConfig::default(),
            payload_format: PayloadFormat::json_array(),
            compression: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_defaults() {
        let config = CoreConfig::new("/tmp/vantage", "key");
        assert_eq!(config.initial_consent, TrackingConsent::Pending);
        assert_eq!(config.upload_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_feature_config_defaults() {
        let config = FeatureConfig::new("logs", "https://intake.example.com/logs");
        assert_eq!(config.name, "logs");
        assert!(config.compression);
    }
}
