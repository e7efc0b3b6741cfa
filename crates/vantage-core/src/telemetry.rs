//! Internal telemetry interface.
//!
//! Storage-layer failures never propagate to the instrumentation caller; they
//! are converted into telemetry records at the Writer/Reader/Migrator
//! boundary. The same interface carries batch lifecycle metrics.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Structured attributes attached to a telemetry metric.
pub type MetricAttributes = serde_json::Value;

/// Sink for internal SDK errors and metrics.
pub trait Telemetry: Send + Sync {
    /// Records an internal error with a human-readable message.
    fn error(&self, message: &str);

    /// Records a named metric with structured attributes.
    fn metric(&self, name: &str, attributes: MetricAttributes);
}

/// Telemetry sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopTelemetry;

impl Telemetry for NopTelemetry {
    fn error(&self, _message: &str) {}

    fn metric(&self, _name: &str, _attributes: MetricAttributes) {}
}

/// A single record captured by [`TrackingTelemetry`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    /// An internal error message.
    Error(String),
    /// A named metric with attributes.
    Metric {
        /// Metric name.
        name: String,
        /// Metric attributes.
        attributes: MetricAttributes,
    },
}

/// Telemetry sink that stores all records in memory.
///
/// Used by tests to assert on swallowed errors and emitted metrics.
#[derive(Clone, Default)]
pub struct TrackingTelemetry {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl TrackingTelemetry {
    /// Creates an empty tracking sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all captured records.
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().clone()
    }

    /// Returns all captured error messages.
    pub fn errors(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                TelemetryRecord::Error(message) => Some(message.clone()),
                TelemetryRecord::Metric { .. } => None,
            })
            .collect()
    }

    /// Returns the attributes of all metrics captured under `name`.
    pub fn metrics_named(&self, name: &str) -> Vec<MetricAttributes> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                TelemetryRecord::Metric {
                    name: n,
                    attributes,
                } if n == name => Some(attributes.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Telemetry for TrackingTelemetry {
    fn error(&self, message: &str) {
        self.records
            .lock()
            .push(TelemetryRecord::Error(message.to_string()));
    }

    fn metric(&self, name: &str, attributes: MetricAttributes) {
        self.records.lock().push(TelemetryRecord::Metric {
            name: name.to_string(),
            attributes,
        });
    }
}

impl fmt::Debug for TrackingTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingTelemetry")
            .field("records", &self.records.lock().len())
            .finish()
    }
}
