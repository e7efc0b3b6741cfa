#![warn(missing_docs)]

//! Vantage core subsystem: shared leaf types for the storage and upload pipeline.
//!
//! This crate holds the pieces every other Vantage crate depends on: the
//! tracking consent lifecycle, the clock abstraction used by age-based file
//! policies, the pluggable encryption capability, the internal telemetry
//! interface, and the opaque event model.

pub mod clock;
pub mod consent;
pub mod encryption;
pub mod event;
pub mod telemetry;

pub use clock::{Clock, MockClock, SystemClock};
pub use consent::{ConsentProvider, ConsentSubscriber, TrackingConsent};
pub use encryption::{CryptoError, DataEncryption, NoopEncryption};
pub use event::Event;
pub use telemetry::{MetricAttributes, NopTelemetry, Telemetry, TelemetryRecord, TrackingTelemetry};
