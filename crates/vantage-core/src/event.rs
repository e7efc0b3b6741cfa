//! Opaque event model.

use bytes::Bytes;

/// A single telemetry event: an already-encoded byte payload with optional
/// metadata.
///
/// The pipeline does not interpret the payload. Instrumentation encodes its
/// own value (typically JSON) before handing it over, and the upload request
/// builder only concatenates payloads with configured framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The encoded event payload.
    pub data: Bytes,
    /// Optional encoded metadata describing the payload.
    pub metadata: Option<Bytes>,
}

impl Event {
    /// Creates an event without metadata.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: None,
        }
    }

    /// Creates an event with metadata.
    pub fn with_metadata(data: impl Into<Bytes>, metadata: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata: Some(metadata.into()),
        }
    }
}
