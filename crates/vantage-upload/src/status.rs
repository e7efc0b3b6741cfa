//! Upload outcome classification.
//!
//! The intake response decides the fate of a batch: accepted and permanently
//! rejected batches are deleted, transient failures keep the file for the
//! next cycle. Every 5xx is treated as transient; a 4xx means the payload
//! will never be accepted and retrying would resend it forever.

use std::fmt;

/// Classified outcome of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatus {
    /// Whether the batch should be kept on disk and retried.
    pub needs_retry: bool,
    /// The HTTP response code, if a response was received.
    pub response_code: Option<u16>,
    /// Description of the transport error, if the request never completed.
    pub network_error: Option<String>,
}

impl UploadStatus {
    /// Classifies an HTTP response code.
    ///
    /// Retry on 408 (request timeout), 429 (throttling) and any 5xx; every
    /// other code is terminal: 2xx is delivered, remaining 4xx and
    /// unexpected codes drop the batch as permanently rejected.
    pub fn from_response_code(code: u16) -> Self {
        let needs_retry = matches!(code, 408 | 429) || (500..600).contains(&code);
        Self {
            needs_retry,
            response_code: Some(code),
            network_error: None,
        }
    }

    /// Classifies a transport failure (connection error or timeout): always
    /// retryable.
    pub fn from_network_error(error: impl fmt::Display) -> Self {
        Self {
            needs_retry: true,
            response_code: None,
            network_error: Some(error.to_string()),
        }
    }

    /// Returns `true` when the server accepted the batch.
    pub fn accepted(&self) -> bool {
        matches!(self.response_code, Some(code) if (200..300).contains(&code))
    }

    /// Returns `true` when the client token was rejected.
    pub fn unauthorized(&self) -> bool {
        matches!(self.response_code, Some(401 | 403))
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.response_code, &self.network_error) {
            (Some(code), _) => write!(f, "[response code: {code}]"),
            (None, Some(error)) => write!(f, "[network error: {error}]"),
            (None, None) => write!(f, "[unknown]"),
        }
    }
}
