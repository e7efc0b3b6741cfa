//! Builds intake HTTP requests from batches of encoded events.
//!
//! Events are joined with configurable framing (for JSON intake: `[`, `,`,
//! `]`) so the server receives one well-formed document per batch. Bodies
//! are deflate-compressed when that actually shrinks them; every request
//! carries a fresh UUID so the intake can deduplicate retried deliveries.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use uuid::Uuid;

use crate::error::{UploadError, UploadResult};

/// Header carrying the client API key.
pub const API_KEY_HEADER: &str = "VG-API-KEY";
/// Header carrying the per-attempt request ID for server-side dedup.
pub const REQUEST_ID_HEADER: &str = "VG-REQUEST-ID";

/// Framing applied when concatenating event payloads into one body.
#[derive(Debug, Clone)]
pub struct PayloadFormat {
    /// Bytes prepended to the body.
    pub prefix: Vec<u8>,
    /// Bytes inserted between consecutive events.
    pub separator: Vec<u8>,
    /// Bytes appended to the body.
    pub suffix: Vec<u8>,
}

impl PayloadFormat {
    /// JSON array framing: `[event,event,...]`.
    pub fn json_array() -> Self {
        Self {
            prefix: b"[".to_vec(),
            separator: b",".to_vec(),
            suffix: b"]".to_vec(),
        }
    }

    /// Newline-delimited framing with no prefix or suffix.
    pub fn newline_delimited() -> Self {
        Self {
            prefix: Vec::new(),
            separator: b"\n".to_vec(),
            suffix: Vec::new(),
        }
    }
}

/// A fully-formed upload request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Target intake URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Request body, possibly compressed.
    pub body: Vec<u8>,
    /// The request ID also present in the headers.
    pub request_id: String,
}

/// Builds intake requests for one feature's endpoint.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    url: String,
    api_key: String,
    content_type: String,
    format: PayloadFormat,
    compress: bool,
}

impl RequestBuilder {
    /// Creates a builder with JSON-array framing and compression enabled.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            content_type: "application/json".to_string(),
            format: PayloadFormat::json_array(),
            compress: true,
        }
    }

    /// Overrides the payload framing.
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Overrides the `Content-Type` header value.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Enables or disables deflate body compression.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Builds a request from a batch of encoded events.
    pub fn build(&self, events: &[impl AsRef<[u8]>]) -> UploadResult<UploadRequest> {
        if events.is_empty() {
            return Err(UploadError::InvalidRequest(
                "batch contains no events".to_string(),
            ));
        }

        let mut body = Vec::new();
        body.extend_from_slice(&self.format.prefix);
        for (i, event) in events.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(&self.format.separator);
            }
            body.extend_from_slice(event.as_ref());
        }
        body.extend_from_slice(&self.format.suffix);

        let request_id = Uuid::new_v4().to_string();
        let mut headers = vec![
            ("Content-Type".to_string(), self.content_type.clone()),
            (API_KEY_HEADER.to_string(), self.api_key.clone()),
            (REQUEST_ID_HEADER.to_string(), request_id.clone()),
        ];

        let body = if self.compress {
            match deflate(&body) {
                // Only use the compressed body when it is actually smaller.
                Some(compressed) if compressed.len() < body.len() => {
                    headers.push(("Content-Encoding".to_string(), "deflate".to_string()));
                    compressed
                }
                _ => body,
            }
        } else {
            body
        };

        Ok(UploadRequest {
            url: self.url.clone(),
            headers,
            body,
            request_id,
        })
    }
}

fn deflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).ok()?;
    encoder.finish().ok()
}
