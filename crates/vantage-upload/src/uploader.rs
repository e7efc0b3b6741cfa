//! HTTP transport for upload requests.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{UploadError, UploadResult};
use crate::request::UploadRequest;
use crate::status::UploadStatus;

/// Sends one upload request and classifies the outcome.
///
/// Transport failures are part of the classification, not errors: a request
/// that never reached the server comes back as a retryable [`UploadStatus`].
/// `Err` is reserved for requests that cannot be attempted at all.
#[async_trait]
pub trait DataUploader: Send + Sync {
    /// Delivers the request to the intake endpoint.
    async fn upload(&self, request: &UploadRequest) -> UploadResult<UploadStatus>;
}

/// [`DataUploader`] backed by a shared `reqwest` client.
pub struct HttpUploader {
    client: reqwest::Client,
}

impl HttpUploader {
    /// Creates an uploader whose requests abort after `timeout`.
    pub fn new(timeout: Duration) -> UploadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DataUploader for HttpUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult<UploadStatus> {
        let mut http_request = self.client.post(&request.url);
        for (name, value) in &request.headers {
            http_request = http_request.header(name, value);
        }

        let status = match http_request.body(request.body.clone()).send().await {
            Ok(response) => UploadStatus::from_response_code(response.status().as_u16()),
            Err(e) => UploadStatus::from_network_error(e),
        };
        debug!(request_id = %request.request_id, status = %status, "upload attempt finished");
        Ok(status)
    }
}
