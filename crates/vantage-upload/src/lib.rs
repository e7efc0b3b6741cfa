#![warn(missing_docs)]

//! Vantage upload subsystem: delivers stored batches to the intake endpoint.
//!
//! A background worker periodically pulls the oldest eligible batch from
//! storage, frames its events into one HTTP request, and classifies the
//! outcome: accepted or permanently rejected batches are deleted, transient
//! failures keep the file on disk for the next cycle. The delay between
//! cycles backs off while uploads fail and resets to its minimum after a
//! success, within configured bounds.

pub mod delay;
pub mod error;
pub mod request;
pub mod status;
pub mod uploader;
pub mod worker;

pub use delay::{UploadDelay, UploadPerformance};
pub use error::{UploadError, UploadResult};
pub use request::{PayloadFormat, RequestBuilder, UploadRequest};
pub use status::UploadStatus;
pub use uploader::{DataUploader, HttpUploader};
pub use worker::{UploadWorker, UploadWorkerConfig};
