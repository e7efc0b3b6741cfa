//! Appends encoded events to batch files.
//!
//! Writing is fire-and-forget from the producer's perspective: any failure
//! (encode, encrypt, IO, insufficient space) is reported to telemetry and
//! swallowed, because the SDK must never crash or block the host app over a
//! lost telemetry event.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use vantage_core::{DataEncryption, Event, Telemetry};

use crate::block::{BlockType, DataBlock};
use crate::error::StorageResult;
use crate::orchestrator::FilesOrchestrator;

/// Writes events into batch files through the orchestrator.
pub struct FileWriter {
    orchestrator: Arc<Mutex<FilesOrchestrator>>,
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    /// When set, every event lands in its own new file.
    force_new_file: bool,
}

impl FileWriter {
    /// Creates a writer over a shared orchestrator.
    pub fn new(
        orchestrator: Arc<Mutex<FilesOrchestrator>>,
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
        force_new_file: bool,
    ) -> Self {
        Self {
            orchestrator,
            encryption,
            telemetry,
            force_new_file,
        }
    }

    /// Writes one event (and its optional metadata) as data blocks.
    ///
    /// Failures never propagate to the caller.
    pub fn write(&self, event: &Event) {
        if let Err(e) = self.try_write(event) {
            error!(error = %e, "failed to write event");
            self.telemetry.error(&format!("Failed to write data: {e}"));
        }
    }

    fn try_write(&self, event: &Event) -> StorageResult<()> {
        let mut orchestrator = self.orchestrator.lock();
        let max_object_size = orchestrator.performance().max_object_size;

        // The metadata block precedes the event block it annotates.
        let mut bytes = Vec::new();
        if let Some(metadata) = &event.metadata {
            let payload = self.encrypt(metadata)?;
            bytes.extend(DataBlock::new(BlockType::EventMetadata, payload).serialize(max_object_size)?);
        }
        let payload = self.encrypt(&event.data)?;
        bytes.extend(DataBlock::new(BlockType::Event, payload).serialize(max_object_size)?);

        let write_size = bytes.len() as u64;
        let file = if self.force_new_file {
            orchestrator.get_new_writable_file(write_size)?
        } else {
            orchestrator.get_writable_file(write_size)?
        };
        file.append(&bytes)?;
        Ok(())
    }

    fn encrypt(&self, data: &[u8]) -> StorageResult<Vec<u8>> {
        match &self.encryption {
            Some(encryption) => Ok(encryption.encrypt(data)?),
            None => Ok(data.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use vantage_core::{CryptoError, MockClock, NopTelemetry, TrackingTelemetry};

    use crate::block::BlockReader;
    use crate::file::Directory;
    use crate::orchestrator::StoragePerformance;

    fn writer_with(
        performance: StoragePerformance,
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> (TempDir, FileWriter, Arc<Mutex<FilesOrchestrator>>) {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::create(tmp.path().join("authorized")).unwrap();
        let orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            dir,
            performance,
            MockClock::new(1_000_000),
            Arc::new(NopTelemetry),
            None,
        )));
        let writer = FileWriter::new(
            Arc::clone(&orchestrator),
            encryption,
            telemetry,
            false,
        );
        (tmp, writer, orchestrator)
    }

    fn blocks_in_single_file(orchestrator: &Arc<Mutex<FilesOrchestrator>>) -> Vec<DataBlock> {
        let files = orchestrator.lock().directory().files().unwrap();
        assert_eq!(files.len(), 1);
        BlockReader::new(files[0].stream().unwrap()).all().unwrap()
    }

    struct ReversingEncryption;

    impl DataEncryption for ReversingEncryption {
        fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(data.iter().rev().copied().collect())
        }

        fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    struct FailingEncryption;

    impl DataEncryption for FailingEncryption {
        fn encrypt(&self, _data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Err(CryptoError::Encryption("no key available".to_string()))
        }

        fn decrypt(&self, _data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Err(CryptoError::Decryption("no key available".to_string()))
        }
    }

    #[test]
    fn test_writes_events_with_metadata_as_tlv_blocks() {
        let (_tmp, writer, orchestrator) = writer_with(
            StoragePerformance::default(),
            None,
            Arc::new(NopTelemetry),
        );

        writer.write(&Event::with_metadata(&b"{\"key1\":\"value1\"}"[..], &b"{\"meta1\":\"m1\"}"[..]));
        writer.write(&Event::new(&b"{\"key2\":\"value2\"}"[..])); // no metadata

        let blocks = blocks_in_single_file(&orchestrator);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].block_type, BlockType::EventMetadata);
        assert_eq!(blocks[0].data, b"{\"meta1\":\"m1\"}");
        assert_eq!(blocks[1].block_type, BlockType::Event);
        assert_eq!(blocks[1].data, b"{\"key1\":\"value1\"}");
        assert_eq!(blocks[2].block_type, BlockType::Event);
        assert_eq!(blocks[2].data, b"{\"key2\":\"value2\"}");
    }

    #[test]
    fn test_writes_encrypted_payloads() {
        let (_tmp, writer, orchestrator) = writer_with(
            StoragePerformance::default(),
            Some(Arc::new(ReversingEncryption)),
            Arc::new(NopTelemetry),
        );

        writer.write(&Event::new(&b"abc"[..]));

        let blocks = blocks_in_single_file(&orchestrator);
        assert_eq!(blocks[0].data, b"cba");
    }

    #[test]
    fn test_oversized_event_is_dropped_and_reported() {
        let telemetry = TrackingTelemetry::new();
        let (_tmp, writer, orchestrator) = writer_with(
            StoragePerformance {
                max_object_size: 23,
                ..Default::default()
            },
            None,
            Arc::new(telemetry.clone()),
        );

        writer.write(&Event::new(&b"{\"key1\":\"value1\"}"[..])); // 17 bytes, written
        writer.write(&Event::new(vec![b'x'; 24])); // dropped

        let blocks = blocks_in_single_file(&orchestrator);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, b"{\"key1\":\"value1\"}");
        let errors = telemetry.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Failed to write data"));
    }

    #[test]
    fn test_encryption_failure_is_swallowed_into_telemetry() {
        let telemetry = TrackingTelemetry::new();
        let (_tmp, writer, orchestrator) = writer_with(
            StoragePerformance::default(),
            Some(Arc::new(FailingEncryption)),
            Arc::new(telemetry.clone()),
        );

        writer.write(&Event::new(&b"abc"[..]));

        assert!(orchestrator.lock().directory().files().unwrap().is_empty());
        assert_eq!(telemetry.errors().len(), 1);
    }

    #[test]
    fn test_io_failure_is_swallowed_into_telemetry() {
        let telemetry = TrackingTelemetry::new();
        let (_tmp, writer, orchestrator) = writer_with(
            StoragePerformance::default(),
            None,
            Arc::new(telemetry.clone()),
        );

        writer.write(&Event::new(&b"first"[..]));
        // Remove the directory from under the writer: the reused file check
        // fails over to creating a new file, which cannot be created.
        orchestrator.lock().directory().delete().unwrap();
        writer.write(&Event::new(&b"second"[..]));

        assert!(!telemetry.errors().is_empty());
    }

    #[test]
    fn test_force_new_file_isolates_each_event() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::create(tmp.path().join("authorized")).unwrap();
        let clock = MockClock::new(1_000_000);
        let orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            dir,
            StoragePerformance::default(),
            Arc::clone(&clock) as Arc<dyn vantage_core::Clock>,
            Arc::new(NopTelemetry),
            None,
        )));
        let writer = FileWriter::new(
            Arc::clone(&orchestrator),
            None,
            Arc::new(NopTelemetry),
            true,
        );

        writer.write(&Event::new(&b"a"[..]));
        clock.advance(1);
        writer.write(&Event::new(&b"b"[..]));

        assert_eq!(orchestrator.lock().directory().files().unwrap().len(), 2);
    }
}
