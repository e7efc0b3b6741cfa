//! Streams batches of events out of the oldest eligible file.
//!
//! A batch stays on disk until the upload pipeline observes a terminal
//! outcome and calls [`FileReader::mark_batch_as_read`]; only then is the
//! source file deleted and its name recorded so the same batch is never
//! served twice within one process. A batch that failed with a retryable
//! error is simply offered again on the next read.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use vantage_core::{DataEncryption, Event, Telemetry};

use crate::block::{BlockReader, BlockType};
use crate::file::File;
use crate::orchestrator::{FilesOrchestrator, RemovalReason};

/// Events read from one batch file, paired with the file they came from.
#[derive(Debug)]
pub struct Batch {
    /// The decoded events, in write order.
    pub events: Vec<Event>,
    /// The source file, kept so the batch can be deleted after delivery.
    pub file: File,
}

impl Batch {
    /// Returns the name of the source file.
    pub fn file_name(&self) -> &str {
        self.file.name()
    }
}

/// Reads event batches through the orchestrator.
pub struct FileReader {
    orchestrator: Arc<Mutex<FilesOrchestrator>>,
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    /// Files already consumed in this process; grown on mark-as-read only.
    files_read: HashSet<String>,
}

impl FileReader {
    /// Creates a reader over a shared orchestrator.
    pub fn new(
        orchestrator: Arc<Mutex<FilesOrchestrator>>,
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            orchestrator,
            encryption,
            telemetry,
            files_read: HashSet::new(),
        }
    }

    /// Returns the next unread batch, or `None` if no file is eligible.
    ///
    /// An event that fails to decrypt is dropped and reported; the rest of
    /// the batch is still delivered.
    pub fn read_next_batch(&mut self) -> Option<Batch> {
        let file = self
            .orchestrator
            .lock()
            .get_readable_file(&self.files_read)?;
        self.decode_batch(file)
    }

    /// Returns the next unread batch regardless of file age, or `None` once
    /// the directory holds nothing unread.
    ///
    /// Unlike [`read_next_batch`](Self::read_next_batch) this does not wait
    /// out `min_file_age_for_read`, so a flush can drain files whose write
    /// window is still open.
    pub fn read_flushable_batch(&mut self) -> Option<Batch> {
        let file = self
            .orchestrator
            .lock()
            .get_flushable_file(&self.files_read)?;
        self.decode_batch(file)
    }

    fn decode_batch(&mut self, file: File) -> Option<Batch> {
        let stream = match file.stream() {
            Ok(stream) => stream,
            Err(e) => {
                self.telemetry
                    .error(&format!("Failed to open batch file for reading: {e}"));
                return None;
            }
        };

        let mut reader = BlockReader::new(stream);
        let mut events = Vec::new();
        let mut pending_metadata: Option<Vec<u8>> = None;
        loop {
            let block = match reader.next() {
                Ok(Some(block)) => block,
                Ok(None) => break,
                Err(e) => {
                    self.telemetry
                        .error(&format!("Failed to read batch file: {e}"));
                    break;
                }
            };
            match block.block_type {
                BlockType::EventMetadata => match self.decrypt(&block.data) {
                    Some(metadata) => pending_metadata = Some(metadata),
                    None => pending_metadata = None,
                },
                BlockType::Event => {
                    let Some(data) = self.decrypt(&block.data) else {
                        // Undecryptable event: drop this record, keep going.
                        pending_metadata = None;
                        continue;
                    };
                    events.push(Event {
                        data: data.into(),
                        metadata: pending_metadata.take().map(Into::into),
                    });
                }
            }
        }

        debug!(file = file.name(), events = events.len(), "read batch");
        Some(Batch { events, file })
    }

    /// Deletes the batch's source file and records it as served.
    pub fn mark_batch_as_read(&mut self, batch: &Batch, reason: RemovalReason) {
        self.orchestrator.lock().delete(&batch.file, reason);
        self.files_read.insert(batch.file_name().to_string());
    }

    fn decrypt(&self, data: &[u8]) -> Option<Vec<u8>> {
        match &self.encryption {
            Some(encryption) => match encryption.decrypt(data) {
                Ok(data) => Some(data),
                Err(e) => {
                    self.telemetry
                        .error(&format!("Failed to decrypt event: {e}"));
                    None
                }
            },
            None => Some(data.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    use vantage_core::{CryptoError, MockClock, NopTelemetry, TrackingTelemetry};

    use crate::file::Directory;
    use crate::orchestrator::StoragePerformance;
    use crate::writer::FileWriter;

    fn performance() -> StoragePerformance {
        StoragePerformance {
            min_file_age_for_read: Duration::ZERO,
            ..Default::default()
        }
    }

    fn pipeline(
        encryption: Option<Arc<dyn DataEncryption>>,
        telemetry: Arc<dyn Telemetry>,
    ) -> (TempDir, Arc<MockClock>, FileWriter, FileReader) {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::create(tmp.path().join("authorized")).unwrap();
        let clock = MockClock::new(1_000_000);
        let orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            dir,
            performance(),
            Arc::clone(&clock) as Arc<dyn vantage_core::Clock>,
            Arc::clone(&telemetry),
            None,
        )));
        let writer = FileWriter::new(
            Arc::clone(&orchestrator),
            encryption.clone(),
            Arc::clone(&telemetry),
            false,
        );
        let reader = FileReader::new(orchestrator, encryption, telemetry);
        (tmp, clock, writer, reader)
    }

    #[test]
    fn test_reads_written_events_with_metadata() {
        let (_tmp, _clock, writer, mut reader) = pipeline(None, Arc::new(NopTelemetry));

        writer.write(&Event::with_metadata(&b"event1"[..], &b"meta1"[..]));
        writer.write(&Event::new(&b"event2"[..]));

        let batch = reader.read_next_batch().unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(&batch.events[0].data[..], b"event1");
        assert_eq!(batch.events[0].metadata.as_deref(), Some(&b"meta1"[..]));
        assert_eq!(&batch.events[1].data[..], b"event2");
        assert!(batch.events[1].metadata.is_none());
    }

    #[test]
    fn test_no_batch_when_no_file_eligible() {
        let (_tmp, _clock, _writer, mut reader) = pipeline(None, Arc::new(NopTelemetry));
        assert!(reader.read_next_batch().is_none());
    }

    #[test]
    fn test_marked_batch_is_deleted_and_not_served_again() {
        let (_tmp, _clock, writer, mut reader) = pipeline(None, Arc::new(NopTelemetry));

        writer.write(&Event::new(&b"event"[..]));

        let batch = reader.read_next_batch().unwrap();
        reader.mark_batch_as_read(
            &batch,
            RemovalReason::IntakeCode { response_code: 202 },
        );

        assert!(!batch.file.path().exists());
        assert!(reader.read_next_batch().is_none());
    }

    #[test]
    fn test_flushable_batch_ignores_read_age_window() {
        let tmp = TempDir::new().unwrap();
        let dir = Directory::create(tmp.path().join("authorized")).unwrap();
        let clock = MockClock::new(1_000_000);
        let telemetry: Arc<dyn Telemetry> = Arc::new(NopTelemetry);
        let orchestrator = Arc::new(Mutex::new(FilesOrchestrator::new(
            dir,
            StoragePerformance::default(),
            Arc::clone(&clock) as Arc<dyn vantage_core::Clock>,
            Arc::clone(&telemetry),
            None,
        )));
        let writer = FileWriter::new(
            Arc::clone(&orchestrator),
            None,
            Arc::clone(&telemetry),
            false,
        );
        let mut reader = FileReader::new(orchestrator, None, telemetry);

        writer.write(&Event::new(&b"settling"[..]));

        // Too young for the regular read path, but a flush still sees it.
        assert!(reader.read_next_batch().is_none());
        let batch = reader.read_flushable_batch().unwrap();
        assert_eq!(&batch.events[0].data[..], b"settling");

        reader.mark_batch_as_read(&batch, RemovalReason::Flushed);
        assert!(reader.read_flushable_batch().is_none());
    }

    #[test]
    fn test_unmarked_batch_is_offered_again() {
        let (_tmp, _clock, writer, mut reader) = pipeline(None, Arc::new(NopTelemetry));

        writer.write(&Event::new(&b"event"[..]));

        let first = reader.read_next_batch().unwrap();
        let second = reader.read_next_batch().unwrap();
        assert_eq!(first.file_name(), second.file_name());
    }

    #[test]
    fn test_oldest_batch_is_served_first() {
        let (_tmp, clock, writer, mut reader) = pipeline(None, Arc::new(NopTelemetry));

        // Rotate by forcing age past max_file_age_for_write between writes.
        writer.write(&Event::new(&b"old"[..]));
        clock.advance(10_000);
        writer.write(&Event::new(&b"new"[..]));

        let batch = reader.read_next_batch().unwrap();
        assert_eq!(&batch.events[0].data[..], b"old");
        reader.mark_batch_as_read(&batch, RemovalReason::IntakeCode { response_code: 202 });

        let batch = reader.read_next_batch().unwrap();
        assert_eq!(&batch.events[0].data[..], b"new");
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

    /// Decryption fails on payloads starting with `poison`.
    struct PoisonedDecryption;

    impl DataEncryption for PoisonedDecryption {
        fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(data.to_vec())
        }

        fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            if data.starts_with(b"poison") {
                Err(CryptoError::Decryption("poisoned record".to_string()))
            } else {
                Ok(data.to_vec())
            }
        }
    }

    #[test]
    fn test_encrypted_round_trip() {
        let (_tmp, _clock, writer, mut reader) =
            pipeline(Some(Arc::new(ReversingEncryption)), Arc::new(NopTelemetry));

        writer.write(&Event::with_metadata(&b"payload"[..], &b"meta"[..]));

        let batch = reader.read_next_batch().unwrap();
        assert_eq!(&batch.events[0].data[..], b"payload");
        assert_eq!(batch.events[0].metadata.as_deref(), Some(&b"meta"[..]));
    }

    #[test]
    fn test_undecryptable_event_is_dropped_not_the_batch() {
        let telemetry = TrackingTelemetry::new();
        let (_tmp, _clock, writer, mut reader) = pipeline(
            Some(Arc::new(PoisonedDecryption)),
            Arc::new(telemetry.clone()),
        );

        writer.write(&Event::new(&b"good1"[..]));
        writer.write(&Event::new(&b"poisoned"[..]));
        writer.write(&Event::new(&b"good2"[..]));

        let batch = reader.read_next_batch().unwrap();
        let payloads: Vec<&[u8]> = batch.events.iter().map(|e| &e.data[..]).collect();
        assert_eq!(payloads, vec![&b"good1"[..], &b"good2"[..]]);
        assert_eq!(telemetry.errors().len(), 1);
    }
}
