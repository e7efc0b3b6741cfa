//! Length-prefixed data block codec for batch files.
//!
//! A batch file is a plain concatenation of blocks, each framed as
//! `[type: u16 LE][length: u32 LE][payload: length bytes]`. There is no file
//! header or footer, so appending a block never rewrites existing bytes.
//!
//! Decoding is tolerant by construction: a truncated trailing block means the
//! writer has not finished appending yet and is treated as end of readable
//! data, while a block with an oversized declared length or an unknown type
//! is skipped so one corrupted record cannot poison the rest of the file.

use std::io::Read;

use tracing::warn;

use crate::error::{StorageError, StorageResult};

/// Size of the block header in bytes: 2-byte type + 4-byte length.
pub const BLOCK_HEADER_LENGTH: u64 = 6;

/// Default cap on a single block's payload length when decoding (10 MiB).
const DEFAULT_MAX_BLOCK_LENGTH: u32 = 10 * 1024 * 1024;

/// Typed content of a data block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum BlockType {
    /// An encoded event payload.
    Event = 0x00,
    /// Encoded metadata for the event block that follows it.
    EventMetadata = 0x01,
}

impl BlockType {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x00 => Some(BlockType::Event),
            0x01 => Some(BlockType::EventMetadata),
            _ => None,
        }
    }
}

/// A single typed block within a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    /// The block type.
    pub block_type: BlockType,
    /// The block payload.
    pub data: Vec<u8>,
}

impl DataBlock {
    /// Creates a new block.
    pub fn new(block_type: BlockType, data: Vec<u8>) -> Self {
        Self { block_type, data }
    }

    /// Serializes the block into its on-disk framing.
    ///
    /// Fails if the payload exceeds `max_length`, mirroring the decode-side
    /// cap so a block rejected on read can never be produced on write.
    pub fn serialize(&self, max_length: u64) -> StorageResult<Vec<u8>> {
        let length = self.data.len() as u64;
        if length > max_length {
            return Err(StorageError::InsufficientSpace {
                requested: length,
                limit: max_length,
            });
        }
        if length > u32::MAX as u64 {
            return Err(StorageError::Encode(format!(
                "block payload of {length} bytes does not fit a u32 length field"
            )));
        }

        let mut bytes = Vec::with_capacity(BLOCK_HEADER_LENGTH as usize + self.data.len());
        bytes.extend_from_slice(&(self.block_type as u16).to_le_bytes());
        bytes.extend_from_slice(&(length as u32).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }
}

/// Streaming decoder yielding blocks from a byte stream.
pub struct BlockReader<R: Read> {
    input: R,
    max_block_length: u32,
}

impl<R: Read> BlockReader<R> {
    /// Creates a reader with the default block length cap.
    pub fn new(input: R) -> Self {
        Self::with_max_block_length(input, DEFAULT_MAX_BLOCK_LENGTH)
    }

    /// Creates a reader that skips blocks whose declared length exceeds `max_block_length`.
    pub fn with_max_block_length(input: R, max_block_length: u32) -> Self {
        Self {
            input,
            max_block_length,
        }
    }

    /// Returns the next block, or `None` at end of readable data.
    ///
    /// A partial header or payload at the end of the stream yields `None`:
    /// the file may still be appended to by a concurrent writer and the
    /// truncated remainder is not an error. Oversized and unknown-type blocks
    /// are skipped.
    pub fn next(&mut self) -> StorageResult<Option<DataBlock>> {
        loop {
            let mut type_bytes = [0u8; 2];
            if !self.read_exact_or_eof(&mut type_bytes)? {
                return Ok(None);
            }
            let mut length_bytes = [0u8; 4];
            if !self.read_exact_or_eof(&mut length_bytes)? {
                return Ok(None);
            }

            let raw_type = u16::from_le_bytes(type_bytes);
            let length = u32::from_le_bytes(length_bytes);

            if length > self.max_block_length {
                warn!(
                    length = length,
                    max = self.max_block_length,
                    "skipping oversized data block"
                );
                if !self.skip(length as u64)? {
                    return Ok(None);
                }
                continue;
            }

            match BlockType::from_raw(raw_type) {
                Some(block_type) => {
                    let mut data = vec![0u8; length as usize];
                    if !self.read_exact_or_eof(&mut data)? {
                        return Ok(None);
                    }
                    return Ok(Some(DataBlock { block_type, data }));
                }
                None => {
                    warn!(raw_type = raw_type, "skipping data block of unknown type");
                    if !self.skip(length as u64)? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Reads all remaining blocks.
    pub fn all(&mut self) -> StorageResult<Vec<DataBlock>> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next()? {
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Returns `false` if the stream ended before the buffer was filled.
    fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> StorageResult<bool> {
        match self.input.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Returns `false` if the stream ended before `count` bytes were skipped.
    fn skip(&mut self, count: u64) -> StorageResult<bool> {
        let copied = std::io::copy(&mut self.input.by_ref().take(count), &mut std::io::sink())?;
        Ok(copied == count)
    }
}
