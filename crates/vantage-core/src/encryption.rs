//! Pluggable at-rest encryption capability.
//!
//! The pipeline never picks an algorithm itself; the host app may inject an
//! implementation at SDK setup and the writer/reader apply it per block
//! payload. The default is a plaintext passthrough.

use thiserror::Error;

/// Errors produced by an encryption capability.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Payload could not be encrypted.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Payload could not be decrypted.
    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Capability interface for encrypting event payloads at rest.
///
/// `decrypt(encrypt(data))` must round-trip. Payloads are encrypted
/// individually, so implementations must not rely on cross-payload state.
pub trait DataEncryption: Send + Sync {
    /// Encrypts a single payload before it is written to disk.
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypts a single payload after it is read from disk.
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Default passthrough implementation used when no encryption is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEncryption;

impl DataEncryption for NoopEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(data.to_vec())
    }
}
