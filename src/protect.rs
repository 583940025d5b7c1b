//! Reversible protection of webhook credentials at rest.
//!
//! Secrets and callback URLs are stored protected and only unprotected by
//! the registry for webhooks that matched a notification. The default
//! implementation is AES-256-GCM with a random nonce per value:
//!
//! `base64(nonce || ciphertext || auth_tag)`

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Required key size for AES-256.
pub const KEY_SIZE: usize = 32;

/// Errors raised while protecting or unprotecting a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtectError {
    #[error("Invalid key length: expected 32 bytes, got {actual}")]
    InvalidKeyLength {
        actual: usize,
    },

    #[error("Invalid encoding: {0}")]
    Encoding(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Decryption failed (wrong key or corrupted ciphertext)")]
    Decryption,
}

/// Encrypts and decrypts credential fields.
///
/// Implementations must satisfy `unprotect(protect(x)) == x`.
pub trait SecretProtector: Send + Sync {
    /// Protect a plaintext value for storage.
    fn protect(&self, plaintext: &str) -> Result<String, ProtectError>;

    /// Recover a plaintext value from its protected form.
    fn unprotect(&self, protected: &str) -> Result<String, ProtectError>;
}

/// AES-256-GCM protector keyed by configuration-supplied material.
#[derive(Clone)]
pub struct AesGcmProtector {
    cipher: Aes256Gcm,
}

impl AesGcmProtector {
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build from a raw key slice.
    pub fn from_slice(key: &[u8]) -> Result<Self, ProtectError> {
        let key: [u8; KEY_SIZE] = key
            .try_into()
            .map_err(|_| ProtectError::InvalidKeyLength { actual: key.len() })?;
        Ok(Self::new(key))
    }

    /// Build from a base64-encoded 32-byte key, the form it takes in config.
    pub fn from_base64_key(encoded: &str) -> Result<Self, ProtectError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|e| ProtectError::Encoding(format!("key is not base64: {e}")))?;
        Self::from_slice(&raw)
    }
}

impl std::fmt::Debug for AesGcmProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmProtector").finish_non_exhaustive()
    }
}

impl SecretProtector for AesGcmProtector {
    fn protect(&self, plaintext: &str) -> Result<String, ProtectError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| ProtectError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&out))
    }

    fn unprotect(&self, protected: &str) -> Result<String, ProtectError> {
        let raw = BASE64
            .decode(protected)
            .map_err(|e| ProtectError::Encoding(format!("base64 decode failed: {e}")))?;

        if raw.len() <= NONCE_SIZE {
            return Err(ProtectError::Encoding(
                "protected value is shorter than a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| ProtectError::Decryption)?;

        String::from_utf8(plaintext).map_err(|e| ProtectError::Encoding(e.to_string()))
    }
}
