//! Encryption stage
//!
//! The codec seals payloads through a `Cipher`. The shipped strategy is
//! AES-256-GCM with a random 96-bit nonce per message:
//!
//! ```text
//! ┌────────────┬──────────────────────────────────────┐
//! │ Nonce (12) │ Ciphertext + GCM tag (len + 16)      │
//! └────────────┴──────────────────────────────────────┘
//! ```

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CodecError;

/// Nonce length prefixed to every sealed message
pub const NONCE_SIZE: usize = 12;

/// AES-256 key length
pub const KEY_SIZE: usize = 32;

/// Domain-separation label mixed into passphrase-derived keys
const KEY_LABEL: &[u8] = b"persistkv.codec.aes-256-gcm.v1";

/// Symmetric authenticated encryption used by the codec
pub trait Cipher: Send + Sync + fmt::Debug {
    /// Algorithm name, for logs
    fn name(&self) -> &'static str;

    /// Encrypt and authenticate `plaintext`
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Verify and decrypt output of `seal`
    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// AES-256-GCM cipher
#[derive(Clone)]
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    /// Build from raw key material
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build with a fresh random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(key)
    }

    /// Derive the key from a passphrase: SHA-256(label || passphrase)
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::new()
            .chain_update(KEY_LABEL)
            .chain_update(passphrase.as_bytes())
            .finalize();

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self::new(key)
    }
}

impl fmt::Debug for Aes256GcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes256GcmCipher").finish_non_exhaustive()
    }
}

impl Cipher for Aes256GcmCipher {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CodecError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        if sealed.len() < NONCE_SIZE {
            return Err(CodecError::Decrypt);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decrypt)
    }
}
