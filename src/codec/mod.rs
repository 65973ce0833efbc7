//! Codec Module
//!
//! Converts payloads to and from compact, encrypted, text-safe tokens.
//!
//! ## Pipeline
//! ```text
//! encode:  value ─serialize─▶ bytes ─zstd─▶ compressed ─seal─▶ sealed ─base58─▶ token
//! decode:  token ─base58─▶ sealed ─open─▶ compressed ─zstd─▶ bytes ─deserialize─▶ value
//! ```
//!
//! ## Token Format
//! A single Base58 string (Bitcoin alphabet: digits and letters without
//! `0`, `O`, `I`, `l`) over `nonce || ciphertext`. No length or version
//! prefix; both ends must be built with the same codec settings.
//!
//! Each stage reports its own `CodecError` variant and a failure at any
//! stage aborts the whole call.

mod cipher;
mod compression;
mod format;

use std::env;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use cipher::{Aes256GcmCipher, Cipher, KEY_SIZE, NONCE_SIZE};
pub use compression::{compress, decompress, DEFAULT_LEVEL};
pub use format::Format;

use crate::config::SECRET_ENV;
use crate::error::{CodecError, PersistError, Result};

/// Sealed-token codec
///
/// Cheap to clone; the cipher is shared.
#[derive(Debug, Clone)]
pub struct Codec {
    cipher: Arc<dyn Cipher>,
    level: i32,
}

impl Codec {
    /// Codec over an explicit cipher strategy
    pub fn new(cipher: impl Cipher + 'static) -> Self {
        Self {
            cipher: Arc::new(cipher),
            level: DEFAULT_LEVEL,
        }
    }

    /// AES-256-GCM codec keyed from a passphrase
    pub fn with_passphrase(passphrase: &str) -> Self {
        Self::new(Aes256GcmCipher::from_passphrase(passphrase))
    }

    /// AES-256-GCM codec with a random key (tokens only decode in this process)
    pub fn ephemeral() -> Self {
        Self::new(Aes256GcmCipher::generate())
    }

    /// AES-256-GCM codec keyed from `PERSISTKV_SECRET`
    pub fn from_env() -> Result<Self> {
        match env::var(SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => Ok(Self::with_passphrase(&secret)),
            _ => Err(PersistError::Config(format!("{} is not set", SECRET_ENV))),
        }
    }

    /// Override the zstd compression level
    pub fn compression_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Name of the cipher in use
    pub fn cipher_name(&self) -> &'static str {
        self.cipher.name()
    }

    // =========================================================================
    // Raw Bytes
    // =========================================================================

    /// compress → seal → base58
    pub fn encode(&self, payload: &[u8]) -> std::result::Result<String, CodecError> {
        let compressed = compress(payload, self.level)?;
        let sealed = self.cipher.seal(&compressed)?;
        Ok(bs58::encode(sealed).into_string())
    }

    /// base58 → open → decompress
    pub fn decode(&self, token: &str) -> std::result::Result<Vec<u8>, CodecError> {
        let sealed = bs58::decode(token).into_vec()?;
        let compressed = self.cipher.open(&sealed)?;
        decompress(&compressed)
    }

    // =========================================================================
    // Typed Values
    // =========================================================================

    /// serialize (tagged with `format`) → encode
    pub fn encode_struct<T: Serialize + ?Sized>(
        &self,
        value: &T,
        format: Format,
    ) -> std::result::Result<String, CodecError> {
        let bytes = format.serialize_tagged(value)?;
        self.encode(&bytes)
    }

    /// decode → deserialize; fails if the token was written with another format
    pub fn decode_struct<T: DeserializeOwned>(
        &self,
        token: &str,
        format: Format,
    ) -> std::result::Result<T, CodecError> {
        let bytes = self.decode(token)?;
        format.deserialize_tagged(&bytes)
    }
}
