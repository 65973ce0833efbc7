//! Error types for persistkv
//!
//! Provides a unified error type for store, container and metrics
//! operations, plus a stage-typed error for the codec pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using PersistError
pub type Result<T> = std::result::Result<T, PersistError>;

/// Unified error type for persistkv operations
#[derive(Debug, Error)]
pub enum PersistError {
    // -------------------------------------------------------------------------
    // Open Errors
    // -------------------------------------------------------------------------
    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: redb::DatabaseError,
    },

    #[error("store is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("engine error: {0}")]
    Engine(#[from] redb::Error),

    #[error("transaction aborted: {0}")]
    Aborted(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("no value for key {key:?} in bucket {bucket:?}")]
    NotFound { bucket: String, key: String },

    // -------------------------------------------------------------------------
    // Encoding Errors
    // -------------------------------------------------------------------------
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Container Errors
    // -------------------------------------------------------------------------
    #[error("container {container} failed to persist: {source}")]
    SaveFailed {
        container: String,
        #[source]
        source: Box<PersistError>,
    },

    // -------------------------------------------------------------------------
    // Misc
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PersistError {
    /// Whether this error means "no data" rather than "operation failed"
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::NotFound { .. })
    }
}

// redb splits its failures across several error types; all of them funnel
// into `redb::Error`.
macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PersistError {
                fn from(err: $ty) -> Self {
                    PersistError::Engine(redb::Error::from(err))
                }
            }
        )*
    };
}

engine_error!(
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        PersistError::Serialization(err.to_string())
    }
}

/// Codec pipeline failures, one variant per stage
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialize failed: {0}")]
    Serialize(String),

    #[error("compress failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("encrypt failed")]
    Encrypt,

    #[error("malformed token: {0}")]
    Alphabet(#[from] bs58::decode::Error),

    #[error("decrypt failed: wrong key or corrupted ciphertext")]
    Decrypt,

    #[error("decompress failed: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("deserialize failed: {0}")]
    Deserialize(String),

    #[error("format mismatch: payload is {found}, expected {expected}")]
    FormatMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

impl CodecError {
    /// The pipeline stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            CodecError::Serialize(_) => Stage::Serialize,
            CodecError::Compress(_) => Stage::Compress,
            CodecError::Encrypt => Stage::Encrypt,
            CodecError::Alphabet(_) => Stage::Alphabet,
            CodecError::Decrypt => Stage::Decrypt,
            CodecError::Decompress(_) => Stage::Decompress,
            CodecError::Deserialize(_) | CodecError::FormatMismatch { .. } => Stage::Deserialize,
        }
    }
}

/// Stages of the codec pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Serialize,
    Compress,
    Encrypt,
    Alphabet,
    Decrypt,
    Decompress,
    Deserialize,
}
