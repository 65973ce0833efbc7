//! # persistkv
//!
//! Durable, transactional key/value storage with:
//! - Atomic update / view / batch transactions over one redb file
//! - Live I/O metrics, checkpointed into the store they describe
//! - Self-persisting containers that save values when they change
//! - A sealed codec: serialize → zstd → AES-256-GCM → Base58
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Container<T> (diff loop)                     │
//! │        live value ── snapshot ── persist on change           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ put / get
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Store                                 │
//! │       (Single Writer / Multi Reader, batch coalescing)       │
//! └──────────┬──────────────────────────────┬───────────────────┘
//!            │                              │
//!            ▼                              ▼
//!   ┌─────────────────┐            ┌──────────────────┐
//!   │  redb Database  │◀─checkpoint│ MetricsRecorder  │
//!   │    (buckets)    │            │  (ticker thread) │
//!   └─────────────────┘            └──────────────────┘
//!
//!   Codec: shared token format for containers and wrapped payloads
//! ```
//!
//! Background threads are bound to a [`Context`]; cancelling it stops them.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod codec;
pub mod metrics;
pub mod store;
pub mod container;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CodecError, PersistError, Result};
pub use config::{Config, ContainerConfig};
pub use context::{CancelHandle, Context};
pub use codec::{Codec, Format};
pub use metrics::Metrics;
pub use store::{generate_key, Key, ReadTx, Store, TxStats, WrappedPayload, WriteTx};
pub use container::{Container, ContainerBuilder, Encoding, Tracked};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of persistkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
