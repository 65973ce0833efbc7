//! Store Module
//!
//! Transactional key/value storage over one redb file.
//!
//! ## Responsibilities
//! - Atomic `update` / `view` / `batch` transactions
//! - Feed every successful transaction into the metrics recorder
//! - Bucket-level helpers (put, get, list, delete)
//! - Object API: MessagePack + zstd wrapped payloads
//!
//! ```text
//!            ┌──────────── Store (Clone) ────────────┐
//!  update ──▶│ write_lock ─▶ redb write txn ─▶ commit │──▶ record write
//!  batch  ──▶│ Batcher ───▶ one write txn per window  │──▶ record write
//!  view   ──▶│ redb read txn (MVCC snapshot)          │──▶ record read
//!            └──────────────────┬─────────────────────┘
//!                               │ tick
//!                      MetricsRecorder checkpoint
//! ```

mod batch;
pub(crate) mod engine;
mod key;
mod object;
mod tx;

pub use key::{generate_key, Key, KEY_LENGTH};
pub use object::WrappedPayload;
pub use tx::{ReadTx, TxStats, WriteTx};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::config::Config;
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::metrics::{Metrics, MetricsRecorder};

use batch::Batcher;
use engine::Engine;
use key::batch_entry_key;

/// Handle to an open store
///
/// Clones share the same file, write guard and recorder. Closing any clone
/// closes the store for all of them.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: Config,
    engine: Arc<Engine>,
    recorder: MetricsRecorder,
    batcher: Batcher,
    codec: Codec,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.recorder.stop();
        if !self.engine.is_closed() {
            if let Err(err) = self.recorder.checkpoint(&self.engine) {
                tracing::warn!("Final metrics checkpoint failed: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.engine.path())
            .field("closed", &self.inner.engine.is_closed())
            .finish()
    }
}

impl Store {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open or create the store described by `config`
    ///
    /// The metrics recorder runs until `ctx` is cancelled or the store is
    /// closed or dropped.
    pub fn open(ctx: &Context, config: Config) -> Result<Self> {
        config.validate()?;

        let engine = Arc::new(Engine::open(&config)?);
        let recorder = MetricsRecorder::start(ctx, &engine, &config)?;
        let batcher = Batcher::new(config.max_batch_size, config.max_batch_delay);
        let codec = match &config.secret {
            Some(secret) => Codec::with_passphrase(secret),
            None => Codec::ephemeral(),
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                config,
                engine,
                recorder,
                batcher,
                codec,
            }),
        })
    }

    /// Open with default settings at `path`
    pub fn open_path(ctx: &Context, path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(ctx, Config::builder().path(path).build())
    }

    /// Checkpoint metrics and release the file
    ///
    /// Every clone reports `Closed` afterwards. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.engine.is_closed() {
            return Ok(());
        }

        self.inner.recorder.stop();
        let checkpoint = self.inner.recorder.checkpoint(&self.inner.engine);
        self.inner.engine.close();

        match checkpoint {
            Err(PersistError::Closed) => Ok(()),
            other => other,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.engine.is_closed()
    }

    pub fn path(&self) -> &Path {
        self.inner.engine.path()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Codec used for the sealed copy inside wrapped payloads
    pub fn codec(&self) -> &Codec {
        &self.inner.codec
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` in a read-write transaction
    ///
    /// Updates are serialized; `f` holds the write guard until it returns.
    /// Returning `Err` rolls back every change `f` made.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTx<'_>) -> Result<T>,
    {
        let (value, stats) = self.inner.engine.update(f)?;
        self.record_write(&stats);
        Ok(value)
    }

    /// Run `f` against a consistent read-only snapshot
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T>,
    {
        let (value, stats) = self.inner.engine.view(f)?;
        let recorder = &self.inner.recorder;
        recorder.record_read();
        recorder.record_read_bytes(stats.bytes_read);
        recorder.update_from_transaction_stats(&stats);
        Ok(value)
    }

    /// Run `f` in a write transaction shared with concurrent `batch` callers
    ///
    /// `f` may run more than once if another call in the same batch fails,
    /// so it must be idempotent.
    pub fn batch<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&WriteTx<'_>) -> Result<()> + Send + 'static,
    {
        let stats = self
            .inner
            .batcher
            .submit(&self.inner.engine, Box::new(f))?;
        self.record_write(&stats);
        Ok(())
    }

    fn record_write(&self, stats: &TxStats) {
        let recorder = &self.inner.recorder;
        recorder.record_write();
        recorder.record_write_bytes(stats.bytes_written);
        recorder.update_from_transaction_stats(stats);
    }

    // =========================================================================
    // Key/Value Operations
    // =========================================================================

    /// Insert or overwrite a value, creating the bucket if needed
    pub fn put(&self, bucket: &str, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.update(|tx| tx.put(bucket, key.as_ref(), value.as_ref()))
    }

    /// Read a value; `None` when the bucket or key does not exist
    pub fn get(&self, bucket: &str, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.view(|tx| tx.get(bucket, key.as_ref()))
    }

    /// Remove a key. Missing buckets and keys are not an error.
    pub fn delete_key(&self, bucket: &str, key: impl AsRef<[u8]>) -> Result<()> {
        self.update(|tx| tx.delete(bucket, key.as_ref()).map(|_| ()))
    }

    /// Drop a bucket with all its entries. A missing bucket is not an error.
    pub fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.update(|tx| tx.delete_bucket(bucket).map(|_| ()))
    }

    /// Store `values` as `key-000000`, `key-000001`, ... in one batch
    pub fn put_batch(&self, bucket: &str, key: &str, values: Vec<Vec<u8>>) -> Result<()> {
        let bucket = bucket.to_string();
        let prefix = key.to_string();
        self.batch(move |tx| {
            tx.create_bucket_if_not_exists(&bucket)?;
            for (index, value) in values.iter().enumerate() {
                tx.put(&bucket, batch_entry_key(&prefix, index).as_bytes(), value)?;
            }
            Ok(())
        })
    }

    /// All keys of a bucket in key order (empty when the bucket is absent)
    pub fn list_keys(&self, bucket: &str) -> Result<Vec<Key>> {
        self.view(|tx| {
            let mut keys = Vec::new();
            tx.for_each(bucket, |k, _| {
                keys.push(Key::from(k));
                Ok(())
            })?;
            Ok(keys)
        })
    }

    /// All values of a bucket in key order
    pub fn list_values(&self, bucket: &str) -> Result<Vec<Vec<u8>>> {
        self.view(|tx| {
            let mut values = Vec::new();
            tx.for_each(bucket, |_, v| {
                values.push(v.to_vec());
                Ok(())
            })?;
            Ok(values)
        })
    }

    /// Keys and values of a bucket as parallel vectors, in key order
    pub fn list_keys_and_values(&self, bucket: &str) -> Result<(Vec<Key>, Vec<Vec<u8>>)> {
        self.view(|tx| {
            let mut keys = Vec::new();
            let mut values = Vec::new();
            tx.for_each(bucket, |k, v| {
                keys.push(Key::from(k));
                values.push(v.to_vec());
                Ok(())
            })?;
            Ok((keys, values))
        })
    }

    /// Names of all buckets, including the metrics bucket once checkpointed
    pub fn list_buckets(&self) -> Result<Vec<String>> {
        self.view(|tx| tx.bucket_names())
    }

    pub fn contains_bucket(&self, bucket: &str) -> Result<bool> {
        self.view(|tx| tx.contains_bucket(bucket))
    }

    // =========================================================================
    // Object API
    // =========================================================================

    /// Wrap `value` in a `WrappedPayload` and store it as compressed JSON
    pub fn put_object<T: Serialize>(&self, bucket: &str, key: &str, value: &T) -> Result<()> {
        let payload = WrappedPayload::new(&self.inner.codec, value)?;
        let bytes = object::wrap(&payload)?;
        self.put(bucket, key, bytes)
    }

    /// Load a payload written by `put_object`
    ///
    /// Returns `NotFound` when the bucket or key does not exist.
    pub fn get_object<T: DeserializeOwned>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<WrappedPayload<T>> {
        let bytes = self
            .get(bucket, key)?
            .ok_or_else(|| PersistError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        object::unwrap_payload(&bytes)
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    /// Current metrics, reconciled with the last persisted snapshot
    pub fn metrics(&self) -> Result<Metrics> {
        self.inner.recorder.current_snapshot(&self.inner.engine)
    }
}
