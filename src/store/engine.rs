//! Engine wrapper
//!
//! Owns the redb database and the store-wide write guard. Transactions run
//! here without any metrics accounting; the `Store` layers accounting on
//! top, while the metrics recorder calls in directly for its checkpoints.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - **update**: serialized by `write_lock`, held for the whole callback
//!   and commit. Acquire order: write_lock → db (read).
//! - **view**: no write_lock; redb MVCC gives each reader a consistent
//!   snapshot, so views run concurrently with each other and with updates.
//! - **close**: write_lock → db (write). Waits for in-flight transactions,
//!   then drops the database, releasing the file.
//!
//! Callbacks must not call back into the same store (the guard is not
//! reentrant).

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use redb::Database;

use crate::config::Config;
use crate::error::{PersistError, Result};

use super::tx::{ReadTx, TxStats, WriteTx};

pub(crate) struct Engine {
    /// Backing file
    path: PathBuf,

    /// `None` once closed
    db: RwLock<Option<Database>>,

    /// Serializes write transactions
    write_lock: Mutex<()>,
}

impl Engine {
    /// Open or create the backing file
    pub(crate) fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut builder = Database::builder();
        if let Some(bytes) = config.cache_size {
            builder.set_cache_size(bytes);
        }

        let db = builder
            .create(&config.path)
            .map_err(|source| PersistError::Open {
                path: config.path.clone(),
                source,
            })?;

        tracing::debug!("Opened store at {}", config.path.display());

        Ok(Self {
            path: config.path.clone(),
            db: RwLock::new(Some(db)),
            write_lock: Mutex::new(()),
        })
    }

    /// Run `f` in a read-write transaction; commit on Ok, roll back on Err
    pub(crate) fn update<T, F>(&self, f: F) -> Result<(T, TxStats)>
    where
        F: FnOnce(&WriteTx<'_>) -> Result<T>,
    {
        let _write_guard = self.write_lock.lock();

        let guard = self.db.read();
        let db = guard.as_ref().ok_or(PersistError::Closed)?;

        let txn = db.begin_write()?;
        let outcome = {
            let tx = WriteTx::new(&txn);
            f(&tx).map(|value| (value, tx.stats()))
        };

        match outcome {
            Ok(done) => {
                txn.commit()?;
                Ok(done)
            }
            Err(err) => {
                if let Err(abort_err) = txn.abort() {
                    tracing::warn!("Rollback failed after {}: {}", err, abort_err);
                }
                Err(err)
            }
        }
    }

    /// Run `f` in a read-only snapshot transaction
    pub(crate) fn view<T, F>(&self, f: F) -> Result<(T, TxStats)>
    where
        F: FnOnce(&ReadTx<'_>) -> Result<T>,
    {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(PersistError::Closed)?;

        let txn = db.begin_read()?;
        let tx = ReadTx::new(&txn);
        let value = f(&tx)?;
        Ok((value, tx.stats()))
    }

    /// Release the backing file. Idempotent.
    pub(crate) fn close(&self) {
        let _write_guard = self.write_lock.lock();
        if self.db.write().take().is_some() {
            tracing::debug!("Closed store at {}", self.path.display());
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
