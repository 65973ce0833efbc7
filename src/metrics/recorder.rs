//! Metrics recorder
//!
//! One recorder per store. Counters live behind a single field lock; byte
//! counts arrive through bounded queues drained by the recorder thread:
//!
//! ```text
//!   Store ops ──record_read/record_write──────────────▶ ┌──────────────┐
//!             ──record_*_bytes──▶ [queue] ──▶ thread ──▶ │ Mutex<Metrics>│
//!                                               │        └──────┬───────┘
//!                                             tick              │ clone + reset rates
//!                                               ▼               ▼
//!                                   count buckets/keys, write JSON snapshot
//! ```
//!
//! The field lock is released before the checkpoint transaction starts, so
//! a checkpoint never blocks a caller that is recording inside its own
//! transaction.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam::channel::{self, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::config::Config;
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::store::engine::Engine;
use crate::store::TxStats;

use super::Metrics;

/// State shared with the recorder thread
struct Shared {
    metrics: Mutex<Metrics>,
    bucket: String,
    key: String,
}

impl Shared {
    fn add_read_bytes(&self, n: u64) {
        let mut m = self.metrics.lock();
        m.iops.total_read_bytes = m.iops.total_read_bytes.saturating_add(n);
    }

    fn add_write_bytes(&self, n: u64) {
        let mut m = self.metrics.lock();
        m.iops.total_write_bytes = m.iops.total_write_bytes.saturating_add(n);
    }

    fn load(&self, engine: &Engine) -> Result<Option<Metrics>> {
        let (stored, _) = engine.view(|tx| tx.get(&self.bucket, self.key.as_bytes()))?;
        match stored {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Snapshot, reset rates, then persist outside the field lock
    fn checkpoint(&self, engine: &Engine) -> Result<()> {
        let mut snapshot = {
            let mut m = self.metrics.lock();
            m.last_update = Utc::now();
            let snapshot = m.clone();
            m.iops.reads_per_second = 0;
            m.iops.writes_per_second = 0;
            snapshot
        };

        let ((buckets, keys), _) = engine.view(|tx| {
            let mut buckets = 0u64;
            let mut keys = 0u64;
            for name in tx.bucket_names()? {
                if name == self.bucket {
                    continue;
                }
                buckets += 1;
                keys += tx.bucket_len(&name)?;
            }
            Ok((buckets, keys))
        })?;

        {
            let mut m = self.metrics.lock();
            m.system_metrics.total_buckets = buckets;
            m.system_metrics.total_keys = keys;
        }
        snapshot.system_metrics.total_buckets = buckets;
        snapshot.system_metrics.total_keys = keys;

        let json = serde_json::to_vec(&snapshot)?;
        engine.update(|tx| tx.put(&self.bucket, self.key.as_bytes(), &json))?;

        tracing::trace!(
            "Metrics checkpoint: {} buckets, {} keys, {} writes",
            buckets,
            keys,
            snapshot.iops.total_writes
        );
        Ok(())
    }
}

/// Records store activity and checkpoints it on a timer
pub(crate) struct MetricsRecorder {
    shared: Arc<Shared>,
    read_bytes_tx: Sender<u64>,
    write_bytes_tx: Sender<u64>,
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsRecorder {
    /// Load any previous snapshot and start the recorder thread
    ///
    /// The thread holds only a weak engine reference and exits once the
    /// engine is gone, the store is closed, `ctx` is cancelled, or `stop`
    /// is called.
    pub(crate) fn start(ctx: &Context, engine: &Arc<Engine>, config: &Config) -> Result<Self> {
        let shared = Arc::new(Shared {
            metrics: Mutex::new(Metrics::new()),
            bucket: config.metrics_bucket.clone(),
            key: config.metrics_key.clone(),
        });

        match shared.load(engine) {
            Ok(Some(stored)) => {
                shared.metrics.lock().resume_from(&stored);
                tracing::debug!(
                    "Resumed metrics: {} reads, {} writes",
                    stored.iops.total_reads,
                    stored.iops.total_writes
                );
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Ignoring unreadable metrics snapshot: {}", err),
        }

        let (read_bytes_tx, read_bytes_rx) = channel::bounded(config.metrics_queue_capacity);
        let (write_bytes_tx, write_bytes_rx) = channel::bounded(config.metrics_queue_capacity);
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let worker = {
            let shared = Arc::clone(&shared);
            let engine = Arc::downgrade(engine);
            let ctx = ctx.clone();
            let interval = config.metrics_interval;
            thread::Builder::new()
                .name("persistkv-metrics".to_string())
                .spawn(move || {
                    run(
                        shared,
                        engine,
                        ctx,
                        interval,
                        read_bytes_rx,
                        write_bytes_rx,
                        stop_rx,
                    )
                })?
        };

        Ok(Self {
            shared,
            read_bytes_tx,
            write_bytes_tx,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    // =========================================================================
    // Recording
    // =========================================================================

    pub(crate) fn record_read(&self) {
        let mut m = self.shared.metrics.lock();
        m.iops.total_reads += 1;
        m.iops.reads_per_second += 1;
    }

    pub(crate) fn record_write(&self) {
        let mut m = self.shared.metrics.lock();
        m.iops.total_writes += 1;
        m.iops.writes_per_second += 1;
    }

    /// Queue a read-bytes increment; applied inline when the queue is full
    pub(crate) fn record_read_bytes(&self, n: u64) {
        if n == 0 {
            return;
        }
        match self.read_bytes_tx.try_send(n) {
            Ok(()) => {}
            Err(TrySendError::Full(n) | TrySendError::Disconnected(n)) => {
                self.shared.add_read_bytes(n)
            }
        }
    }

    /// Queue a write-bytes increment; applied inline when the queue is full
    pub(crate) fn record_write_bytes(&self, n: u64) {
        if n == 0 {
            return;
        }
        match self.write_bytes_tx.try_send(n) {
            Ok(()) => {}
            Err(TrySendError::Full(n) | TrySendError::Disconnected(n)) => {
                self.shared.add_write_bytes(n)
            }
        }
    }

    pub(crate) fn update_from_transaction_stats(&self, stats: &TxStats) {
        self.shared.metrics.lock().system_metrics.stats.absorb(stats);
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Current snapshot, reconciled with the persisted one
    ///
    /// Counts as a read and refreshes `last_update`.
    pub(crate) fn current_snapshot(&self, engine: &Engine) -> Result<Metrics> {
        let stored = match self.shared.load(engine) {
            Ok(stored) => stored,
            Err(PersistError::Serialization(msg)) => {
                tracing::warn!("Ignoring unreadable metrics snapshot: {}", msg);
                None
            }
            Err(err) => return Err(err),
        };

        let mut m = self.shared.metrics.lock();
        if let Some(stored) = stored {
            m.merge_stored(&stored);
        }
        m.iops.total_reads += 1;
        m.last_update = Utc::now();
        Ok(m.clone())
    }

    /// Persist the snapshot now
    pub(crate) fn checkpoint(&self, engine: &Engine) -> Result<()> {
        self.shared.checkpoint(engine)
    }

    /// Stop the recorder thread and wait for it. Idempotent.
    pub(crate) fn stop(&self) {
        self.stop_tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("Metrics thread panicked");
            }
        }
    }
}

// =============================================================================
// Recorder Thread
// =============================================================================

fn run(
    shared: Arc<Shared>,
    engine: Weak<Engine>,
    ctx: Context,
    interval: Duration,
    read_bytes: Receiver<u64>,
    write_bytes: Receiver<u64>,
    stop: Receiver<()>,
) {
    let ticker = channel::tick(interval);
    tracing::debug!("Metrics recorder started (interval {:?})", interval);

    loop {
        select! {
            recv(ticker) -> _ => {
                let engine = match engine.upgrade() {
                    Some(engine) => engine,
                    None => break,
                };
                match shared.checkpoint(&engine) {
                    Ok(()) => {}
                    Err(PersistError::Closed) => break,
                    Err(err) => tracing::warn!("Metrics checkpoint failed: {}", err),
                }
            }
            recv(read_bytes) -> msg => match msg {
                Ok(n) => shared.add_read_bytes(n),
                Err(_) => break,
            },
            recv(write_bytes) -> msg => match msg {
                Ok(n) => shared.add_write_bytes(n),
                Err(_) => break,
            },
            recv(ctx.done()) -> _ => break,
            recv(stop) -> _ => break,
        }
    }

    while let Ok(n) = read_bytes.try_recv() {
        shared.add_read_bytes(n);
    }
    while let Ok(n) = write_bytes.try_recv() {
        shared.add_write_bytes(n);
    }

    tracing::debug!("Metrics recorder stopped");
}
