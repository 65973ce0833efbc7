//! Metrics Module
//!
//! Live I/O metrics derived from every store transaction, checkpointed into
//! the store they describe.
//!
//! ## Responsibilities
//! - Count reads/writes and read/written bytes (cumulative, never reset)
//! - Track per-interval read/write rates (reset on every checkpoint tick)
//! - Absorb engine transaction statistics
//! - Persist the snapshot as JSON under a reserved bucket/key
//!
//! ## Snapshot Layout
//! ```text
//! {
//!   "uptime": "...", "last_update": "...",
//!   "system_metrics": { "total_buckets", "total_keys", "stats": {...} },
//!   "iops": { "total_reads", "total_writes", "reads_per_second",
//!             "writes_per_second", "total_read_bytes", "total_write_bytes" }
//! }
//! ```

mod recorder;

pub(crate) use recorder::MetricsRecorder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::TxStats;

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// When the recorder started (store open time)
    pub uptime: DateTime<Utc>,

    /// Last time the snapshot was touched
    pub last_update: DateTime<Utc>,

    #[serde(default)]
    pub system_metrics: SystemMetrics,

    #[serde(default)]
    pub iops: Iops,
}

/// Store-wide aggregates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Buckets at the last checkpoint, excluding the metrics bucket
    pub total_buckets: u64,

    /// Keys across those buckets at the last checkpoint
    pub total_keys: u64,

    /// Cumulative engine statistics
    #[serde(default)]
    pub stats: TxStats,
}

/// Operation and byte counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iops {
    pub total_reads: u64,
    pub total_writes: u64,

    /// Reads since the last tick
    pub reads_per_second: u64,

    /// Writes since the last tick
    pub writes_per_second: u64,

    pub total_read_bytes: u64,
    pub total_write_bytes: u64,
}

impl Metrics {
    /// Zeroed snapshot starting now
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            uptime: now,
            last_update: now,
            system_metrics: SystemMetrics::default(),
            iops: Iops::default(),
        }
    }

    /// Continue the cumulative counters of a snapshot from a previous run
    ///
    /// Uptime and the windowed rates are not carried over.
    pub(crate) fn resume_from(&mut self, stored: &Metrics) {
        self.system_metrics = stored.system_metrics.clone();
        self.iops.total_reads = stored.iops.total_reads;
        self.iops.total_writes = stored.iops.total_writes;
        self.iops.total_read_bytes = stored.iops.total_read_bytes;
        self.iops.total_write_bytes = stored.iops.total_write_bytes;
    }

    /// Fold in a stored snapshot without letting any counter go backwards
    pub(crate) fn merge_stored(&mut self, stored: &Metrics) {
        self.system_metrics.total_buckets = stored.system_metrics.total_buckets;
        self.system_metrics.total_keys = stored.system_metrics.total_keys;
        self.system_metrics.stats = self.system_metrics.stats.max(&stored.system_metrics.stats);

        let iops = &mut self.iops;
        iops.total_reads = iops.total_reads.max(stored.iops.total_reads);
        iops.total_writes = iops.total_writes.max(stored.iops.total_writes);
        iops.total_read_bytes = iops.total_read_bytes.max(stored.iops.total_read_bytes);
        iops.total_write_bytes = iops.total_write_bytes.max(stored.iops.total_write_bytes);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
