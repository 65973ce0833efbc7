//! Configuration for persistkv
//!
//! Centralized configuration with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PersistError, Result};

/// Environment variable naming the backing file
pub const DATABASE_PATH_ENV: &str = "PERSISTKV_DATABASE_PATH";

/// Environment variable holding the codec passphrase
pub const SECRET_ENV: &str = "PERSISTKV_SECRET";

/// Main configuration for a Store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the backing redb file (created if missing)
    pub path: PathBuf,

    /// Page cache size handed to the engine (bytes). `None` uses redb's default.
    pub cache_size: Option<usize>,

    // -------------------------------------------------------------------------
    // Metrics Configuration
    // -------------------------------------------------------------------------
    /// Reserved bucket holding the metrics snapshot
    pub metrics_bucket: String,

    /// Key of the snapshot inside the metrics bucket
    pub metrics_key: String,

    /// Checkpoint interval; windowed rates reset on each tick
    pub metrics_interval: Duration,

    /// Capacity of each byte-count event queue
    pub metrics_queue_capacity: usize,

    // -------------------------------------------------------------------------
    // Batch Configuration
    // -------------------------------------------------------------------------
    /// Max calls coalesced into one batch commit
    pub max_batch_size: usize,

    /// Max time the batch leader waits for more calls
    pub max_batch_delay: Duration,

    // -------------------------------------------------------------------------
    // Codec Configuration
    // -------------------------------------------------------------------------
    /// Passphrase for the store's codec. `None` generates a random key per open,
    /// so sealed bytes written by the object API only decode in the same process.
    pub secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./persistkv.redb"),
            cache_size: None,
            metrics_bucket: "metrics".to_string(),
            metrics_key: "metrics".to_string(),
            metrics_interval: Duration::from_secs(1),
            metrics_queue_capacity: 100,
            max_batch_size: 1000,
            max_batch_delay: Duration::from_millis(10),
            secret: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config with the path and secret taken from the environment
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(path) = env::var(DATABASE_PATH_ENV) {
            if !path.is_empty() {
                config.path = PathBuf::from(path);
            }
        }
        if let Ok(secret) = env::var(SECRET_ENV) {
            if !secret.is_empty() {
                config.secret = Some(secret);
            }
        }
        config
    }

    /// Reject settings the store cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.metrics_bucket.is_empty() || self.metrics_key.is_empty() {
            return Err(PersistError::Config(
                "metrics bucket and key must be non-empty".to_string(),
            ));
        }
        if self.metrics_interval.is_zero() {
            return Err(PersistError::Config(
                "metrics interval must be non-zero".to_string(),
            ));
        }
        if self.metrics_queue_capacity == 0 || self.max_batch_size == 0 {
            return Err(PersistError::Config(
                "queue capacity and batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the engine cache size (in bytes)
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.config.cache_size = Some(bytes);
        self
    }

    /// Set the reserved metrics bucket
    pub fn metrics_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.metrics_bucket = bucket.into();
        self
    }

    /// Set the key of the snapshot inside the metrics bucket
    pub fn metrics_key(mut self, key: impl Into<String>) -> Self {
        self.config.metrics_key = key.into();
        self
    }

    /// Set the metrics checkpoint interval
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    /// Set the byte-count queue capacity
    pub fn metrics_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.metrics_queue_capacity = capacity;
        self
    }

    /// Set the maximum number of calls per batch commit
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Set how long a batch leader waits for followers
    pub fn max_batch_delay(mut self, delay: Duration) -> Self {
        self.config.max_batch_delay = delay;
        self
    }

    /// Set the codec passphrase
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = Some(secret.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Timing for a Container's background diff loop
#[derive(Debug, Clone, Copy)]
pub struct ContainerConfig {
    /// How often the loop wakes
    pub poll_interval: Duration,

    /// Minimum time between two diffs
    pub check_interval: Duration,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            check_interval: Duration::from_secs(1),
        }
    }
}

impl ContainerConfig {
    /// Set the wake interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the minimum diff interval
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}
