//! Container Module
//!
//! A `Container<T>` owns one value bound to a bucket/key and keeps the
//! stored copy in sync without explicit save calls.
//!
//! ## Responsibilities
//! - Hand out mutable access to the live value
//! - Keep a private snapshot of the last persisted state
//! - Diff live against snapshot on a background thread and persist changes
//! - Report background failures without stopping
//!
//! ## Diff Loop
//! ```text
//!   every poll_interval ──▶ check_interval elapsed? ──no──▶ sleep
//!                                   │ yes
//!                                   ▼
//!                          live == snapshot? ──yes──▶ sleep
//!                                   │ no
//!                                   ▼
//!           fetch stored ─▶ encode live ─▶ put ─▶ snapshot = live
//!                                   │ error
//!                                   ▼
//!                 SaveFailed ─▶ tracing + error channel, retry next tick
//! ```
//!
//! The loop exits when the bound `Context` is cancelled, the container is
//! stopped or dropped, or the store is closed. A persist cycle in progress
//! always finishes first.

mod encoding;

pub use encoding::Encoding;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, select, Receiver, Sender};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::codec::{Codec, Format};
use crate::config::ContainerConfig;
use crate::context::Context;
use crate::error::{PersistError, Result};
use crate::store::Store;

/// Values a container can track
///
/// Change detection is structural equality against the last persisted
/// snapshot, so `PartialEq` must compare every field that matters.
pub trait Tracked: Clone + PartialEq + Serialize + DeserializeOwned + Send + 'static {}

impl<T> Tracked for T where T: Clone + PartialEq + Serialize + DeserializeOwned + Send + 'static {}

// =============================================================================
// Shared State
// =============================================================================

struct State<T> {
    live: T,
    snapshot: T,
    modified: bool,
    saved: bool,
    last_check: Option<Instant>,
}

struct Shared<T> {
    id: Uuid,
    created_at: DateTime<Utc>,
    store: Store,
    bucket: String,
    key: String,
    encoding: Encoding,
    check_interval: Duration,
    errors: Option<Sender<PersistError>>,
    state: Mutex<State<T>>,
}

impl<T: Tracked> Shared<T> {
    /// One background cycle. Returns false when the loop should exit.
    fn on_tick(&self) -> bool {
        let mut state = self.state.lock();

        let now = Instant::now();
        if let Some(last) = state.last_check {
            if now.duration_since(last) < self.check_interval {
                return true;
            }
        }
        state.last_check = Some(now);

        if state.live == state.snapshot {
            return true;
        }
        state.modified = true;

        match self.persist(&mut state) {
            Ok(()) => true,
            Err(PersistError::Closed) => {
                tracing::debug!("Container {} stopping: store closed", self.id);
                false
            }
            Err(err) => {
                self.report(err);
                true
            }
        }
    }

    /// Fetch, encode, write. Caller holds the state lock.
    ///
    /// Any record already under the key is fetched first; one that differs
    /// from the last snapshot (or does not decode) is logged, then overwritten.
    fn persist(&self, state: &mut State<T>) -> Result<()> {
        if let Some(bytes) = self.store.get(&self.bucket, &self.key)? {
            match self.encoding.decode::<T>(&bytes) {
                Ok(stored) if stored != state.snapshot => tracing::warn!(
                    "Container {} overwriting {}/{} changed by another writer",
                    self.id,
                    self.bucket,
                    self.key
                ),
                Ok(_) => {}
                Err(err) => tracing::warn!(
                    "Container {} overwriting undecodable {}/{}: {}",
                    self.id,
                    self.bucket,
                    self.key,
                    err
                ),
            }
        }

        let bytes = self.encoding.encode(&state.live)?;
        self.store.put(&self.bucket, &self.key, &bytes)?;

        state.snapshot = state.live.clone();
        state.modified = false;
        state.saved = true;
        tracing::trace!("Container {} persisted {} bytes", self.id, bytes.len());
        Ok(())
    }

    fn report(&self, err: PersistError) {
        let err = PersistError::SaveFailed {
            container: self.id.to_string(),
            source: Box::new(err),
        };
        tracing::warn!("{}", err);
        if let Some(errors) = &self.errors {
            let _ = errors.try_send(err);
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and starts a `Container`
pub struct ContainerBuilder {
    store: Store,
    bucket: String,
    key: String,
    config: ContainerConfig,
    encoding: Encoding,
    errors: Option<Sender<PersistError>>,
}

impl ContainerBuilder {
    /// Builder for a container stored under `bucket`/`key`
    pub fn new(store: Store, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            config: ContainerConfig::default(),
            encoding: Encoding::default(),
            errors: None,
        }
    }

    /// Loop timing
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Serialization format of the stored value (default MessagePack)
    pub fn format(mut self, format: Format) -> Self {
        self.encoding = self.encoding.with_format(format);
        self
    }

    /// Store the value as a sealed codec token instead of plain bytes
    pub fn sealed(mut self, codec: Codec) -> Self {
        let format = self.encoding.format();
        self.encoding = Encoding::Sealed { codec, format };
        self
    }

    /// Receive background save failures on `errors`
    ///
    /// Sends never block; errors are dropped while the channel is full.
    pub fn errors(mut self, errors: Sender<PersistError>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Start tracking `value`
    ///
    /// Nothing is written until the value changes or `save` is called.
    pub fn spawn<T: Tracked>(self, ctx: &Context, value: T) -> Result<Container<T>> {
        self.start(ctx, value, false)
    }

    /// Start from the stored value if there is one, else from `default`
    pub fn restore_or<T: Tracked>(self, ctx: &Context, default: T) -> Result<Container<T>> {
        match self.store.get(&self.bucket, &self.key)? {
            Some(bytes) => {
                let value = self.encoding.decode(&bytes)?;
                tracing::debug!("Restored container value from {}/{}", self.bucket, self.key);
                self.start(ctx, value, true)
            }
            None => self.start(ctx, default, false),
        }
    }

    fn start<T: Tracked>(self, ctx: &Context, value: T, saved: bool) -> Result<Container<T>> {
        let id = Uuid::new_v4();
        let shared = Arc::new(Shared {
            id,
            created_at: Utc::now(),
            store: self.store,
            bucket: self.bucket,
            key: self.key,
            encoding: self.encoding,
            check_interval: self.config.check_interval,
            errors: self.errors,
            state: Mutex::new(State {
                snapshot: value.clone(),
                live: value,
                modified: false,
                saved,
                last_check: None,
            }),
        });

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let worker = {
            let shared = Arc::clone(&shared);
            let ctx = ctx.clone();
            let poll = self.config.poll_interval;
            thread::Builder::new()
                .name(format!("persistkv-container-{}", id.simple()))
                .spawn(move || run(shared, ctx, poll, stop_rx))?
        };

        tracing::debug!(
            "Container {} tracking {}/{}",
            id,
            shared.bucket,
            shared.key
        );

        Ok(Container {
            shared,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }
}

// =============================================================================
// Container
// =============================================================================

/// A value that persists itself when it changes
///
/// ```text
/// let person = Container::new(&ctx, store, "people", "wick", john)?;
/// person.value().age = 43;   // stored within a couple of poll ticks
/// ```
pub struct Container<T: Tracked> {
    shared: Arc<Shared<T>>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Tracked> Container<T> {
    /// Track `value` under `bucket`/`key` with default settings
    pub fn new(
        ctx: &Context,
        store: Store,
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: T,
    ) -> Result<Self> {
        ContainerBuilder::new(store, bucket, key).spawn(ctx, value)
    }

    /// Persist now if the value changed or was never written
    ///
    /// Shares the lock with the background loop, so the two never race.
    pub fn save(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.live != state.snapshot {
            state.modified = true;
        }
        if !state.modified && state.saved {
            return Ok(());
        }
        self.shared.persist(&mut state)
    }

    /// Whether the live value differs from what was last persisted
    pub fn is_modified(&self) -> bool {
        let state = self.shared.state.lock();
        state.modified || state.live != state.snapshot
    }

    /// Whether the value has been written at least once
    pub fn is_saved(&self) -> bool {
        self.shared.state.lock().saved
    }

    /// Mutable access to the live value
    ///
    /// The background loop waits while the guard is held.
    pub fn value(&self) -> MappedMutexGuard<'_, T> {
        MutexGuard::map(self.shared.state.lock(), |state| &mut state.live)
    }

    /// Copy of the live value
    pub fn get(&self) -> T {
        self.shared.state.lock().live.clone()
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    pub fn bucket(&self) -> &str {
        &self.shared.bucket
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    /// Stop the background loop and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Container {} thread panicked", self.shared.id);
            }
        }
    }
}

impl<T: Tracked> Drop for Container<T> {
    fn drop(&mut self) {
        // Disconnecting the stop channel ends the loop; not joined.
        self.stop_tx.take();
    }
}

impl<T: Tracked> std::fmt::Debug for Container<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.shared.id)
            .field("bucket", &self.shared.bucket)
            .field("key", &self.shared.key)
            .finish_non_exhaustive()
    }
}

fn run<T: Tracked>(shared: Arc<Shared<T>>, ctx: Context, poll: Duration, stop: Receiver<()>) {
    let ticker = channel::tick(poll);

    loop {
        select! {
            recv(ticker) -> _ => {
                if !shared.on_tick() {
                    break;
                }
            }
            recv(ctx.done()) -> _ => break,
            recv(stop) -> _ => break,
        }
    }

    tracing::debug!("Container {} stopped", shared.id);
}
