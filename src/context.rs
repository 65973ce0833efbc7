//! Cancellation Context
//!
//! Background loops (metrics checkpointing, container diffing) are bound to
//! a `Context`. Cancelling it disconnects the `done` channel, which wakes
//! every `select!` waiting on it.
//!
//! ```text
//! let (ctx, cancel) = Context::with_cancel();
//! let store = Store::open(&ctx, config)?;
//! ...
//! cancel.cancel();   // every loop bound to ctx exits after its current cycle
//! ```

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;

/// A cloneable cancellation signal
#[derive(Debug, Clone)]
pub struct Context {
    done: Receiver<()>,
}

impl Context {
    /// A context that is never cancelled
    pub fn background() -> Self {
        Self {
            done: channel::never(),
        }
    }

    /// A cancellable context and the handle that cancels it
    ///
    /// Dropping the last clone of the handle also cancels the context.
    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = channel::bounded(0);
        (
            Self { done: rx },
            CancelHandle {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
        )
    }

    /// Channel that becomes ready (disconnected) on cancellation
    ///
    /// Only ever disconnects; nothing is sent on it.
    pub fn done(&self) -> &Receiver<()> {
        &self.done
    }

    /// Whether the context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

/// Cancels the paired Context
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl CancelHandle {
    /// Cancel the context. Idempotent.
    pub fn cancel(&self) {
        self.tx.lock().take();
    }
}
