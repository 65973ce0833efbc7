//! Batch coalescing
//!
//! Concurrent `Store::batch` calls are grouped into one write transaction:
//!
//! 1. The first caller in a window becomes the leader and opens a batch.
//! 2. Later callers append to it. The caller that fills it to
//!    `max_size` takes it and runs it immediately.
//! 3. Otherwise the leader waits `max_delay`, then takes and runs it.
//! 4. Every caller blocks on its own reply channel.
//!
//! If a call fails the whole transaction rolls back; the failing call is
//! re-run alone so its error reaches only its caller, and the rest are
//! retried together. Calls may therefore run more than once.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{PersistError, Result};

use super::engine::Engine;
use super::tx::{TxStats, WriteTx};

/// A batch callback. `Fn` because a call may be retried.
pub(crate) type BatchFn = Box<dyn Fn(&WriteTx<'_>) -> Result<()> + Send>;

struct Call {
    run: BatchFn,
    reply: Sender<Result<TxStats>>,
}

struct Pending {
    id: u64,
    calls: Vec<Call>,
    full: Sender<()>,
}

pub(crate) struct Batcher {
    pending: Mutex<Option<Pending>>,
    next_id: Mutex<u64>,
    max_size: usize,
    max_delay: Duration,
}

impl Batcher {
    pub(crate) fn new(max_size: usize, max_delay: Duration) -> Self {
        Self {
            pending: Mutex::new(None),
            next_id: Mutex::new(0),
            max_size: max_size.max(1),
            max_delay,
        }
    }

    /// Queue `run` and block until the batch holding it has committed
    ///
    /// Returns the statistics of this call's own writes.
    pub(crate) fn submit(&self, engine: &Engine, run: BatchFn) -> Result<TxStats> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let call = Call {
            run,
            reply: reply_tx,
        };

        let mut lead: Option<(u64, Receiver<()>)> = None;
        let mut ready: Option<Vec<Call>> = None;
        {
            let mut pending = self.pending.lock();
            let batch = pending.get_or_insert_with(|| {
                let id = {
                    let mut next = self.next_id.lock();
                    *next += 1;
                    *next
                };
                let (full_tx, full_rx) = channel::bounded(1);
                lead = Some((id, full_rx));
                Pending {
                    id,
                    calls: Vec::new(),
                    full: full_tx,
                }
            });

            batch.calls.push(call);

            if batch.calls.len() >= self.max_size {
                if let Some(batch) = pending.take() {
                    let _ = batch.full.try_send(());
                    ready = Some(batch.calls);
                }
            }
        }

        if let Some(calls) = ready {
            tracing::trace!("Running full batch of {} calls", calls.len());
            Self::run(engine, calls);
        } else if let Some((id, full_rx)) = lead {
            // Woken early when another caller fills and takes the batch.
            let _ = full_rx.recv_timeout(self.max_delay);

            let calls = {
                let mut pending = self.pending.lock();
                match pending.as_ref() {
                    Some(batch) if batch.id == id => pending.take().map(|b| b.calls),
                    _ => None,
                }
            };
            if let Some(calls) = calls {
                tracing::trace!("Running batch {} with {} calls", id, calls.len());
                Self::run(engine, calls);
            }
        }

        reply_rx
            .recv()
            .map_err(|_| PersistError::Aborted("batch dropped without a result".to_string()))?
    }

    /// Run calls in one transaction, peeling off failures until it commits
    fn run(engine: &Engine, mut calls: Vec<Call>) {
        while !calls.is_empty() {
            let mut failed: Option<usize> = None;

            let result = engine.update(|tx| {
                let mut per_call = Vec::with_capacity(calls.len());
                for (index, call) in calls.iter().enumerate() {
                    let before = tx.stats();
                    if let Err(err) = (call.run)(tx) {
                        failed = Some(index);
                        return Err(err);
                    }
                    per_call.push(tx.stats().since(&before));
                }
                Ok(per_call)
            });

            match (result, failed) {
                (Ok((per_call, _)), _) => {
                    for (call, stats) in calls.into_iter().zip(per_call) {
                        let _ = call.reply.send(Ok(stats));
                    }
                    return;
                }
                (Err(_), Some(index)) => {
                    let call = calls.remove(index);
                    Self::run_solo(engine, call);
                }
                (Err(err), None) => {
                    tracing::warn!("Batch commit failed, retrying calls one by one: {}", err);
                    for call in calls.drain(..) {
                        Self::run_solo(engine, call);
                    }
                }
            }
        }
    }

    fn run_solo(engine: &Engine, call: Call) {
        let result = engine
            .update(|tx| {
                let before = tx.stats();
                (call.run)(tx)?;
                Ok(tx.stats().since(&before))
            })
            .map(|(stats, _)| stats);
        let _ = call.reply.send(result);
    }
}
