//! Worker thread plumbing shared by every strategy
//!
//! Each worker:
//! - Runs on its own named thread with a small integer id
//! - Owns a fixed array of local value slots the model can read and write
//! - Publishes its counters through `WorkerStats`
//!
//! The exploration loop itself belongs to the strategy that spawns it.

use crate::error::WorkerError;
use crate::fingerprint::Fingerprint;
use crate::introspect::Value;
use parking_lot::RwLock;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Number of local value slots per worker
pub const LOCAL_SLOTS: usize = 16;

thread_local! {
    static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
    static CURRENT_STATE: Cell<Option<Fingerprint>> = const { Cell::new(None) };
}

/// Id of the worker running on this thread, if any
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

/// Fingerprint of the state this thread is exploring, if any
pub fn current_state() -> Option<Fingerprint> {
    CURRENT_STATE.with(Cell::get)
}

pub(crate) fn set_current_state(fp: Fingerprint) {
    CURRENT_STATE.with(|c| c.set(Some(fp)));
}

/// Clear this thread's exploration cursor
pub fn reset_current_state() {
    CURRENT_STATE.with(|c| c.set(None));
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// States taken off the queue (or simulation steps taken)
    pub states_explored: AtomicU64,

    /// Successor states generated
    pub states_generated: AtomicU64,

    /// Successors that were new
    pub states_distinct: AtomicU64,

    /// Evaluation errors raised by the model
    pub eval_errors: AtomicU64,
}

impl WorkerStats {
    pub fn record_explored(&self) {
        self.states_explored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generated(&self, count: u64) {
        self.states_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_distinct(&self) {
        self.states_distinct.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eval_error(&self) {
        self.eval_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Local value slots of one worker
#[derive(Debug)]
pub struct LocalValues {
    slots: RwLock<Vec<Option<Value>>>,
}

impl LocalValues {
    pub fn new(size: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; size]),
        }
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        self.slots.read().get(idx).cloned().flatten()
    }

    /// Store `value` in slot `idx`; false if `idx` is out of range
    pub fn set(&self, idx: usize, value: Value) -> bool {
        match self.slots.write().get_mut(idx) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Copy of every slot
    pub fn all(&self) -> Vec<Option<Value>> {
        self.slots.read().clone()
    }
}

impl Default for LocalValues {
    fn default() -> Self {
        Self::new(LOCAL_SLOTS)
    }
}

/// What a worker body receives when its thread starts
pub struct WorkerScope {
    pub id: usize,
    pub stats: Arc<WorkerStats>,
    pub locals: Arc<LocalValues>,
}

/// A spawned worker thread
pub struct WorkerHandle {
    /// Worker ID
    id: usize,

    /// Thread handle, taken on join
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,

    /// Local value slots
    locals: Arc<LocalValues>,
}

impl WorkerHandle {
    /// Spawn a worker thread running `body`
    pub fn spawn<F>(
        id: usize,
        name: &str,
        locals: Arc<LocalValues>,
        body: F,
    ) -> Result<Self, WorkerError>
    where
        F: FnOnce(&WorkerScope) -> Result<(), WorkerError> + Send + 'static,
    {
        let stats = Arc::new(WorkerStats::default());
        let scope = WorkerScope {
            id,
            stats: Arc::clone(&stats),
            locals: Arc::clone(&locals),
        };

        let handle = thread::Builder::new()
            .name(format!("{}-{}", name, id))
            .spawn(move || {
                WORKER_ID.with(|w| w.set(Some(id)));
                debug!(worker = id, "Worker starting");
                let result = body(&scope);
                reset_current_state();
                info!(
                    worker = id,
                    explored = scope.stats.states_explored.load(Ordering::Relaxed),
                    generated = scope.stats.states_generated.load(Ordering::Relaxed),
                    "Worker shutting down"
                );
                result
            })
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
            locals,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Get worker local values
    pub fn locals(&self) -> &LocalValues {
        &self.locals
    }

    pub fn local_value(&self, idx: usize) -> Option<Value> {
        self.locals.get(idx)
    }

    pub fn set_local_value(&self, idx: usize, value: Value) -> bool {
        self.locals.set(idx, value)
    }

    /// True once the thread has been joined
    pub fn is_joined(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the worker to finish
    ///
    /// Joining twice is a no-op.
    pub fn join(&mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(payload) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: panic_message(payload.as_ref()),
                }),
            }
        } else {
            Ok(())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Counters summed over all workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTotals {
    pub explored: u64,
    pub generated: u64,
    pub distinct: u64,
    pub eval_errors: u64,
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[WorkerHandle]) -> WorkerTotals {
    workers.iter().fold(WorkerTotals::default(), |mut acc, worker| {
        acc.explored += worker.stats.states_explored.load(Ordering::Relaxed);
        acc.generated += worker.stats.states_generated.load(Ordering::Relaxed);
        acc.distinct += worker.stats.states_distinct.load(Ordering::Relaxed);
        acc.eval_errors += worker.stats.eval_errors.load(Ordering::Relaxed);
        acc
    })
}
