//! The interface to the specification being checked
//!
//! The checker never looks inside a state. A `Model` enumerates initial
//! states, computes successors, and evaluates invariants; the coordinator
//! only fingerprints, stores, and schedules the states it hands back.

use crate::checker::worker::LocalValues;
use crate::error::EvalResult;
use crate::introspect::{ConfigSnapshot, Introspect, Statistics, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// A successor state together with the action that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor<S> {
    /// Index into `Model::actions`
    pub action: usize,

    /// The successor state
    pub state: S,
}

impl<S> Successor<S> {
    pub fn new(action: usize, state: S) -> Self {
        Self { action, state }
    }
}

/// A specification that can be model checked
pub trait Model: Send + Sync + 'static {
    /// A state of the model
    type State: Clone + Eq + Hash + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Name used in logs and checkpoints
    fn name(&self) -> &str;

    /// Names of the actions making up the next-state relation
    fn actions(&self) -> &[&'static str];

    /// All initial states
    fn init_states(&self) -> EvalResult<Vec<Self::State>>;

    /// All successors of `state`
    fn next_states(
        &self,
        state: &Self::State,
        scope: &EvalScope<'_>,
    ) -> EvalResult<Vec<Successor<Self::State>>>;

    /// Name of the first invariant `state` violates, if any
    fn check_invariants(&self, state: &Self::State) -> EvalResult<Option<String>>;

    /// Whether the model carries temporal (liveness) properties
    fn has_liveness(&self) -> bool {
        false
    }

    /// Whether the model declares a symmetry reduction
    fn has_symmetry(&self) -> bool {
        false
    }

    /// True while the liveness goal has not been reached in `state`
    ///
    /// A reachable cycle made only of pending states is a counterexample.
    fn liveness_pending(&self, _state: &Self::State) -> bool {
        false
    }
}

/// What a model can see of the checker while computing successors
pub struct EvalScope<'a> {
    worker: usize,
    locals: &'a LocalValues,
    telemetry: &'a dyn Introspect,
}

impl<'a> EvalScope<'a> {
    pub fn new(worker: usize, locals: &'a LocalValues, telemetry: &'a dyn Introspect) -> Self {
        Self {
            worker,
            locals,
            telemetry,
        }
    }

    /// Id of the worker evaluating this state
    pub fn worker_id(&self) -> usize {
        self.worker
    }

    /// Read this worker's local value slot
    pub fn get(&self, idx: usize) -> Option<Value> {
        self.locals.get(idx)
    }

    /// Write this worker's local value slot; false if `idx` is out of range
    pub fn set(&self, idx: usize, value: Value) -> bool {
        self.locals.set(idx, value)
    }

    pub fn config(&self) -> &ConfigSnapshot {
        self.telemetry.config_snapshot()
    }

    pub fn statistics(&self) -> Statistics {
        self.telemetry.statistics()
    }
}
