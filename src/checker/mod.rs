//! Model checking coordination
//!
//! This module contains the core machinery:
//! - `Checker`: coordinates the run
//! - `CheckStrategy`: the exploration algorithm seam
//! - `ExhaustiveSearch` / `Simulation`: the two strategies
//! - `SharedRunState`: first-error-wins run record
//! - `StateQueue`: shared FIFO with suspend/resume
//! - `WorkerHandle`: worker threads and their local values

pub mod context;
pub mod coordinator;
pub mod exhaustive;
pub mod queue;
pub mod run_state;
pub mod simulation;
pub mod strategy;
pub mod trace;
pub mod worker;

pub use context::{CheckerContext, ExplorationCounters, ProgressCallback};
pub use coordinator::{CheckOutcome, Checker, CheckerBuilder};
pub use exhaustive::ExhaustiveSearch;
pub use queue::{QueueStats, StateQueue, StateTask};
pub use run_state::{RunState, SharedRunState};
pub use simulation::Simulation;
pub use strategy::CheckStrategy;
pub use trace::{TraceStep, TraceStore};
pub use worker::{
    aggregate_stats, LocalValues, WorkerHandle, WorkerStats, WorkerTotals, LOCAL_SLOTS,
};
