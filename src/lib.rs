//! mc-coordinator - Parallel Explicit-State Model Checking
//!
//! The coordination core of a model checker: it runs a pool of worker
//! threads over the state graph of a `Model`, keeps the first error found,
//! and drives the periodic maintenance a long run needs.
//!
//! # Features
//!
//! - **Exhaustive search**: Breadth-first exploration over a shared queue,
//!   with fingerprint deduplication and trace reconstruction.
//!
//! - **Simulation**: Random behaviors of bounded length, for state spaces
//!   too large to enumerate.
//!
//! - **Checkpoint and recovery**: The queue and seen set are written
//!   periodically and a later run can resume from them.
//!
//! - **Liveness**: A behavior graph is kept alongside the search and
//!   searched for cycles on which the liveness goal is never reached.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Checker                                 │
//! │   model_check ─► do_init ─► run_tlc ─► finish                    │
//! │                               │                                  │
//! │                               │ maintenance loop                 │
//! │                               │ (checkpoint, liveness,           │
//! │                               │  progress, coverage)             │
//! └───────────────────────────────┼─────────────────────────────────┘
//!                                 │ start / stop / join
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 0 │  │Worker 1 │  │Worker 2 │  ...    │Worker N │     │
//! │  │ locals  │  │ locals  │  │ locals  │         │ locals  │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       └────────────┴─────┬──────┴────────────────────┘          │
//! │                          ▼                                      │
//! │            ┌──────────────────────────┐                         │
//! │            │  State queue + seen set  │                         │
//! │            │  RunState (first error)  │                         │
//! │            └──────────────────────────┘                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Find the water jug solution
//! mc-coordinator die-hard -w 4
//!
//! # Liveness failure when the token can be hoarded
//! mc-coordinator token-ring --processes 4 --hoarding
//!
//! # Resume a checkpointed run
//! mc-coordinator die-hard --recover states
//! ```

pub mod checker;
pub mod checkpoint;
pub mod config;
pub mod coverage;
pub mod error;
pub mod fingerprint;
pub mod introspect;
pub mod liveness;
pub mod model;
pub mod models;
pub mod probability;
pub mod progress;
pub mod writer;

pub use checker::{CheckOutcome, Checker, CheckerBuilder};
pub use config::{CheckerConfig, CliArgs, DemoModel, Mode};
pub use error::{CheckerError, ErrorCode, Result};
pub use model::{EvalScope, Model, Successor};
