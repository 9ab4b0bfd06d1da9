//! Liveness checking
//!
//! - `graph`: behavior graph and pending-cycle search
//! - `check`: the three checker variants and their selection

pub mod check;
pub mod graph;

pub use check::{select, AddAndCheckLiveCheck, LiveCheck, NoOpLiveCheck, StandardLiveCheck};
pub use graph::{BehaviorGraph, GraphSnapshot, LivenessViolation, SavedNode};
