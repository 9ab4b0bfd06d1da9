//! The seam between the coordinator and an exploration algorithm
//!
//! The coordinator owns the run lifecycle (start, maintenance loop, join,
//! result). A `CheckStrategy` owns how states are explored: what seeds the
//! run, what each worker does, and what periodic work that exploration
//! needs. Capabilities a strategy lacks are reported as `Unsupported`.

use super::context::CheckerContext;
use super::trace::TraceStep;
use super::worker::WorkerHandle;
use crate::error::{ErrorCode, MaintenanceError, Result, Unsupported};
use crate::model::Model;
use std::sync::Arc;

/// An exploration algorithm driven by the coordinator
pub trait CheckStrategy<M: Model>: Send + Sync {
    /// Short name used in logs and `Unsupported` errors
    fn name(&self) -> &'static str;

    /// Seed the run
    ///
    /// Returns false when the run already ended, for example because an
    /// initial state violates an invariant.
    fn do_init(&self, ctx: &Arc<CheckerContext<M>>) -> Result<bool>;

    /// Spawn the worker pool; behaviors are bounded to `depth` states
    fn start_workers(
        &self,
        ctx: &Arc<CheckerContext<M>>,
        depth: u32,
    ) -> Result<Vec<WorkerHandle>>;

    /// Checkpointing and liveness re-evaluation, called once per maintenance cycle
    fn do_periodic_work(
        &self,
        ctx: &Arc<CheckerContext<M>>,
    ) -> std::result::Result<(), MaintenanceError>;

    /// Wait one progress interval, then report progress
    ///
    /// Coverage is reported when `count` reaches zero.
    fn continue_doing(
        &self,
        ctx: &Arc<CheckerContext<M>>,
        count: u64,
        _depth: u32,
    ) -> std::result::Result<(), MaintenanceError> {
        if ctx.wait_done(ctx.config.progress_interval) {
            return Ok(());
        }
        ctx.report_progress();
        if count == 0 {
            ctx.cost_model.report().map_err(MaintenanceError::Coverage)?;
        }
        Ok(())
    }

    /// Final checks once all workers are joined
    fn finish(&self, ctx: &Arc<CheckerContext<M>>) -> ErrorCode;

    fn stop(&self, _ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        Err(Unsupported::new("stop", self.name()))
    }

    fn suspend(&self, _ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        Err(Unsupported::new("suspend", self.name()))
    }

    fn resume(&self, _ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        Err(Unsupported::new("resume", self.name()))
    }

    /// Behavior leading from an initial state to `state`
    fn trace_info(
        &self,
        _ctx: &Arc<CheckerContext<M>>,
        _state: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        Err(Unsupported::new("trace reconstruction", self.name()))
    }

    /// Behavior leading from `from` to `to`
    fn trace_info_between(
        &self,
        _ctx: &Arc<CheckerContext<M>>,
        _from: &M::State,
        _to: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        Err(Unsupported::new("trace reconstruction", self.name()))
    }
}
