//! Checker coordinator - drives a model-checking run
//!
//! The coordinator is responsible for:
//! - Picking the liveness checker and exploration strategy
//! - Starting and joining the worker pool
//! - The maintenance loop (checkpoints, liveness, progress, coverage)
//! - Honoring stop requests and the time budget
//! - Deciding the final result code
//!
//! ```text
//!   model_check ─► do_init ─► run_tlc ─────────────────────────► finish
//!                              │
//!                              ├─ start_workers
//!                              ├─ wait (initial, ends early on done)
//!                              ├─ loop: do_periodic_work
//!                              │        stop requests / deadline
//!                              │        continue_doing (progress, coverage)
//!                              └─ join workers
//! ```

use super::context::{CheckerContext, ProgressCallback};
use super::exhaustive::ExhaustiveSearch;
use super::run_state::RunState;
use super::simulation::Simulation;
use super::strategy::CheckStrategy;
use super::trace::TraceStep;
use super::worker::{aggregate_stats, WorkerHandle, WorkerTotals, LOCAL_SLOTS};
use crate::config::{CheckerConfig, Mode};
use crate::coverage::CostModel;
use crate::error::{ErrorCode, MaintenanceError, Result, Unsupported, WorkerError};
use crate::introspect::{ConfigSnapshot, Introspect, Statistics, Value};
use crate::liveness;
use crate::model::Model;
use crate::writer::{DotStateWriter, NoopStateWriter, StateWriter};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct CheckOutcome<S> {
    /// Final result
    pub code: ErrorCode,

    /// States generated, including duplicates
    pub generated: u64,

    /// Distinct states found
    pub distinct: u64,

    /// Longest behavior explored
    pub diameter: u64,

    /// Wall-clock time of the run
    pub duration: Duration,

    /// The state exhibiting the error
    pub err_state: Option<S>,

    /// Its predecessor
    pub pred_err_state: Option<S>,

    /// Behavior leading to `err_state`, when the strategy can rebuild it
    pub trace: Vec<TraceStep<S>>,

    /// Per-worker counters summed
    pub totals: WorkerTotals,
}

/// Builder for a `Checker`
pub struct CheckerBuilder<M: Model> {
    model: Arc<M>,
    config: CheckerConfig,
    writer: Option<Arc<dyn StateWriter>>,
    coverage_sink: Option<Box<dyn Write + Send>>,
    start_time: Option<Instant>,
}

impl<M: Model> CheckerBuilder<M> {
    /// Send the explored state graph to `writer`
    pub fn writer(mut self, writer: Arc<dyn StateWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Also write coverage reports to `sink`
    pub fn coverage_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.coverage_sink = Some(sink);
        self
    }

    /// Measure durations and the time budget from `start`
    pub fn start_time(mut self, start: Instant) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn build(self) -> Result<Checker<M>> {
        let config = self.config;
        config.validate()?;
        let model = self.model;

        let liveness = model.has_liveness();
        if liveness && model.has_symmetry() {
            warn!(
                model = model.name(),
                "Symmetry reduction is declared together with temporal properties; \
                 liveness violations may be missed"
            );
        }
        let live_check =
            liveness::select(liveness, config.liveness_testing, config.liveness_stats);

        let writer: Arc<dyn StateWriter> = match (self.writer, &config.dump) {
            (Some(writer), _) => writer,
            (None, Some(path)) => Arc::new(DotStateWriter::create(path)?),
            (None, None) => Arc::new(NoopStateWriter),
        };

        let mut cost_model = CostModel::new(model.actions());
        if let Some(sink) = self.coverage_sink {
            cost_model = cost_model.with_sink(sink);
        }

        let start_time = self.start_time.unwrap_or_else(Instant::now);
        let recover = config.recover.clone();
        let mode = config.mode;
        let ctx = Arc::new(CheckerContext::new(
            model,
            config,
            live_check,
            writer,
            cost_model,
            start_time,
        ));

        let strategy: Box<dyn CheckStrategy<M>> = match (recover, mode) {
            (Some(source), mode) => {
                if mode == Mode::Simulate {
                    warn!("Recovery resumes an exhaustive search; simulation mode ignored");
                }
                Box::new(ExhaustiveSearch::recovering(&ctx, source))
            }
            (None, Mode::Bfs) => Box::new(ExhaustiveSearch::new(&ctx)),
            (None, Mode::Simulate) => Box::new(Simulation::new()),
        };

        if let Some(budget) = ctx.config.stop_after {
            info!(secs = budget.as_secs(), "Run will stop after the time budget");
        }

        Ok(Checker {
            ctx,
            strategy,
            workers: Mutex::new(Vec::new()),
        })
    }
}

/// Coordinates a model-checking run
pub struct Checker<M: Model> {
    /// State shared with the workers
    ctx: Arc<CheckerContext<M>>,

    /// Exploration algorithm
    strategy: Box<dyn CheckStrategy<M>>,

    /// Worker threads of the current run
    workers: Mutex<Vec<WorkerHandle>>,
}

impl<M: Model> Checker<M> {
    pub fn builder(model: M, config: CheckerConfig) -> CheckerBuilder<M> {
        CheckerBuilder {
            model: Arc::new(model),
            config,
            writer: None,
            coverage_sink: None,
            start_time: None,
        }
    }

    /// Create a checker with the default sinks
    pub fn new(model: M, config: CheckerConfig) -> Result<Self> {
        Self::builder(model, config).build()
    }

    /// Check the model, returning the final result code
    pub fn model_check(&self) -> Result<ErrorCode> {
        info!(
            model = self.ctx.model.name(),
            strategy = self.strategy.name(),
            workers = self.ctx.config.workers,
            liveness = self.ctx.live_check.name(),
            recovery = self.is_recovery(),
            "Starting model check"
        );

        let result = self.model_check_impl();
        let closed = self.ctx.writer.close();
        let code = result?;
        closed?;

        let code = if code == ErrorCode::NoError {
            self.ctx.run_state.error_code()
        } else {
            code
        };
        info!(
            result = %code,
            duration_secs = self.ctx.elapsed().as_secs(),
            "Model check finished"
        );
        Ok(code)
    }

    fn model_check_impl(&self) -> Result<ErrorCode> {
        if !self.strategy.do_init(&self.ctx)? {
            return Ok(self.ctx.run_state.error_code());
        }
        let code = self.run_tlc(self.ctx.config.effective_depth())?;
        if code.is_error() {
            return Ok(code);
        }
        Ok(self.strategy.finish(&self.ctx))
    }

    /// Run the worker pool and the maintenance loop until the run is done
    ///
    /// With `depth < 2` nothing beyond the initial states can be explored, so
    /// no worker is started.
    pub fn run_tlc(&self, depth: u32) -> Result<ErrorCode> {
        if depth < 2 {
            debug!(depth, "Nothing to explore past the initial states");
            return Ok(ErrorCode::NoError);
        }

        let workers = self.strategy.start_workers(&self.ctx, depth)?;
        info!(count = workers.len(), strategy = self.strategy.name(), "Workers spawned");
        *self.workers.lock() = workers;

        // Short runs finish here, before any maintenance
        self.ctx.wait_done(self.ctx.config.initial_wait);

        let cadence = self.ctx.config.coverage_cadence();
        let mut count = cadence;
        loop {
            if let Err(e) = self.strategy.do_periodic_work(&self.ctx) {
                return Ok(self.abort(e));
            }
            if self.ctx.is_done() {
                break;
            }
            self.poll_stop_requests();
            if let Err(e) = self.strategy.continue_doing(&self.ctx, count, depth) {
                return Ok(self.abort(e));
            }
            count = if count == 0 { cadence } else { count - 1 };
        }

        let panicked = self.join_workers();
        let state = self.ctx.run_state.snapshot();
        if state.keep_call_stack {
            return Ok(ErrorCode::NoError);
        }
        if panicked && state.error_code == ErrorCode::NoError {
            return Ok(ErrorCode::EvaluationFailed);
        }
        Ok(state.error_code)
    }

    /// End the run after a maintenance failure
    fn abort(&self, e: MaintenanceError) -> ErrorCode {
        error!(error = %e, "Periodic maintenance failed");
        self.ctx.run_state.set_done();
        if self.strategy.stop(&self.ctx).is_err() {
            debug!(strategy = self.strategy.name(), "Strategy has no stop, relying on done");
        }
        self.join_workers();
        e.code()
    }

    fn poll_stop_requests(&self) {
        if self.ctx.is_done() {
            return;
        }
        let reason = if self.ctx.shutdown_requested() {
            "shutdown requested"
        } else if self.ctx.deadline_passed() {
            "time budget exhausted"
        } else {
            return;
        };
        info!(reason, "Stopping run");
        if let Err(e) = self.strategy.stop(&self.ctx) {
            warn!(error = %e, "Ending run without strategy support");
            self.ctx.run_state.set_done();
        }
    }

    /// Join every worker; returns true if any of them panicked
    fn join_workers(&self) -> bool {
        let mut panicked = false;
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            if let Err(e) = worker.join() {
                warn!(worker = worker.id(), error = %e, "Worker failed to join cleanly");
                panicked |= matches!(e, WorkerError::Panicked { .. });
            }
        }
        panicked
    }

    /// Record an error found while exploring `cur`; false if an earlier error won
    pub fn set_err_state(
        &self,
        cur: &M::State,
        succ: Option<&M::State>,
        keep_call_stack: bool,
        code: ErrorCode,
    ) -> bool {
        self.ctx
            .run_state
            .set_err_state(cur, succ, keep_call_stack, code)
    }

    /// Record an error without a state pair; false if an earlier error won
    pub fn set_error(&self, keep_call_stack: bool, code: ErrorCode) -> bool {
        self.ctx.run_state.set_error(keep_call_stack, code)
    }

    /// Mark the run done, returning the previous value
    pub fn set_done(&self) -> bool {
        self.ctx.run_state.set_done()
    }

    pub fn is_done(&self) -> bool {
        self.ctx.is_done()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.ctx.run_state.error_code()
    }

    /// Copy of the run state
    pub fn run_state(&self) -> RunState<M::State> {
        self.ctx.run_state.snapshot()
    }

    /// Whether this run resumes from a checkpoint
    pub fn is_recovery(&self) -> bool {
        self.ctx.config.recover.is_some()
    }

    /// Whether this run has a time budget
    pub fn is_time_bound(&self) -> bool {
        self.ctx.deadline().is_some()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Name of the liveness checker in use
    pub fn liveness_checker(&self) -> &'static str {
        self.ctx.live_check.name()
    }

    /// Liveness graph traversals performed so far
    pub fn liveness_searches(&self) -> u64 {
        self.ctx.live_check.searches()
    }

    pub fn config_snapshot(&self) -> &ConfigSnapshot {
        self.ctx.config_snapshot()
    }

    /// The config record visible to the model
    pub fn config(&self) -> Value {
        self.ctx.config_snapshot().to_value()
    }

    /// Current statistics
    pub fn statistics(&self) -> Statistics {
        self.ctx.statistics()
    }

    /// Store `value` in slot `idx` of every worker
    pub fn set_all_values(&self, idx: usize, value: Value) -> bool {
        let mut stored = true;
        for locals in self.ctx.all_locals() {
            stored &= locals.set(idx, value.clone());
        }
        stored
    }

    /// Slot `idx` of every worker, in worker order
    pub fn get_all_value(&self, idx: usize) -> Vec<Option<Value>> {
        self.ctx.all_locals().iter().map(|l| l.get(idx)).collect()
    }

    /// Slot `idx` of worker `worker`
    pub fn get_value(&self, worker: usize, idx: usize) -> Option<Value> {
        self.ctx.locals(worker).and_then(|l| l.get(idx))
    }

    /// Every used slot as a record of per-worker tuples
    ///
    /// Workers that never set a used slot contribute an empty tuple.
    pub fn get_all_values(&self) -> Value {
        let mut fields = BTreeMap::new();
        for idx in 0..LOCAL_SLOTS {
            let values = self.get_all_value(idx);
            if values.iter().any(Option::is_some) {
                let tuple = values
                    .into_iter()
                    .map(|v| v.unwrap_or(Value::Tuple(Vec::new())))
                    .collect();
                fields.insert(idx.to_string(), Value::Tuple(tuple));
            }
        }
        Value::Record(fields)
    }

    /// Ask the strategy to end the run
    pub fn stop(&self) -> std::result::Result<(), Unsupported> {
        self.strategy.stop(&self.ctx)
    }

    /// Pause exploration
    pub fn suspend(&self) -> std::result::Result<(), Unsupported> {
        self.strategy.suspend(&self.ctx)
    }

    /// Continue after `suspend`
    pub fn resume(&self) -> std::result::Result<(), Unsupported> {
        self.strategy.resume(&self.ctx)
    }

    /// Behavior leading from an initial state to `state`
    pub fn trace_info(
        &self,
        state: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        self.strategy.trace_info(&self.ctx, state)
    }

    /// Behavior leading from `from` to `to`
    pub fn trace_info_between(
        &self,
        from: &M::State,
        to: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        self.strategy.trace_info_between(&self.ctx, from, to)
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.ctx.shutdown_flag()
    }

    /// Per-worker counters summed
    pub fn worker_totals(&self) -> WorkerTotals {
        aggregate_stats(&self.workers.lock())
    }

    /// Number of workers started by the last `run_tlc`
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Feed every progress report to `callback`
    pub fn on_progress(&self, callback: ProgressCallback) {
        self.ctx.set_progress_callback(callback);
    }

    /// Summary of the run for result `code`
    pub fn outcome(&self, code: ErrorCode) -> CheckOutcome<M::State> {
        let state = self.ctx.run_state.snapshot();
        let trace = match &state.err_state {
            Some(s) => self.trace_info(s).unwrap_or_default(),
            None => Vec::new(),
        };
        CheckOutcome {
            code,
            generated: self.ctx.counters.generated(),
            distinct: self.ctx.counters.distinct(),
            diameter: self.ctx.counters.diameter(),
            duration: self.ctx.elapsed(),
            err_state: state.err_state,
            pred_err_state: state.pred_err_state,
            trace,
            totals: self.worker_totals(),
        }
    }
}
