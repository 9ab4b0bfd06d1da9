//! Exhaustive breadth-first exploration
//!
//! ```text
//!                 ┌──────────────┐
//!   init states ─►│  StateQueue  │◄──────────────┐
//!   (or restored  └──────┬───────┘               │ new successors
//!    checkpoint)         │ dequeue               │
//!                 ┌──────▼───────┐        ┌──────┴────────┐
//!                 │   Worker N   │───────►│ FingerprintSet│
//!                 └──────┬───────┘ insert └───────────────┘
//!                        │ parent pointers
//!                 ┌──────▼───────┐
//!                 │  TraceStore  │
//!                 └──────────────┘
//! ```
//!
//! Workers pull states off a shared FIFO, compute successors, and enqueue
//! the ones whose fingerprint is new. The run is complete when the queue is
//! empty and no worker is mid-state. The same strategy resumes a run from a
//! checkpoint: the queue, seen-set, trace store and liveness graph are
//! refilled from the file instead of from the initial states.

use super::context::CheckerContext;
use super::queue::{StateQueue, StateTask};
use super::strategy::CheckStrategy;
use super::trace::{TraceStep, TraceStore};
use super::worker::{set_current_state, WorkerHandle, WorkerScope};
use crate::checkpoint::{self, Checkpoint, Checkpointer, QueuedState, CHECKPOINT_VERSION};
use crate::error::{ErrorCode, MaintenanceError, Result, Unsupported, WorkerError};
use crate::fingerprint::{Fingerprint, FingerprintSet};
use crate::model::{EvalScope, Model};
use crate::probability;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long an idle worker waits on the queue before re-checking for completion
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Significant digits of the reported collision probabilities
const PROBABILITY_DIGITS: usize = 2;

/// Breadth-first search over the whole reachable state space
pub struct ExhaustiveSearch<M: Model> {
    queue: Arc<StateQueue<M::State>>,
    seen: Arc<FingerprintSet>,
    traces: Arc<TraceStore<M::State>>,
    checkpointer: Option<Checkpointer>,
    recover_from: Option<PathBuf>,
    stopped: AtomicBool,
}

impl<M: Model> ExhaustiveSearch<M> {
    /// Start from the model's initial states
    pub fn new(ctx: &CheckerContext<M>) -> Self {
        Self {
            queue: Arc::new(StateQueue::new(Arc::clone(&ctx.counters.queue))),
            seen: Arc::new(FingerprintSet::new()),
            traces: Arc::new(TraceStore::new()),
            checkpointer: ctx
                .config
                .checkpoint_interval
                .map(|interval| Checkpointer::new(&ctx.config.metadir, interval)),
            recover_from: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Resume from the checkpoint at `source`
    pub fn recovering(ctx: &CheckerContext<M>, source: PathBuf) -> Self {
        Self {
            recover_from: Some(source),
            ..Self::new(ctx)
        }
    }

    /// Smallest gap between two seen fingerprints
    pub fn min_fingerprint_distance(&self) -> Option<u64> {
        self.seen.min_distance()
    }

    /// Whether the run was cut short by `stop`
    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn recover(&self, ctx: &CheckerContext<M>, source: &PathBuf) -> Result<()> {
        let restored: Checkpoint<M::State> = checkpoint::read(source, ctx.model.name())?;

        for fp in &restored.seen {
            self.seen.insert(Fingerprint(*fp));
        }
        let queued = restored.queue.len();
        for entry in restored.queue {
            self.queue
                .enqueue(StateTask::new(entry.state, entry.fp, entry.depth));
        }
        self.traces.restore(restored.trace);
        ctx.counters
            .restore(restored.generated, restored.distinct, restored.diameter);

        match restored.liveness {
            Some(graph) => ctx.live_check.restore(graph),
            None if ctx.live_check.is_active() => {
                warn!("Checkpoint has no behavior graph; liveness restarts from the queued states");
            }
            None => {}
        }

        info!(
            source = %source.display(),
            written_at = %restored.written_at,
            distinct = restored.distinct,
            queued = queued,
            "Recovered from checkpoint"
        );
        Ok(())
    }

    fn seed_initial_states(&self, ctx: &CheckerContext<M>) -> bool {
        let init = match ctx.model.init_states() {
            Ok(states) => states,
            Err(e) => {
                ctx.report_eval_error(None, &e);
                return false;
            }
        };

        ctx.counters.record_generated(init.len() as u64);
        for state in init {
            let fp = ctx.fp.fingerprint(&state);
            if !self.seen.insert(fp) {
                continue;
            }
            ctx.counters.record_distinct();
            ctx.writer.write_init(fp, &format!("{state:?}"));
            self.traces.insert(fp, None, None, state.clone());

            match ctx.model.check_invariants(&state) {
                Ok(None) => {}
                Ok(Some(invariant)) => {
                    if !ctx.report_invariant(&state, None, &invariant) {
                        return false;
                    }
                }
                Err(e) => {
                    ctx.report_eval_error(Some(&state), &e);
                    return false;
                }
            }

            if ctx.live_check.is_active() {
                ctx.live_check
                    .add_init_state(fp, &state, ctx.model.liveness_pending(&state));
            }
            self.queue.enqueue(StateTask::new(state, fp, 1));
        }
        ctx.counters.record_diameter(1);

        info!(
            distinct = ctx.counters.distinct(),
            "Computed initial states"
        );
        true
    }

    fn write_checkpoint(
        &self,
        ctx: &CheckerContext<M>,
        checkpointer: &Checkpointer,
    ) -> std::result::Result<(), MaintenanceError> {
        // Nothing moves while the queue is suspended
        self.queue.suspend_all();
        let snapshot = Checkpoint {
            version: CHECKPOINT_VERSION,
            written_at: Utc::now(),
            model: ctx.model.name().to_string(),
            generated: ctx.counters.generated(),
            distinct: ctx.counters.distinct(),
            diameter: ctx.counters.diameter(),
            seen: self.seen.snapshot(),
            queue: self
                .queue
                .snapshot()
                .into_iter()
                .map(|task| QueuedState {
                    state: task.state,
                    fp: task.fp,
                    depth: task.depth,
                })
                .collect(),
            trace: self.traces.records(),
            liveness: ctx.live_check.snapshot(),
        };
        self.queue.resume_all();

        checkpointer.write(&snapshot)?;
        Ok(())
    }
}

/// What one worker needs to explore
struct Explorer<M: Model> {
    ctx: Arc<CheckerContext<M>>,
    queue: Arc<StateQueue<M::State>>,
    seen: Arc<FingerprintSet>,
    traces: Arc<TraceStore<M::State>>,
    depth: u32,
}

impl<M: Model> Explorer<M> {
    fn run(&self, scope: &WorkerScope) -> std::result::Result<(), WorkerError> {
        loop {
            if self.ctx.is_done() {
                break;
            }
            let Some((task, _guard)) = self.queue.dequeue(POLL_INTERVAL) else {
                if self.queue.is_complete() {
                    if !self.ctx.run_state.set_done() {
                        debug!(worker = scope.id, "State queue drained");
                    }
                    break;
                }
                continue;
            };

            scope.stats.record_explored();
            set_current_state(task.fp);
            if task.depth >= self.depth {
                continue;
            }
            if !self.explore(scope, &task) {
                break;
            }
        }
        Ok(())
    }

    /// Expand one state; returns false once the run has ended
    fn explore(&self, scope: &WorkerScope, task: &StateTask<M::State>) -> bool {
        let ctx = &self.ctx;
        let eval = EvalScope::new(scope.id, &scope.locals, ctx.as_ref());
        let successors = match ctx.model.next_states(&task.state, &eval) {
            Ok(succs) => succs,
            Err(e) => {
                scope.stats.record_eval_error();
                ctx.report_eval_error(Some(&task.state), &e);
                return false;
            }
        };

        let count = successors.len() as u64;
        ctx.counters.record_generated(count);
        scope.stats.record_generated(count);

        if successors.is_empty() && ctx.config.check_deadlock {
            ctx.report_deadlock(&task.state);
            return false;
        }

        let actions = ctx.model.actions();
        let next_depth = task.depth + 1;
        for succ in successors {
            let fp = ctx.fp.fingerprint(&succ.state);
            let is_new = self.seen.insert(fp);
            ctx.cost_model.record(succ.action, is_new);
            if !ctx.writer.is_noop() {
                let action = actions.get(succ.action).copied().unwrap_or("?");
                ctx.writer.write_edge(task.fp, fp, action, is_new);
            }

            if is_new {
                ctx.counters.record_distinct();
                scope.stats.record_distinct();
                ctx.counters.record_diameter(next_depth as u64);
                self.traces
                    .insert(fp, Some(task.fp), Some(succ.action), succ.state.clone());

                match ctx.model.check_invariants(&succ.state) {
                    Ok(None) => {}
                    Ok(Some(invariant)) => {
                        if !ctx.report_invariant(&task.state, Some(&succ.state), &invariant) {
                            return false;
                        }
                    }
                    Err(e) => {
                        scope.stats.record_eval_error();
                        ctx.report_eval_error(Some(&succ.state), &e);
                        return false;
                    }
                }
            }

            if ctx.live_check.is_active() {
                let pending = ctx.model.liveness_pending(&succ.state);
                if let Some(violation) =
                    ctx.live_check
                        .add_next_state(task.fp, fp, &succ.state, pending)
                {
                    ctx.report_liveness(&violation);
                    return false;
                }
            }

            if is_new {
                self.queue
                    .enqueue(StateTask::new(succ.state, fp, next_depth));
            }
        }
        true
    }
}

impl<M: Model> CheckStrategy<M> for ExhaustiveSearch<M> {
    fn name(&self) -> &'static str {
        if self.recover_from.is_some() {
            "recovery"
        } else {
            "exhaustive"
        }
    }

    fn do_init(&self, ctx: &Arc<CheckerContext<M>>) -> Result<bool> {
        match &self.recover_from {
            Some(source) => {
                self.recover(ctx, source)?;
                Ok(true)
            }
            None => Ok(self.seed_initial_states(ctx)),
        }
    }

    fn start_workers(
        &self,
        ctx: &Arc<CheckerContext<M>>,
        depth: u32,
    ) -> Result<Vec<WorkerHandle>> {
        let mut workers = Vec::with_capacity(ctx.config.workers);
        for id in 0..ctx.config.workers {
            let explorer = Explorer {
                ctx: Arc::clone(ctx),
                queue: Arc::clone(&self.queue),
                seen: Arc::clone(&self.seen),
                traces: Arc::clone(&self.traces),
                depth,
            };
            let locals = ctx.locals(id).cloned().unwrap_or_default();
            let handle =
                WorkerHandle::spawn(id, "explorer", locals, move |scope| explorer.run(scope))?;
            workers.push(handle);
        }
        Ok(workers)
    }

    fn do_periodic_work(
        &self,
        ctx: &Arc<CheckerContext<M>>,
    ) -> std::result::Result<(), MaintenanceError> {
        if let Some(checkpointer) = &self.checkpointer {
            if checkpointer.is_due() && !ctx.is_done() {
                self.write_checkpoint(ctx, checkpointer)?;
            }
        }

        if ctx.live_check.is_active() && !ctx.is_done() {
            if let Some(violation) = ctx.live_check.check(false) {
                ctx.report_liveness(&violation);
            }
        }
        Ok(())
    }

    fn finish(&self, ctx: &Arc<CheckerContext<M>>) -> ErrorCode {
        let code = ctx.run_state.error_code();
        if code.is_error() {
            return code;
        }

        if self.was_stopped() {
            warn!(
                distinct = ctx.counters.distinct(),
                queued = self.queue.len(),
                "Run stopped before the state space was exhausted"
            );
            return ErrorCode::NoError;
        }

        if ctx.live_check.is_active() {
            if let Some(violation) = ctx.live_check.final_check() {
                ctx.report_liveness(&violation);
                return ErrorCode::LivenessViolated;
            }
            info!(
                searches = ctx.live_check.searches(),
                "Temporal properties hold"
            );
        }

        let distinct = ctx.counters.distinct();
        let generated = ctx.counters.generated();
        let estimate = probability::estimate(distinct, generated, self.seen.min_distance());
        let (optimistic, observed) = estimate.render(PROBABILITY_DIGITS);
        info!(
            generated = generated,
            distinct = distinct,
            diameter = ctx.counters.diameter(),
            "Model checking completed. No error has been found."
        );
        info!(
            optimistic = %format!("val = {optimistic}"),
            observed = %format!("val = {}", observed.as_deref().unwrap_or("n/a")),
            "Estimated probability of a fingerprint collision"
        );
        ErrorCode::NoError
    }

    fn stop(&self, ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        self.stopped.store(true, Ordering::SeqCst);
        ctx.run_state.set_done();
        self.queue.close();
        Ok(())
    }

    fn suspend(&self, _ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        self.queue.suspend_all();
        Ok(())
    }

    fn resume(&self, _ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        self.queue.resume_all();
        Ok(())
    }

    fn trace_info(
        &self,
        ctx: &Arc<CheckerContext<M>>,
        state: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        let fp = ctx.fp.fingerprint(state);
        Ok(self.traces.path(None, fp, ctx.model.actions()))
    }

    fn trace_info_between(
        &self,
        ctx: &Arc<CheckerContext<M>>,
        from: &M::State,
        to: &M::State,
    ) -> std::result::Result<Vec<TraceStep<M::State>>, Unsupported> {
        let from = ctx.fp.fingerprint(from);
        let to = ctx.fp.fingerprint(to);
        Ok(self.traces.path(Some(from), to, ctx.model.actions()))
    }
}
