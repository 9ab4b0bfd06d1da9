//! Random simulation
//!
//! Each worker repeatedly picks a random initial state and follows random
//! successors for at most `depth` states, checking invariants and deadlock
//! along the way. Nothing is queued, so there is nothing to checkpoint,
//! suspend, or reconstruct a trace from; the run ends when the trace budget
//! is spent, a violation is found, or the coordinator stops it.

use super::context::CheckerContext;
use super::strategy::CheckStrategy;
use super::worker::{set_current_state, WorkerHandle, WorkerScope};
use crate::error::{ErrorCode, MaintenanceError, Result, Unsupported, WorkerError};
use crate::fingerprint::FingerprintSet;
use crate::model::{EvalScope, Model};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Spreads worker ids over the seed space
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Random walks through the state graph
pub struct Simulation<M: Model> {
    init: Arc<RwLock<Vec<M::State>>>,
    seen: Arc<FingerprintSet>,
    traces: Arc<AtomicU64>,
    stopped: AtomicBool,
}

impl<M: Model> Simulation<M> {
    pub fn new() -> Self {
        Self {
            init: Arc::new(RwLock::new(Vec::new())),
            seen: Arc::new(FingerprintSet::new()),
            traces: Arc::new(AtomicU64::new(0)),
            stopped: AtomicBool::new(false),
        }
    }

    /// Behaviors generated so far
    pub fn traces(&self) -> u64 {
        self.traces.load(Ordering::Relaxed)
    }
}

impl<M: Model> Default for Simulation<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-worker random walker
struct Walker<M: Model> {
    ctx: Arc<CheckerContext<M>>,
    init: Arc<RwLock<Vec<M::State>>>,
    seen: Arc<FingerprintSet>,
    traces: Arc<AtomicU64>,
    depth: u32,
    rng: StdRng,
}

impl<M: Model> Walker<M> {
    fn run(mut self, scope: &WorkerScope) -> std::result::Result<(), WorkerError> {
        let budget = self.ctx.config.traces;
        while !self.ctx.is_done() {
            let generated = self.traces.fetch_add(1, Ordering::SeqCst);
            if budget.is_some_and(|b| generated >= b) {
                self.ctx.run_state.set_done();
                break;
            }
            if !self.walk(scope) {
                break;
            }
        }
        Ok(())
    }

    /// Follow one random behavior; returns false once the run has ended
    fn walk(&mut self, scope: &WorkerScope) -> bool {
        let ctx = Arc::clone(&self.ctx);
        let mut state = {
            let init = self.init.read();
            if init.is_empty() {
                ctx.run_state.set_done();
                return false;
            }
            init[self.rng.gen_range(0..init.len())].clone()
        };
        let mut fp = ctx.fp.fingerprint(&state);

        for step in 1..self.depth {
            if ctx.is_done() {
                return false;
            }
            scope.stats.record_explored();
            set_current_state(fp);

            let eval = EvalScope::new(scope.id, &scope.locals, ctx.as_ref());
            let successors = match ctx.model.next_states(&state, &eval) {
                Ok(succs) => succs,
                Err(e) => {
                    scope.stats.record_eval_error();
                    ctx.report_eval_error(Some(&state), &e);
                    return false;
                }
            };
            let count = successors.len() as u64;
            ctx.counters.record_generated(count);
            scope.stats.record_generated(count);

            if successors.is_empty() {
                if ctx.config.check_deadlock {
                    ctx.report_deadlock(&state);
                    return false;
                }
                break;
            }

            let mut successors = successors;
            let succ = successors.swap_remove(self.rng.gen_range(0..successors.len()));
            let succ_fp = ctx.fp.fingerprint(&succ.state);
            let is_new = self.seen.insert(succ_fp);
            ctx.cost_model.record(succ.action, is_new);
            if is_new {
                ctx.counters.record_distinct();
                scope.stats.record_distinct();
            }
            ctx.counters.record_diameter(step as u64 + 1);

            match ctx.model.check_invariants(&succ.state) {
                Ok(None) => {}
                Ok(Some(invariant)) => {
                    if !ctx.report_invariant(&state, Some(&succ.state), &invariant) {
                        return false;
                    }
                }
                Err(e) => {
                    ctx.report_eval_error(Some(&succ.state), &e);
                    return false;
                }
            }

            if ctx.live_check.is_active() {
                let pending = ctx.model.liveness_pending(&succ.state);
                if let Some(violation) =
                    ctx.live_check
                        .add_next_state(fp, succ_fp, &succ.state, pending)
                {
                    ctx.report_liveness(&violation);
                    return false;
                }
            }

            state = succ.state;
            fp = succ_fp;
        }
        true
    }
}

impl<M: Model> CheckStrategy<M> for Simulation<M> {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn do_init(&self, ctx: &Arc<CheckerContext<M>>) -> Result<bool> {
        let init = match ctx.model.init_states() {
            Ok(states) => states,
            Err(e) => {
                ctx.report_eval_error(None, &e);
                return Ok(false);
            }
        };

        ctx.counters.record_generated(init.len() as u64);
        for state in &init {
            let fp = ctx.fp.fingerprint(state);
            if self.seen.insert(fp) {
                ctx.counters.record_distinct();
            }
            match ctx.model.check_invariants(state) {
                Ok(None) => {}
                Ok(Some(invariant)) => {
                    if !ctx.report_invariant(state, None, &invariant) {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    ctx.report_eval_error(Some(state), &e);
                    return Ok(false);
                }
            }
            if ctx.live_check.is_active() {
                ctx.live_check
                    .add_init_state(fp, state, ctx.model.liveness_pending(state));
            }
        }
        ctx.counters.record_diameter(1);

        debug!(initial = init.len(), "Simulation seeded");
        *self.init.write() = init;
        Ok(true)
    }

    fn start_workers(&self, ctx: &Arc<CheckerContext<M>>, depth: u32) -> Result<Vec<WorkerHandle>> {
        let mut workers = Vec::with_capacity(ctx.config.workers);
        for id in 0..ctx.config.workers {
            let walker = Walker {
                ctx: Arc::clone(ctx),
                init: Arc::clone(&self.init),
                seen: Arc::clone(&self.seen),
                traces: Arc::clone(&self.traces),
                depth,
                rng: StdRng::seed_from_u64(ctx.config.seed ^ (id as u64).wrapping_mul(SEED_MIX)),
            };
            let locals = ctx.locals(id).cloned().unwrap_or_default();
            let handle =
                WorkerHandle::spawn(id, "simulator", locals, move |scope| walker.run(scope))?;
            workers.push(handle);
        }
        Ok(workers)
    }

    fn do_periodic_work(
        &self,
        ctx: &Arc<CheckerContext<M>>,
    ) -> std::result::Result<(), MaintenanceError> {
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
        if ctx.live_check.is_active() {
            if let Some(violation) = ctx.live_check.final_check() {
                ctx.report_liveness(&violation);
                return ErrorCode::LivenessViolated;
            }
        }

        // The worker that exhausted the budget bumped the counter past it
        let traces = match ctx.config.traces {
            Some(budget) => self.traces().min(budget),
            None => self.traces(),
        };
        info!(
            traces = traces,
            generated = ctx.counters.generated(),
            distinct = ctx.counters.distinct(),
            stopped = self.stopped.load(Ordering::SeqCst),
            "Simulation completed. No error has been found."
        );
        ErrorCode::NoError
    }

    fn stop(&self, ctx: &Arc<CheckerContext<M>>) -> std::result::Result<(), Unsupported> {
        self.stopped.store(true, Ordering::SeqCst);
        ctx.run_state.set_done();
        Ok(())
    }
}
