//! State shared by the coordinator, its strategy and every worker
//!
//! The context is built once per run and handed around as an `Arc`. It holds
//! the immutable parts of a run (model, configuration, config snapshot) next
//! to the shared mutable ones (run state, counters, liveness graph), and
//! funnels every error report through one place so logging stays uniform.

use super::queue::QueueStats;
use super::run_state::SharedRunState;
use super::worker::{current_worker_id, LocalValues};
use crate::config::CheckerConfig;
use crate::coverage::CostModel;
use crate::error::{ErrorCode, EvalError};
use crate::fingerprint::Fp64;
use crate::introspect::{ConfigSnapshot, Introspect, Statistics};
use crate::liveness::{LiveCheck, LivenessViolation};
use crate::model::Model;
use crate::writer::StateWriter;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Sink for periodic progress reports
pub type ProgressCallback = Box<dyn Fn(&Statistics) + Send + Sync>;

/// Run-wide exploration counters
#[derive(Debug, Default)]
pub struct ExplorationCounters {
    /// States generated, including duplicates
    pub generated: AtomicU64,

    /// Distinct states found
    pub distinct: AtomicU64,

    /// Longest behavior explored so far
    pub diameter: AtomicU64,

    /// Queue throughput counters
    pub queue: Arc<QueueStats>,
}

impl ExplorationCounters {
    pub fn record_generated(&self, count: u64) {
        self.generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_distinct(&self) {
        self.distinct.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_diameter(&self, depth: u64) {
        self.diameter.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn distinct(&self) -> u64 {
        self.distinct.load(Ordering::Relaxed)
    }

    pub fn diameter(&self) -> u64 {
        self.diameter.load(Ordering::Relaxed)
    }

    /// Overwrite the counters with values restored from a checkpoint
    pub fn restore(&self, generated: u64, distinct: u64, diameter: u64) {
        self.generated.store(generated, Ordering::Relaxed);
        self.distinct.store(distinct, Ordering::Relaxed);
        self.diameter.store(diameter, Ordering::Relaxed);
    }
}

/// Everything a run shares between threads
pub struct CheckerContext<M: Model> {
    /// The model being checked
    pub model: Arc<M>,

    /// Validated configuration
    pub config: CheckerConfig,

    /// Done / error record
    pub run_state: SharedRunState<M::State>,

    /// Liveness checker chosen for this run
    pub live_check: Box<dyn LiveCheck<M::State>>,

    /// Exploration counters
    pub counters: ExplorationCounters,

    /// Fingerprinting scheme
    pub fp: Fp64,

    /// State graph sink
    pub writer: Arc<dyn StateWriter>,

    /// Per-action coverage
    pub cost_model: CostModel,

    /// Local value slots, one set per worker
    locals: Vec<Arc<LocalValues>>,

    snapshot: ConfigSnapshot,
    start_time: Instant,
    deadline: Option<Instant>,
    shutdown: Arc<AtomicBool>,
    progress: RwLock<Option<ProgressCallback>>,
}

impl<M: Model> CheckerContext<M> {
    pub(crate) fn new(
        model: Arc<M>,
        config: CheckerConfig,
        live_check: Box<dyn LiveCheck<M::State>>,
        writer: Arc<dyn StateWriter>,
        cost_model: CostModel,
        start_time: Instant,
    ) -> Self {
        let snapshot = ConfigSnapshot {
            mode: config.mode.as_str().to_string(),
            deadlock: config.check_deadlock,
            workers: config.workers,
            seed: config.seed,
            fingerprint: config.fp_poly,
            install: std::env::current_exe()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        };
        let deadline = config.stop_after.map(|budget| start_time + budget);
        let locals = (0..config.workers).map(|_| Arc::new(LocalValues::default())).collect();

        Self {
            run_state: SharedRunState::new(config.continuation),
            fp: Fp64::new(config.fp_poly),
            counters: ExplorationCounters::default(),
            model,
            config,
            live_check,
            writer,
            cost_model,
            locals,
            snapshot,
            start_time,
            deadline,
            shutdown: Arc::new(AtomicBool::new(false)),
            progress: RwLock::new(None),
        }
    }

    pub fn is_done(&self) -> bool {
        self.run_state.is_done()
    }

    /// Local value slots of worker `id`
    pub fn locals(&self, id: usize) -> Option<&Arc<LocalValues>> {
        self.locals.get(id)
    }

    pub fn all_locals(&self) -> &[Arc<LocalValues>] {
        &self.locals
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// When the run must stop, if it is time bound
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Flag an external agent sets to request a stop
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wait for the run to finish, at most `timeout` and never past the deadline
    pub fn wait_done(&self, timeout: Duration) -> bool {
        let mut until = Instant::now() + timeout;
        if let Some(deadline) = self.deadline {
            until = until.min(deadline);
        }
        self.run_state.wait_done_until(until)
    }

    pub fn set_progress_callback(&self, callback: ProgressCallback) {
        *self.progress.write() = Some(callback);
    }

    /// Log a progress line and feed the registered callback
    pub fn report_progress(&self) {
        let stats = self.statistics();
        info!(
            generated = stats.generated,
            distinct = stats.distinct,
            queue = stats.queue,
            diameter = stats.diameter,
            rate = %format!("{:.0}/s", stats.states_per_second()),
            "Progress"
        );
        if let Some(callback) = self.progress.read().as_ref() {
            callback(&stats);
        }
    }

    /// Report an invariant violated by `succ` (or by `cur` when it is initial)
    ///
    /// Returns true when exploration should go on, which only happens in
    /// continuation mode.
    pub fn report_invariant(
        &self,
        cur: &M::State,
        succ: Option<&M::State>,
        invariant: &str,
    ) -> bool {
        let state = succ.unwrap_or(cur);
        if self.config.continuation {
            warn!(invariant, state = ?state, "Invariant violated, continuing");
            self.run_state
                .note_violation(cur, succ, ErrorCode::InvariantViolated);
            return true;
        }
        if self
            .run_state
            .set_err_state(cur, succ, false, ErrorCode::InvariantViolated)
        {
            error!(invariant, state = ?state, "Invariant violated");
        }
        false
    }

    /// Report a state without successors
    pub fn report_deadlock(&self, state: &M::State) {
        if self
            .run_state
            .set_err_state(state, None, false, ErrorCode::Deadlock)
        {
            error!(state = ?state, "Deadlock reached");
        }
    }

    /// Report a pending cycle
    pub fn report_liveness(&self, violation: &LivenessViolation<M::State>) {
        if self.run_state.set_err_state(
            &violation.pred,
            Some(&violation.state),
            false,
            ErrorCode::LivenessViolated,
        ) {
            error!(
                pred = ?violation.pred,
                state = ?violation.state,
                cycle_len = violation.cycle.len(),
                "Temporal property violated"
            );
        }
    }

    /// Report an evaluation failure, with the state being evaluated if known
    pub fn report_eval_error(&self, state: Option<&M::State>, err: &EvalError) {
        let accepted = match state {
            Some(s) => self
                .run_state
                .set_err_state(s, None, false, ErrorCode::EvaluationFailed),
            None => self.run_state.set_error(false, ErrorCode::EvaluationFailed),
        };
        if accepted {
            error!(error = %err, state = ?state, "Evaluation failed");
        }
    }
}

impl<M: Model> Introspect for CheckerContext<M> {
    fn config_snapshot(&self) -> &ConfigSnapshot {
        &self.snapshot
    }

    fn statistics(&self) -> Statistics {
        Statistics {
            queue: self.counters.queue.pending(),
            distinct: self.counters.distinct(),
            generated: self.counters.generated(),
            diameter: self.counters.diameter(),
            duration_secs: self.elapsed().as_secs(),
            worker: current_worker_id().unwrap_or(0),
        }
    }
}
