//! Liveness checker variants
//!
//! ```text
//!                  liveness required?
//!                  /                \
//!                no                 yes
//!                 |                  |
//!           NoOpLiveCheck      testing option?
//!                              /            \
//!                            no             yes
//!                             |              |
//!                    StandardLiveCheck   AddAndCheckLiveCheck
//! ```
//!
//! The standard checker only records states; searching is deferred until
//! `check` is called from periodic maintenance. The testing variant searches
//! after every insertion, which finds violations as early as possible at a
//! much higher cost.

use super::graph::{BehaviorGraph, GraphSnapshot, LivenessViolation};
use crate::fingerprint::Fingerprint;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Liveness capability used by the checker
pub trait LiveCheck<S>: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether this checker does any work at all
    fn is_active(&self) -> bool {
        true
    }

    /// Record an initial state
    fn add_init_state(&self, fp: Fingerprint, state: &S, pending: bool);

    /// Record a transition; the testing variant may report a violation here
    fn add_next_state(
        &self,
        from: Fingerprint,
        to: Fingerprint,
        state: &S,
        pending: bool,
    ) -> Option<LivenessViolation<S>>;

    /// Search for a violation
    ///
    /// Without `force`, the search is skipped unless new states arrived
    /// since the previous one.
    fn check(&self, force: bool) -> Option<LivenessViolation<S>>;

    /// The last search of the run
    fn final_check(&self) -> Option<LivenessViolation<S>> {
        self.check(true)
    }

    /// Number of graph traversals performed
    fn searches(&self) -> u64;

    /// Copy of the recorded behavior graph, for checkpoints
    fn snapshot(&self) -> Option<GraphSnapshot<S>> {
        None
    }

    /// Reload a graph saved by `snapshot`; the next `check` searches it
    fn restore(&self, _snapshot: GraphSnapshot<S>) {}
}

/// Checker for runs without temporal properties
#[derive(Debug, Default)]
pub struct NoOpLiveCheck;

impl<S> LiveCheck<S> for NoOpLiveCheck {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_active(&self) -> bool {
        false
    }

    fn add_init_state(&self, _fp: Fingerprint, _state: &S, _pending: bool) {}

    fn add_next_state(
        &self,
        _from: Fingerprint,
        _to: Fingerprint,
        _state: &S,
        _pending: bool,
    ) -> Option<LivenessViolation<S>> {
        None
    }

    fn check(&self, _force: bool) -> Option<LivenessViolation<S>> {
        None
    }

    fn searches(&self) -> u64 {
        0
    }
}

struct Recorded<S> {
    graph: BehaviorGraph<S>,
    dirty: bool,
}

/// Graph shared by the two real checkers
struct Recorder<S> {
    inner: Mutex<Recorded<S>>,
    searches: AtomicU64,
    stats: bool,
}

impl<S: Clone> Recorder<S> {
    fn new(stats: bool) -> Self {
        Self {
            inner: Mutex::new(Recorded {
                graph: BehaviorGraph::new(),
                dirty: false,
            }),
            searches: AtomicU64::new(0),
            stats,
        }
    }

    fn add_init(&self, fp: Fingerprint, state: &S, pending: bool) {
        let mut inner = self.inner.lock();
        if inner.graph.add_node(fp, state, pending).1 {
            inner.dirty = true;
        }
    }

    fn add_next(&self, from: Fingerprint, to: Fingerprint, state: &S, pending: bool) {
        let mut inner = self.inner.lock();
        inner.graph.add_node(to, state, pending);
        inner.graph.add_edge(from, to);
        inner.dirty = true;
    }

    fn snapshot(&self) -> GraphSnapshot<S> {
        self.inner.lock().graph.export()
    }

    fn restore(&self, snapshot: GraphSnapshot<S>) {
        let mut inner = self.inner.lock();
        let dropped = inner.graph.import(snapshot);
        if dropped > 0 {
            warn!(dropped, "Restored behavior graph had edges to unknown states");
        }
        inner.dirty = true;
        debug!(
            nodes = inner.graph.node_count(),
            edges = inner.graph.edge_count(),
            "Behavior graph restored"
        );
    }

    fn search(&self, force: bool) -> Option<LivenessViolation<S>> {
        let mut inner = self.inner.lock();
        if !force && !inner.dirty {
            return None;
        }
        inner.dirty = false;
        self.searches.fetch_add(1, Ordering::Relaxed);
        let violation = inner.graph.find_pending_cycle();
        debug!(
            nodes = inner.graph.node_count(),
            edges = inner.graph.edge_count(),
            found = violation.is_some(),
            "Liveness search"
        );
        violation
    }

    fn log_stats(&self) {
        if !self.stats {
            return;
        }
        let inner = self.inner.lock();
        info!(
            nodes = inner.graph.node_count(),
            edges = inner.graph.edge_count(),
            "Behavior graph statistics"
        );
        for (degree, count) in inner.graph.out_degree_histogram() {
            info!(out_degree = degree, nodes = count, "Out-degree histogram");
        }
    }
}

/// Incremental checker re-evaluated during periodic maintenance
pub struct StandardLiveCheck<S> {
    recorder: Recorder<S>,
}

impl<S: Clone> StandardLiveCheck<S> {
    pub fn new(stats: bool) -> Self {
        Self {
            recorder: Recorder::new(stats),
        }
    }
}

impl<S: Clone + Send> LiveCheck<S> for StandardLiveCheck<S> {
    fn name(&self) -> &'static str {
        "standard"
    }

    fn add_init_state(&self, fp: Fingerprint, state: &S, pending: bool) {
        self.recorder.add_init(fp, state, pending);
    }

    fn add_next_state(
        &self,
        from: Fingerprint,
        to: Fingerprint,
        state: &S,
        pending: bool,
    ) -> Option<LivenessViolation<S>> {
        self.recorder.add_next(from, to, state, pending);
        None
    }

    fn check(&self, force: bool) -> Option<LivenessViolation<S>> {
        self.recorder.search(force)
    }

    fn final_check(&self) -> Option<LivenessViolation<S>> {
        let violation = self.recorder.search(true);
        self.recorder.log_stats();
        violation
    }

    fn searches(&self) -> u64 {
        self.recorder.searches.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Option<GraphSnapshot<S>> {
        Some(self.recorder.snapshot())
    }

    fn restore(&self, snapshot: GraphSnapshot<S>) {
        self.recorder.restore(snapshot);
    }
}

/// Checker that searches after every insertion
pub struct AddAndCheckLiveCheck<S> {
    recorder: Recorder<S>,
}

impl<S: Clone> AddAndCheckLiveCheck<S> {
    pub fn new(stats: bool) -> Self {
        Self {
            recorder: Recorder::new(stats),
        }
    }
}

impl<S: Clone + Send> LiveCheck<S> for AddAndCheckLiveCheck<S> {
    fn name(&self) -> &'static str {
        "testing"
    }

    fn add_init_state(&self, fp: Fingerprint, state: &S, pending: bool) {
        self.recorder.add_init(fp, state, pending);
    }

    fn add_next_state(
        &self,
        from: Fingerprint,
        to: Fingerprint,
        state: &S,
        pending: bool,
    ) -> Option<LivenessViolation<S>> {
        self.recorder.add_next(from, to, state, pending);
        self.recorder.search(true)
    }

    fn check(&self, force: bool) -> Option<LivenessViolation<S>> {
        self.recorder.search(force)
    }

    fn final_check(&self) -> Option<LivenessViolation<S>> {
        let violation = self.recorder.search(true);
        self.recorder.log_stats();
        violation
    }

    fn searches(&self) -> u64 {
        self.recorder.searches.load(Ordering::Relaxed)
    }

    fn snapshot(&self) -> Option<GraphSnapshot<S>> {
        Some(self.recorder.snapshot())
    }

    fn restore(&self, snapshot: GraphSnapshot<S>) {
        self.recorder.restore(snapshot);
    }
}

/// Pick the checker for a run
pub fn select<S>(required: bool, testing: bool, stats: bool) -> Box<dyn LiveCheck<S>>
where
    S: Clone + Send + 'static,
{
    match (required, testing) {
        (false, _) => Box::new(NoOpLiveCheck),
        (true, false) => Box::new(StandardLiveCheck::new(stats)),
        (true, true) => Box::new(AddAndCheckLiveCheck::new(stats)),
    }
}
