//! Shared "is the run finished, and did it fail" record
//!
//! Every field lives behind one mutex. The condition variable is notified
//! exactly when `done` flips from false to true, which is what the
//! coordinator's bounded waits sleep on.
//!
//! The first error wins: once the run is done, later reports are rejected
//! unless the run was started in continuation mode.

use super::worker::reset_current_state;
use crate::error::ErrorCode;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Plain run outcome fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState<S> {
    /// Whether the run has finished
    pub done: bool,

    /// Outcome recorded so far
    pub error_code: ErrorCode,

    /// The state exhibiting the error
    pub err_state: Option<S>,

    /// Its predecessor; equal to `err_state` for initial states
    pub pred_err_state: Option<S>,

    /// Whether the caller wants the call stack instead of an error result
    pub keep_call_stack: bool,

    /// Number of accepted error reports
    pub errors_recorded: u64,
}

impl<S> Default for RunState<S> {
    fn default() -> Self {
        Self {
            done: false,
            error_code: ErrorCode::NoError,
            err_state: None,
            pred_err_state: None,
            keep_call_stack: false,
            errors_recorded: 0,
        }
    }
}

/// `RunState` shared between the coordinator and its workers
pub struct SharedRunState<S> {
    inner: Mutex<RunState<S>>,
    done_cv: Condvar,
    continuation: bool,
}

impl<S: Clone> SharedRunState<S> {
    /// Create a fresh record; `continuation` lets later errors overwrite earlier ones
    pub fn new(continuation: bool) -> Self {
        Self {
            inner: Mutex::new(RunState::default()),
            done_cv: Condvar::new(),
            continuation,
        }
    }

    pub fn continuation(&self) -> bool {
        self.continuation
    }

    fn accepts(&self, inner: &RunState<S>) -> bool {
        self.continuation || !inner.done
    }

    fn finish(&self, mut inner: MutexGuard<'_, RunState<S>>) {
        let flipped = !inner.done;
        inner.done = true;
        drop(inner);
        if flipped {
            self.done_cv.notify_all();
        }
    }

    /// Record an error found while exploring `cur`
    ///
    /// `succ` is the offending successor, or `None` when `cur` itself is at
    /// fault (deadlock, or a violation on an initial state). Returns false,
    /// without changing anything, if an earlier error already won.
    pub fn set_err_state(
        &self,
        cur: &S,
        succ: Option<&S>,
        keep_call_stack: bool,
        code: ErrorCode,
    ) -> bool {
        let mut inner = self.inner.lock();
        if !self.accepts(&inner) {
            return false;
        }
        inner.pred_err_state = Some(cur.clone());
        inner.err_state = Some(succ.unwrap_or(cur).clone());
        inner.error_code = code;
        inner.keep_call_stack = keep_call_stack;
        inner.errors_recorded += 1;
        reset_current_state();
        debug!(code = %code, "Error state recorded");
        self.finish(inner);
        true
    }

    /// Record an error that has no state pair attached
    pub fn set_error(&self, keep_call_stack: bool, code: ErrorCode) -> bool {
        let mut inner = self.inner.lock();
        if !self.accepts(&inner) {
            return false;
        }
        inner.error_code = code;
        inner.keep_call_stack = keep_call_stack;
        inner.errors_recorded += 1;
        reset_current_state();
        debug!(code = %code, "Error recorded");
        self.finish(inner);
        true
    }

    /// Record an error without ending the run
    ///
    /// Only meaningful in continuation mode; otherwise behaves like
    /// `set_err_state`.
    pub fn note_violation(&self, cur: &S, succ: Option<&S>, code: ErrorCode) -> bool {
        if !self.continuation {
            return self.set_err_state(cur, succ, false, code);
        }
        let mut inner = self.inner.lock();
        inner.pred_err_state = Some(cur.clone());
        inner.err_state = Some(succ.unwrap_or(cur).clone());
        inner.error_code = code;
        inner.errors_recorded += 1;
        true
    }

    /// Mark the run finished, returning the previous value
    pub fn set_done(&self) -> bool {
        let inner = self.inner.lock();
        let was_done = inner.done;
        self.finish(inner);
        was_done
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    pub fn error_code(&self) -> ErrorCode {
        self.inner.lock().error_code
    }

    pub fn keep_call_stack(&self) -> bool {
        self.inner.lock().keep_call_stack
    }

    pub fn err_state(&self) -> Option<S> {
        self.inner.lock().err_state.clone()
    }

    pub fn pred_err_state(&self) -> Option<S> {
        self.inner.lock().pred_err_state.clone()
    }

    /// Copy of every field
    pub fn snapshot(&self) -> RunState<S> {
        self.inner.lock().clone()
    }

    /// Wait until done or `timeout` elapses; returns whether done
    pub fn wait_done(&self, timeout: Duration) -> bool {
        self.wait_done_until(Instant::now() + timeout)
    }

    /// Wait until done or `deadline` passes; returns whether done
    pub fn wait_done_until(&self, deadline: Instant) -> bool {
        let mut inner = self.inner.lock();
        while !inner.done {
            if self.done_cv.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::worker::{current_state, set_current_state};
    use crate::fingerprint::Fingerprint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_first_error_wins() {
        let rs = SharedRunState::new(false);
        assert!(rs.set_err_state(&1, Some(&2), false, ErrorCode::InvariantViolated));
        assert!(!rs.set_err_state(&3, None, false, ErrorCode::Deadlock));
        assert!(!rs.set_error(true, ErrorCode::EvaluationFailed));

        let snap = rs.snapshot();
        assert!(snap.done);
        assert_eq!(snap.error_code, ErrorCode::InvariantViolated);
        assert_eq!(snap.pred_err_state, Some(1));
        assert_eq!(snap.err_state, Some(2));
        assert!(!snap.keep_call_stack);
        assert_eq!(snap.errors_recorded, 1);
    }

    #[test]
    fn test_reports_clear_current_state() {
        let rs: SharedRunState<u8> = SharedRunState::new(true);
        set_current_state(Fingerprint(4));
        assert!(rs.set_error(false, ErrorCode::EvaluationFailed));
        assert_eq!(current_state(), None);

        set_current_state(Fingerprint(5));
        assert!(rs.set_err_state(&1, None, false, ErrorCode::Deadlock));
        assert_eq!(current_state(), None);
    }

    #[test]
    fn test_initial_state_error_has_equal_pair() {
        let rs = SharedRunState::new(false);
        assert!(rs.set_err_state(&"init", None, false, ErrorCode::InvariantViolated));
        assert_eq!(rs.err_state(), Some("init"));
        assert_eq!(rs.pred_err_state(), Some("init"));
    }

    #[test]
    fn test_error_rejected_after_done() {
        let rs: SharedRunState<u8> = SharedRunState::new(false);
        assert!(!rs.set_done());
        assert!(!rs.set_error(false, ErrorCode::EvaluationFailed));
        assert_eq!(rs.error_code(), ErrorCode::NoError);
    }

    #[test]
    fn test_continuation_allows_overwrite() {
        let rs = SharedRunState::new(true);
        assert!(rs.set_err_state(&1, None, false, ErrorCode::InvariantViolated));
        assert!(rs.set_err_state(&5, None, false, ErrorCode::Deadlock));
        assert_eq!(rs.error_code(), ErrorCode::Deadlock);
        assert_eq!(rs.snapshot().errors_recorded, 2);
    }

    #[test]
    fn test_note_violation_keeps_running_in_continuation() {
        let rs = SharedRunState::new(true);
        assert!(rs.note_violation(&1, Some(&2), ErrorCode::InvariantViolated));
        assert!(!rs.is_done());
        assert_eq!(rs.error_code(), ErrorCode::InvariantViolated);

        let rs = SharedRunState::new(false);
        assert!(rs.note_violation(&1, Some(&2), ErrorCode::InvariantViolated));
        assert!(rs.is_done());
    }

    #[test]
    fn test_set_done_idempotent() {
        let rs: SharedRunState<u8> = SharedRunState::new(false);
        assert!(!rs.set_done());
        assert!(rs.set_done());
        assert!(rs.set_done());
        assert_eq!(rs.error_code(), ErrorCode::NoError);
    }

    #[test]
    fn test_concurrent_reports_have_one_winner() {
        for _ in 0..20 {
            let rs = Arc::new(SharedRunState::new(false));
            let barrier = Arc::new(Barrier::new(8));
            let winners = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..8u32)
                .map(|i| {
                    let rs = Arc::clone(&rs);
                    let barrier = Arc::clone(&barrier);
                    let winners = Arc::clone(&winners);
                    thread::spawn(move || {
                        barrier.wait();
                        let won = if i % 2 == 0 {
                            rs.set_err_state(&i, None, false, ErrorCode::InvariantViolated)
                        } else {
                            rs.set_error(false, ErrorCode::EvaluationFailed)
                        };
                        if won {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
            let snap = rs.snapshot();
            assert_eq!(snap.errors_recorded, 1);
            match snap.error_code {
                ErrorCode::InvariantViolated => assert!(snap.err_state.is_some()),
                ErrorCode::EvaluationFailed => assert!(snap.err_state.is_none()),
                other => panic!("unexpected code {other}"),
            }
        }
    }

    #[test]
    fn test_wait_done_wakes_early() {
        let rs: Arc<SharedRunState<u8>> = Arc::new(SharedRunState::new(false));
        let setter = {
            let rs = Arc::clone(&rs);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                rs.set_done();
            })
        };
        let start = Instant::now();
        assert!(rs.wait_done(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        setter.join().unwrap();
    }

    #[test]
    fn test_wait_done_times_out() {
        let rs: SharedRunState<u8> = SharedRunState::new(false);
        assert!(!rs.wait_done(Duration::from_millis(10)));
    }
}
