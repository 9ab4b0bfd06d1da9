//! Integration tests for mc-coordinator
//!
//! These drive whole runs through `Checker::model_check` on small models,
//! with intervals shrunk so maintenance cycles happen within milliseconds.

use mc_coordinator::checker::LOCAL_SLOTS;
use mc_coordinator::error::{CheckerError, EvalResult};
use mc_coordinator::introspect::Value;
use mc_coordinator::models::{DieHard, Jugs, TokenRing, PEAK_REQUESTS_SLOT};
use mc_coordinator::{Checker, CheckerConfig, ErrorCode, EvalScope, Mode, Model, Successor};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::{tempdir, NamedTempFile};

/// Walk right or up on an `n` by `n` grid
struct Grid {
    n: u32,
    delay: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Cell(u32, u32);

impl Grid {
    fn new(n: u32) -> Self {
        Self { n, delay: None }
    }

    fn slow(n: u32) -> Self {
        Self {
            n,
            delay: Some(Duration::from_millis(1)),
        }
    }

    fn size(&self) -> u64 {
        (self.n as u64) * (self.n as u64)
    }
}

impl Model for Grid {
    type State = Cell;

    fn name(&self) -> &str {
        "Grid"
    }

    fn actions(&self) -> &[&'static str] {
        &["Right", "Up", "Rest"]
    }

    fn init_states(&self) -> EvalResult<Vec<Cell>> {
        Ok(vec![Cell(0, 0)])
    }

    fn next_states(&self, s: &Cell, _scope: &EvalScope<'_>) -> EvalResult<Vec<Successor<Cell>>> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let mut next = Vec::new();
        if s.0 + 1 < self.n {
            next.push(Successor::new(0, Cell(s.0 + 1, s.1)));
        }
        if s.1 + 1 < self.n {
            next.push(Successor::new(1, Cell(s.0, s.1 + 1)));
        }
        if next.is_empty() {
            next.push(Successor::new(2, *s));
        }
        Ok(next)
    }

    fn check_invariants(&self, _s: &Cell) -> EvalResult<Option<String>> {
        Ok(None)
    }
}

/// Counts down to zero, where nothing is enabled
struct Countdown(u32);

impl Model for Countdown {
    type State = u32;

    fn name(&self) -> &str {
        "Countdown"
    }

    fn actions(&self) -> &[&'static str] {
        &["Tick"]
    }

    fn init_states(&self) -> EvalResult<Vec<u32>> {
        Ok(vec![self.0])
    }

    fn next_states(&self, s: &u32, _scope: &EvalScope<'_>) -> EvalResult<Vec<Successor<u32>>> {
        Ok(s.checked_sub(1).map(|n| Successor::new(0, n)).into_iter().collect())
    }

    fn check_invariants(&self, _s: &u32) -> EvalResult<Option<String>> {
        Ok(None)
    }
}

/// Loops between 0 and 1 without reaching the goal, or leaves for a slow
/// walk through goal states
struct Lasso {
    tail: u32,
}

impl Model for Lasso {
    type State = u32;

    fn name(&self) -> &str {
        "Lasso"
    }

    fn actions(&self) -> &[&'static str] {
        &["Spin", "Leave", "Walk", "Rest"]
    }

    fn init_states(&self) -> EvalResult<Vec<u32>> {
        Ok(vec![0])
    }

    fn next_states(&self, s: &u32, _scope: &EvalScope<'_>) -> EvalResult<Vec<Successor<u32>>> {
        let next = match *s {
            0 => vec![Successor::new(0, 1), Successor::new(1, 2)],
            1 => vec![Successor::new(0, 0)],
            n if n < self.tail + 2 => {
                thread::sleep(Duration::from_millis(2));
                vec![Successor::new(2, n + 1)]
            }
            n => vec![Successor::new(3, n)],
        };
        Ok(next)
    }

    fn check_invariants(&self, _s: &u32) -> EvalResult<Option<String>> {
        Ok(None)
    }

    fn has_liveness(&self) -> bool {
        true
    }

    fn liveness_pending(&self, s: &u32) -> bool {
        *s < 2
    }
}

struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn fast_config(workers: usize) -> CheckerConfig {
    CheckerConfig {
        workers,
        initial_wait: Duration::from_millis(20),
        progress_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

#[test]
fn test_full_exploration_succeeds() {
    let checker = Checker::new(Grid::new(12), fast_config(4)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);

    let stats = checker.statistics();
    assert_eq!(stats.distinct, 144);
    assert_eq!(stats.diameter, 23);
    assert_eq!(stats.queue, 0);
    assert_eq!(checker.worker_totals().explored, 144);
    assert!(checker.is_done());
}

#[test]
fn test_invariant_violation_with_shortest_trace() {
    let checker = Checker::new(DieHard, fast_config(1)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::InvariantViolated);

    let outcome = checker.outcome(ErrorCode::InvariantViolated);
    let err = outcome.err_state.unwrap();
    assert_eq!(err.big, 4);
    assert_ne!(outcome.pred_err_state, Some(err));
    assert_eq!(
        outcome.pred_err_state,
        Some(outcome.trace[outcome.trace.len() - 2].state)
    );

    // Six pours is the shortest solution
    assert_eq!(outcome.trace.len(), 7);
    assert_eq!(outcome.trace[0].state, Jugs { big: 0, small: 0 });
    assert_eq!(outcome.trace[0].action, None);
    assert_eq!(outcome.trace.last().map(|s| s.state), Some(err));
}

#[test]
fn test_trace_between_states() {
    let checker = Checker::new(Grid::new(4), fast_config(1)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);

    let steps = checker.trace_info_between(&Cell(1, 0), &Cell(3, 0)).unwrap();
    let states: Vec<Cell> = steps.iter().map(|s| s.state).collect();
    assert_eq!(states, vec![Cell(1, 0), Cell(2, 0), Cell(3, 0)]);
    assert_eq!(steps[1].action, Some("Right"));

    // (0, 1) is not an ancestor of (3, 0)
    assert!(checker.trace_info_between(&Cell(0, 1), &Cell(3, 0)).unwrap().is_empty());
}

#[test]
fn test_continuation_keeps_exploring() {
    let config = CheckerConfig {
        continuation: true,
        ..fast_config(2)
    };
    let checker = Checker::new(DieHard, config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::InvariantViolated);

    let state = checker.run_state();
    assert!(state.errors_recorded >= 2);
    // All 16 reachable jug states were explored despite the violations
    assert_eq!(checker.statistics().distinct, 16);
}

#[test]
fn test_deadlock_detection() {
    let checker = Checker::new(Countdown(5), fast_config(2)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::Deadlock);
    assert_eq!(checker.run_state().err_state, Some(0));

    let config = CheckerConfig {
        check_deadlock: false,
        ..fast_config(2)
    };
    let checker = Checker::new(Countdown(5), config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert_eq!(checker.statistics().distinct, 6);
}

#[test]
fn test_depth_bound() {
    let config = CheckerConfig {
        depth: Some(3),
        check_deadlock: false,
        ..fast_config(2)
    };
    let checker = Checker::new(Countdown(10), config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert_eq!(checker.statistics().diameter, 3);
    assert_eq!(checker.statistics().distinct, 3);
}

#[test]
fn test_liveness_holds_without_hoarding() {
    let checker = Checker::new(TokenRing::new(3), fast_config(2)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert_eq!(checker.liveness_checker(), "standard");
    assert!(checker.liveness_searches() >= 1);

    let peaks = checker.get_all_value(PEAK_REQUESTS_SLOT);
    assert_eq!(peaks.len(), 2);
    assert!(peaks.iter().flatten().any(|v| v.as_int() == Some(3)));
}

#[test]
fn test_liveness_violation_when_token_hoarded() {
    let checker = Checker::new(TokenRing::new(3).with_hoarding(true), fast_config(2)).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::LivenessViolated);
    assert!(checker.run_state().err_state.is_some());
}

#[test]
fn test_liveness_testing_mode_finds_violation_during_search() {
    let config = CheckerConfig {
        liveness_testing: true,
        ..fast_config(1)
    };
    let checker = Checker::new(TokenRing::new(3).with_hoarding(true), config).unwrap();
    assert_eq!(checker.liveness_checker(), "testing");
    assert_eq!(checker.model_check().unwrap(), ErrorCode::LivenessViolated);
    assert!(checker.liveness_searches() >= 1);
}

#[test]
fn test_simulation_spends_trace_budget() {
    let config = CheckerConfig {
        mode: Mode::Simulate,
        depth: Some(20),
        traces: Some(50),
        ..fast_config(3)
    };
    let checker = Checker::new(TokenRing::new(3), config).unwrap();
    assert_eq!(checker.strategy_name(), "simulation");
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert!(checker.statistics().generated > 0);
    assert!(checker.statistics().diameter <= 20);
}

#[test]
fn test_simulation_finds_invariant_violation() {
    let config = CheckerConfig {
        mode: Mode::Simulate,
        depth: Some(50),
        seed: 7,
        ..fast_config(2)
    };
    let checker = Checker::new(DieHard, config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::InvariantViolated);
    assert_eq!(checker.run_state().err_state.map(|j| j.big), Some(4));
}

#[test]
fn test_simulation_lacks_suspend_and_traces() {
    let config = CheckerConfig {
        mode: Mode::Simulate,
        ..fast_config(1)
    };
    let checker = Checker::new(DieHard, config).unwrap();

    let err = checker.suspend().unwrap_err();
    assert!(err.to_string().contains("simulation"));
    assert!(checker.resume().is_err());
    assert!(checker.trace_info(&Jugs { big: 0, small: 0 }).is_err());
    assert!(checker.stop().is_ok());
}

#[test]
fn test_suspend_and_resume_exhaustive() {
    let checker = Checker::new(Grid::new(3), fast_config(1)).unwrap();
    checker.suspend().unwrap();
    checker.resume().unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert_eq!(checker.statistics().distinct, 9);
}

#[test]
fn test_stop_from_another_thread() {
    let model = Grid::slow(40);
    let total = model.size();
    let checker = Checker::new(model, fast_config(2)).unwrap();

    let code = thread::scope(|s| {
        let run = s.spawn(|| checker.model_check());
        thread::sleep(Duration::from_millis(100));
        checker.stop().unwrap();
        run.join().unwrap()
    })
    .unwrap();

    assert_eq!(code, ErrorCode::NoError);
    assert!(checker.statistics().distinct < total);
}

#[test]
fn test_time_budget_ends_run() {
    let config = CheckerConfig {
        stop_after: Some(Duration::from_millis(150)),
        ..fast_config(2)
    };
    let model = Grid::slow(40);
    let total = model.size();
    let checker = Checker::new(model, config).unwrap();
    assert!(checker.is_time_bound());

    let start = Instant::now();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(checker.statistics().distinct < total);
}

#[test]
fn test_shutdown_flag_ends_run() {
    let model = Grid::slow(40);
    let total = model.size();
    let checker = Checker::new(model, fast_config(2)).unwrap();
    checker.shutdown_flag().store(true, Ordering::SeqCst);

    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);
    assert!(checker.statistics().distinct < total);
}

#[test]
fn test_progress_reports_reach_callback() {
    let config = CheckerConfig {
        stop_after: Some(Duration::from_millis(150)),
        ..fast_config(2)
    };
    let checker = Checker::new(Grid::slow(40), config).unwrap();
    let reports = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reports);
    checker.on_progress(Box::new(move |_stats| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    checker.model_check().unwrap();
    assert!(reports.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_checkpoint_then_recover_completes_state_space() {
    let dir = tempdir().unwrap();
    let config = CheckerConfig {
        metadir: dir.path().to_path_buf(),
        checkpoint_interval: Some(Duration::from_millis(1)),
        stop_after: Some(Duration::from_millis(150)),
        ..fast_config(2)
    };
    let model = Grid::slow(30);
    let total = model.size();
    let first = Checker::new(model, config).unwrap();
    assert_eq!(first.model_check().unwrap(), ErrorCode::NoError);
    assert!(dir.path().join("checkpoint.json").exists());

    let config = CheckerConfig {
        recover: Some(dir.path().to_path_buf()),
        ..fast_config(2)
    };
    let resumed = Checker::new(Grid::new(30), config).unwrap();
    assert!(resumed.is_recovery());
    assert_eq!(resumed.model_check().unwrap(), ErrorCode::NoError);
    assert_eq!(resumed.statistics().distinct, total);
    assert_eq!(resumed.statistics().diameter, 59);
}

#[test]
fn test_liveness_violation_survives_recovery() {
    let dir = tempdir().unwrap();
    let config = CheckerConfig {
        metadir: dir.path().to_path_buf(),
        checkpoint_interval: Some(Duration::from_millis(1)),
        ..fast_config(1)
    };
    // The loop is recorded long before the first maintenance cycle, which
    // writes the checkpoint and then finds the violation
    let first = Checker::new(Lasso { tail: 100 }, config).unwrap();
    assert_eq!(first.model_check().unwrap(), ErrorCode::LivenessViolated);
    assert!(dir.path().join("checkpoint.json").exists());

    let config = CheckerConfig {
        recover: Some(dir.path().to_path_buf()),
        ..fast_config(1)
    };
    let resumed = Checker::new(Lasso { tail: 100 }, config).unwrap();
    assert!(resumed.is_recovery());
    assert_eq!(resumed.liveness_checker(), "standard");
    assert_eq!(resumed.model_check().unwrap(), ErrorCode::LivenessViolated);
    let state = resumed.run_state();
    assert!(matches!(state.err_state, Some(0 | 1)));
    assert!(matches!(state.pred_err_state, Some(0 | 1)));
}

#[test]
fn test_suspend_holds_across_checkpoints() {
    let dir = tempdir().unwrap();
    let config = CheckerConfig {
        metadir: dir.path().to_path_buf(),
        checkpoint_interval: Some(Duration::from_millis(1)),
        ..fast_config(2)
    };
    let model = Grid::slow(30);
    let total = model.size();
    let checker = Checker::new(model, config).unwrap();

    let (held, after, code) = thread::scope(|s| {
        let run = s.spawn(|| checker.model_check());
        thread::sleep(Duration::from_millis(100));
        checker.suspend().unwrap();
        let held = checker.statistics().distinct;
        // Long enough for many maintenance cycles, each writing a checkpoint
        thread::sleep(Duration::from_millis(300));
        let after = checker.statistics().distinct;
        checker.resume().unwrap();
        (held, after, run.join().unwrap())
    });

    assert_eq!(held, after);
    assert!(held < total);
    assert_eq!(code.unwrap(), ErrorCode::NoError);
    assert_eq!(checker.statistics().distinct, total);
}

#[test]
fn test_recover_from_empty_directory_fails() {
    let dir = tempdir().unwrap();
    let config = CheckerConfig {
        recover: Some(dir.path().to_path_buf()),
        ..fast_config(1)
    };
    let checker = Checker::new(Grid::new(3), config).unwrap();
    assert!(matches!(checker.model_check(), Err(CheckerError::Checkpoint(_))));
}

#[test]
fn test_checkpoint_failure_aborts_run() {
    // A regular file where the checkpoint directory should be
    let blocker = NamedTempFile::new().unwrap();
    let config = CheckerConfig {
        metadir: blocker.path().join("states"),
        checkpoint_interval: Some(Duration::from_millis(1)),
        ..fast_config(2)
    };
    let model = Grid::slow(40);
    let total = model.size();
    let checker = Checker::new(model, config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::CheckpointFailed);
    assert!(checker.is_done());
    assert!(checker.statistics().distinct < total);
}

#[test]
fn test_coverage_failure_aborts_run() {
    let config = CheckerConfig {
        coverage_interval: Some(Duration::from_millis(20)),
        ..fast_config(2)
    };
    let checker = Checker::builder(Grid::slow(40), config)
        .coverage_sink(Box::new(BrokenSink))
        .build()
        .unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::CoverageFailed);
}

#[test]
fn test_state_graph_dump() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.dot");
    let config = CheckerConfig {
        dump: Some(path.clone()),
        ..fast_config(2)
    };
    let checker = Checker::new(Grid::new(3), config).unwrap();
    assert_eq!(checker.model_check().unwrap(), ErrorCode::NoError);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("strict digraph DiskGraph {"));
    assert!(text.contains("Right"));
    assert!(text.trim_end().ends_with('}'));
}

#[test]
fn test_local_values_across_workers() {
    let checker = Checker::new(Grid::new(3), fast_config(3)).unwrap();
    assert!(checker.set_all_values(5, Value::Str("x".into())));
    assert!(!checker.set_all_values(LOCAL_SLOTS, Value::Bool(true)));

    let all = checker.get_all_values();
    let slot = all.field("5").unwrap();
    assert_eq!(
        slot,
        &Value::Tuple(vec![Value::Str("x".into()); 3])
    );
}

#[test]
fn test_first_error_wins_across_threads() {
    let checker = Checker::new(Countdown(3), fast_config(1)).unwrap();
    let winners = AtomicUsize::new(0);
    thread::scope(|s| {
        for i in 0..8u32 {
            let checker = &checker;
            let winners = &winners;
            s.spawn(move || {
                if checker.set_err_state(&i, None, false, ErrorCode::InvariantViolated) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(checker.run_state().errors_recorded, 1);
}

#[test]
fn test_config_and_statistics_records() {
    let config = CheckerConfig {
        seed: 42,
        ..fast_config(2)
    };
    let checker = Checker::new(Grid::new(3), config).unwrap();
    checker.model_check().unwrap();

    let cfg = checker.config();
    assert_eq!(cfg.field("seed").and_then(Value::as_str), Some("42"));
    assert_eq!(cfg.field("deadlock").and_then(Value::as_bool), Some(true));

    let stats = checker.statistics().to_value();
    assert_eq!(stats.field("distinct").and_then(Value::as_int), Some(9));
}

#[test]
fn test_invalid_worker_count_rejected() {
    let config = CheckerConfig {
        workers: 0,
        ..Default::default()
    };
    assert!(matches!(
        Checker::new(Grid::new(3), config),
        Err(CheckerError::Config(_))
    ));
}
