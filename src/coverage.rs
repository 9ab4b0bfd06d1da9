//! Per-action coverage counters
//!
//! Counts, for every action of the model, how many successors it generated
//! and how many of those were new. The report is logged and, when a sink is
//! attached, also written to it; a failing sink ends the run.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Coverage counters for one run
pub struct CostModel {
    actions: Vec<&'static str>,
    generated: Vec<AtomicU64>,
    distinct: Vec<AtomicU64>,
    reports: AtomicU64,
    sink: Option<Mutex<Box<dyn Write + Send>>>,
}

/// Counters of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCoverage {
    pub action: &'static str,
    pub generated: u64,
    pub distinct: u64,
}

impl CostModel {
    pub fn new(actions: &[&'static str]) -> Self {
        Self {
            actions: actions.to_vec(),
            generated: actions.iter().map(|_| AtomicU64::new(0)).collect(),
            distinct: actions.iter().map(|_| AtomicU64::new(0)).collect(),
            reports: AtomicU64::new(0),
            sink: None,
        }
    }

    /// Also write every report to `sink`
    pub fn with_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.sink = Some(Mutex::new(sink));
        self
    }

    /// Count one successor produced by `action`
    pub fn record(&self, action: usize, is_new: bool) {
        if let Some(counter) = self.generated.get(action) {
            counter.fetch_add(1, Ordering::Relaxed);
            if is_new {
                self.distinct[action].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Current counters, in action order
    pub fn snapshot(&self) -> Vec<ActionCoverage> {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, &action)| ActionCoverage {
                action,
                generated: self.generated[i].load(Ordering::Relaxed),
                distinct: self.distinct[i].load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Number of reports emitted so far
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::Relaxed)
    }

    /// Emit the coverage report
    pub fn report(&self) -> io::Result<()> {
        let snapshot = self.snapshot();
        for entry in &snapshot {
            info!(
                action = entry.action,
                generated = entry.generated,
                distinct = entry.distinct,
                "Coverage"
            );
        }

        if let Some(sink) = &self.sink {
            let mut sink = sink.lock();
            for entry in &snapshot {
                writeln!(sink, "<{}>: {}:{}", entry.action, entry.distinct, entry.generated)?;
            }
            sink.flush()?;
        }

        self.reports.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
