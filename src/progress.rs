//! Progress reporting for model checking runs
//!
//! Provides a live spinner fed by the checker's progress reports, plus the
//! header and summary printed around a run.

use crate::checker::CheckOutcome;
use crate::error::ErrorCode;
use crate::introspect::{Statistics, Value};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

/// Spinner showing exploration status
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(spinner) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(spinner.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Update the display from a progress report
    pub fn update(&self, stats: &Statistics) {
        let msg = format!(
            "Generated: {} | Distinct: {} | Queue: {} | Diameter: {} | Rate: {:.0}/s",
            format_number(stats.generated),
            format_number(stats.distinct),
            format_number(stats.queue),
            stats.diameter,
            stats.states_per_second(),
        );
        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

fn headline(code: ErrorCode) -> String {
    match code {
        ErrorCode::NoError => style("Model checking completed. No error has been found.")
            .green()
            .bold()
            .to_string(),
        ErrorCode::CheckpointFailed | ErrorCode::CoverageFailed => {
            style(format!("Run aborted: {code}")).yellow().bold().to_string()
        }
        _ => style(format!("Error: {code}")).red().bold().to_string(),
    }
}

/// Print a summary of the run
pub fn print_summary<S: Debug>(outcome: &CheckOutcome<S>, locals: &Value, dump: Option<&Path>) {
    let secs = outcome.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        outcome.generated as f64 / secs
    } else {
        0.0
    };

    println!();
    println!("{}", headline(outcome.code));
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Generated:").bold(), format_number(outcome.generated));
    println!("  {} {}", style("Distinct:").bold(), format_number(outcome.distinct));
    println!("  {} {}", style("Diameter:").bold(), outcome.diameter);
    println!(
        "  {} {:.1}s ({:.0} states/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if outcome.totals.eval_errors > 0 {
        println!(
            "  {} {}",
            style("Eval errors:").yellow().bold(),
            format_number(outcome.totals.eval_errors)
        );
    }
    if let Value::Record(fields) = locals {
        if !fields.is_empty() {
            println!("  {} {}", style("Local values:").bold(), locals);
        }
    }
    if let Some(path) = dump {
        match std::fs::metadata(path) {
            Ok(meta) => println!(
                "  {} {} ({})",
                style("State graph:").bold(),
                path.display(),
                format_size(meta.len(), BINARY)
            ),
            Err(_) => println!("  {} {}", style("State graph:").bold(), path.display()),
        }
    }

    if !outcome.trace.is_empty() {
        println!();
        println!("{}", style("Behavior leading to the error").bold());
        for (i, step) in outcome.trace.iter().enumerate() {
            println!(
                "  {} {}",
                style(format!("{}:", i + 1)).dim(),
                step.action.unwrap_or("<Initial predicate>")
            );
            println!("     {:?}", step.state);
        }
    } else if let Some(state) = &outcome.err_state {
        println!();
        if let Some(pred) = &outcome.pred_err_state {
            println!("  {} {:?}", style("Predecessor:").bold(), pred);
        }
        println!("  {} {:?}", style("State:").bold(), state);
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(model: &str, strategy: &str, workers: usize, liveness: &str) {
    println!();
    println!("{} {}", style("mc-coordinator").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Model:").bold(), model);
    println!("  {} {}", style("Strategy:").bold(), strategy);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Liveness:").bold(), liveness);
    println!();
}
