//! Configuration types for mc-coordinator
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Fingerprint polynomial parsing

use crate::error::ConfigError;
use crate::fingerprint::FP64_INIT;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default behavior length bound for simulation
pub const DEFAULT_SIMULATION_DEPTH: u32 = 100;

/// Model checking coordinator running demo specifications
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mc-coordinator",
    version,
    about = "Multi-threaded explicit-state model checker",
    long_about = "Explores the state graph of a model with a pool of worker threads,\n\
                  checking invariants, deadlock and liveness.\n\n\
                  Long runs can be checkpointed and resumed with --recover.",
    after_help = "EXAMPLES:\n    \
        mc-coordinator die-hard\n    \
        mc-coordinator token-ring --processes 5 -w 8\n    \
        mc-coordinator token-ring --mode simulate --depth 50 --traces 1000\n    \
        mc-coordinator die-hard --metadir states --checkpoint 5\n    \
        mc-coordinator die-hard --recover states"
)]
pub struct CliArgs {
    /// Model to check
    #[arg(value_enum, value_name = "MODEL")]
    pub model: DemoModel,

    /// Number of processes in the token ring
    #[arg(long, default_value = "4", value_name = "NUM")]
    pub processes: usize,

    /// Let the token holder keep the token forever (token ring)
    #[arg(long)]
    pub hoarding: bool,

    /// Exploration mode
    #[arg(short, long, value_enum, default_value_t = Mode::Bfs)]
    pub mode: Mode,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Maximum behavior length (simulation default 100, unbounded otherwise)
    #[arg(short = 'd', long, value_name = "NUM")]
    pub depth: Option<u32>,

    /// Do not report states without successors
    #[arg(long)]
    pub no_deadlock: bool,

    /// Random seed (simulation)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub seed: u64,

    /// Fingerprint polynomial (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "POLY")]
    pub fingerprint: Option<String>,

    /// Directory for checkpoints and other run metadata
    #[arg(long, default_value = "states", value_name = "DIR")]
    pub metadir: PathBuf,

    /// Resume from a checkpoint file or metadata directory
    #[arg(long, value_name = "PATH")]
    pub recover: Option<PathBuf>,

    /// Minutes between checkpoints (0 disables)
    #[arg(long, default_value = "30", value_name = "MINUTES")]
    pub checkpoint: u64,

    /// Seconds between progress reports
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub progress: u64,

    /// Minutes between coverage reports (0 disables)
    #[arg(long, default_value = "0", value_name = "MINUTES")]
    pub coverage: u64,

    /// Keep exploring after an invariant violation
    #[arg(long = "continue")]
    pub continuation: bool,

    /// Stop the run after this many seconds
    #[arg(long, env = "MC_STOP_AFTER", value_name = "SECS")]
    pub stop_after: Option<u64>,

    /// Search for liveness violations after every new state
    #[arg(long)]
    pub liveness_testing: bool,

    /// Log behavior graph statistics at the end of the run
    #[arg(long)]
    pub liveness_stats: bool,

    /// Number of behaviors to generate (simulation, unbounded if not set)
    #[arg(long, value_name = "NUM")]
    pub traces: Option<u64>,

    /// Write the explored state graph to a GraphViz file
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Bundled models selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DemoModel {
    /// The water jug puzzle; the invariant fails when 4 gallons are measured
    DieHard,

    /// Token passing among processes; every request is eventually served
    TokenRing,
}

/// How the state graph is explored
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Exhaustive breadth-first search
    Bfs,

    /// Random walks
    Simulate,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Bfs => "bfs",
            Mode::Simulate => "simulate",
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Parse a polynomial written in decimal or `0x` hex
pub fn parse_fingerprint(value: &str) -> Result<u64, ConfigError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    match parsed {
        Ok(0) => Err(ConfigError::InvalidFingerprint {
            value: value.to_string(),
            reason: "polynomial must be non-zero".into(),
        }),
        Ok(poly) => Ok(poly),
        Err(e) => Err(ConfigError::InvalidFingerprint {
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Exploration mode
    pub mode: Mode,

    /// Number of worker threads
    pub workers: usize,

    /// Maximum behavior length
    pub depth: Option<u32>,

    /// Report states without successors
    pub check_deadlock: bool,

    /// Random seed
    pub seed: u64,

    /// Fingerprint polynomial
    pub fp_poly: u64,

    /// Directory for checkpoints
    pub metadir: PathBuf,

    /// Checkpoint to resume from
    pub recover: Option<PathBuf>,

    /// Time between checkpoints (None disables)
    pub checkpoint_interval: Option<Duration>,

    /// Time between progress reports
    pub progress_interval: Duration,

    /// Time between coverage reports (None disables)
    pub coverage_interval: Option<Duration>,

    /// Keep exploring after an invariant violation
    pub continuation: bool,

    /// Wall-clock budget for the run
    pub stop_after: Option<Duration>,

    /// Search for liveness violations after every new state
    pub liveness_testing: bool,

    /// Log behavior graph statistics
    pub liveness_stats: bool,

    /// Number of behaviors to generate in simulation
    pub traces: Option<u64>,

    /// GraphViz dump of the state graph
    pub dump: Option<PathBuf>,

    /// Longest wait for early completion before maintenance starts
    pub initial_wait: Duration,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Bfs,
            workers: 1,
            depth: None,
            check_deadlock: true,
            seed: 0,
            fp_poly: FP64_INIT,
            metadir: PathBuf::from("states"),
            recover: None,
            checkpoint_interval: None,
            progress_interval: Duration::from_secs(60),
            coverage_interval: None,
            continuation: false,
            stop_after: None,
            liveness_testing: false,
            liveness_stats: false,
            traces: None,
            dump: None,
            initial_wait: Duration::from_secs(3),
            show_progress: false,
            verbose: false,
        }
    }
}

impl CheckerConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let fp_poly = match &args.fingerprint {
            Some(value) => parse_fingerprint(value)?,
            None => FP64_INIT,
        };

        let minutes = |m: u64| (m > 0).then(|| Duration::from_secs(m.saturating_mul(60)));

        let config = Self {
            mode: args.mode,
            workers: args.workers,
            depth: args.depth,
            check_deadlock: !args.no_deadlock,
            seed: args.seed,
            fp_poly,
            metadir: args.metadir.clone(),
            recover: args.recover.clone(),
            checkpoint_interval: minutes(args.checkpoint),
            progress_interval: Duration::from_secs(args.progress),
            coverage_interval: minutes(args.coverage),
            continuation: args.continuation,
            stop_after: args.stop_after.map(Duration::from_secs),
            liveness_testing: args.liveness_testing,
            liveness_stats: args.liveness_stats,
            traces: args.traces,
            dump: args.dump.clone(),
            show_progress: !args.quiet,
            verbose: args.verbose,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for inconsistencies
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate worker count
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.workers,
                max: MAX_WORKERS,
            });
        }

        if self.progress_interval.is_zero() {
            return Err(ConfigError::ZeroInterval { name: "progress" });
        }

        if let Some(coverage) = self.coverage_interval {
            if coverage < self.progress_interval {
                return Err(ConfigError::CoverageTooFrequent {
                    coverage_secs: coverage.as_secs(),
                    progress_secs: self.progress_interval.as_secs(),
                });
            }
        }

        // Validate recovery source
        if let Some(path) = &self.recover {
            if !path.exists() {
                return Err(ConfigError::InvalidRecoveryPath {
                    path: path.clone(),
                    reason: "path does not exist".into(),
                });
            }
        }

        Ok(())
    }

    /// Behavior length bound handed to the run
    pub fn effective_depth(&self) -> u32 {
        match (self.depth, self.mode) {
            (Some(depth), _) => depth,
            (None, Mode::Simulate) => DEFAULT_SIMULATION_DEPTH,
            (None, Mode::Bfs) => u32::MAX,
        }
    }

    /// Progress reports between two coverage reports
    pub fn coverage_cadence(&self) -> u64 {
        match self.coverage_interval {
            Some(coverage) => {
                let ratio = coverage.as_millis() / self.progress_interval.as_millis().max(1);
                u64::try_from(ratio).unwrap_or(u64::MAX).max(1)
            }
            None => u64::MAX,
        }
    }

    /// Whether the run resumes from a checkpoint
    pub fn is_recovery(&self) -> bool {
        self.recover.is_some()
    }
}
