//! Error types for mc-coordinator
//!
//! This module defines two layers of failure:
//! - `ErrorCode`: the result taxonomy a model-checking run reports to its
//!   caller (violations, evaluation faults, maintenance faults)
//! - `thiserror` enums for everything that can go wrong while running the
//!   checker itself (configuration, worker threads, checkpoint I/O)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Violations found in the model are results, not Rust errors
//! - Capabilities a strategy lacks surface as `Unsupported`, never a panic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Outcome classification of a model-checking run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No violation found
    NoError,

    /// An invariant is false on a reachable state
    InvariantViolated,

    /// A reachable state has no successor
    Deadlock,

    /// A reachable cycle never reaches the liveness goal
    LivenessViolated,

    /// Evaluating the model raised an error
    EvaluationFailed,

    /// Writing or reading a checkpoint failed
    CheckpointFailed,

    /// Emitting coverage statistics failed
    CoverageFailed,
}

impl ErrorCode {
    /// Returns true unless this is `NoError`
    pub fn is_error(self) -> bool {
        self != ErrorCode::NoError
    }

    /// Returns true for violations of a property of the model
    pub fn is_violation(self) -> bool {
        matches!(
            self,
            ErrorCode::InvariantViolated | ErrorCode::Deadlock | ErrorCode::LivenessViolated
        )
    }

    /// Returns true for faults raised by periodic maintenance
    pub fn is_maintenance(self) -> bool {
        matches!(self, ErrorCode::CheckpointFailed | ErrorCode::CoverageFailed)
    }

    /// Process exit status for this outcome
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::Deadlock => 11,
            ErrorCode::InvariantViolated => 12,
            ErrorCode::LivenessViolated => 13,
            ErrorCode::CheckpointFailed | ErrorCode::CoverageFailed => 153,
            ErrorCode::EvaluationFailed => 255,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCode::NoError => "no error",
            ErrorCode::InvariantViolated => "invariant violated",
            ErrorCode::Deadlock => "deadlock reached",
            ErrorCode::LivenessViolated => "temporal property violated",
            ErrorCode::EvaluationFailed => "evaluation failed",
            ErrorCode::CheckpointFailed => "checkpoint failed",
            ErrorCode::CoverageFailed => "coverage report failed",
        };
        f.write_str(text)
    }
}

/// Top-level error type for the checker
#[derive(Error, Debug)]
pub enum CheckerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Checkpoint errors outside of periodic maintenance (e.g. recovery)
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// The active strategy lacks a capability
    #[error(transparent)]
    Unsupported(#[from] Unsupported),

    /// I/O errors (state dumps, metadata directory)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Interval must be positive
    #[error("Invalid {name} interval: must be greater than zero")]
    ZeroInterval { name: &'static str },

    /// Coverage must be reported no more often than progress
    #[error("Coverage interval ({coverage_secs}s) is shorter than the progress interval ({progress_secs}s)")]
    CoverageTooFrequent { coverage_secs: u64, progress_secs: u64 },

    /// Recovery source does not exist
    #[error("Cannot recover from '{path}': {reason}")]
    InvalidRecoveryPath { path: PathBuf, reason: String },

    /// Fingerprint polynomial could not be parsed
    #[error("Invalid fingerprint polynomial '{value}': {reason}")]
    InvalidFingerprint { value: String, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Checkpoint read/write errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// File system failure
    #[error("Checkpoint I/O on '{path}' failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding or decoding failure
    #[error("Checkpoint encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Checkpoint written by an incompatible version
    #[error("Checkpoint '{path}' has format version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// Checkpoint belongs to another model
    #[error("Checkpoint '{path}' was written for model '{found}', not '{expected}'")]
    ModelMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },
}

/// Failures of periodic maintenance; fatal to the run
#[derive(Error, Debug)]
pub enum MaintenanceError {
    /// Checkpoint could not be written
    #[error("Checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Coverage could not be emitted
    #[error("Coverage report failed: {0}")]
    Coverage(#[source] std::io::Error),
}

impl MaintenanceError {
    /// Result code the run terminates with
    pub fn code(&self) -> ErrorCode {
        match self {
            MaintenanceError::Checkpoint(_) => ErrorCode::CheckpointFailed,
            MaintenanceError::Coverage(_) => ErrorCode::CoverageFailed,
        }
    }
}

/// Error raised while evaluating the model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    /// Create an evaluation error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A capability the active strategy does not provide
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} is not supported by the {strategy} strategy")]
pub struct Unsupported {
    /// Operation that was requested
    pub operation: &'static str,

    /// Strategy that rejected it
    pub strategy: &'static str,
}

impl Unsupported {
    pub fn new(operation: &'static str, strategy: &'static str) -> Self {
        Self {
            operation,
            strategy,
        }
    }
}

/// Result type alias for CheckerError
pub type Result<T> = std::result::Result<T, CheckerError>;

/// Result type alias for EvalError
pub type EvalResult<T> = std::result::Result<T, EvalError>;
