//! Run telemetry exposed to the model being checked
//!
//! A model can query two read-only records by field name:
//! - the config snapshot, fixed at construction
//! - the statistics snapshot, recomputed from live counters on every query

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field names shared by both records
pub mod keys {
    pub const MODE: &str = "mode";
    pub const DEADLOCK: &str = "deadlock";
    pub const WORKER: &str = "worker";
    pub const SEED: &str = "seed";
    pub const FINGERPRINT: &str = "fingerprint";
    pub const INSTALL: &str = "install";

    pub const QUEUE: &str = "queue";
    pub const DISTINCT: &str = "distinct";
    pub const GENERATED: &str = "generated";
    pub const DIAMETER: &str = "diameter";
    pub const DURATION: &str = "duration";
}

/// A value visible to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Narrow an unsigned counter into the integer range, saturating
    pub fn count(n: u64) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Field lookup on a record value
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tuple(items) => {
                f.write_str("<<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(">>")
            }
            Value::Record(fields) => {
                f.write_str("[")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name} |-> {value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Immutable description of how the run was configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Exploration mode ("bfs" or "simulate")
    pub mode: String,

    /// Whether deadlock is checked
    pub deadlock: bool,

    /// Number of workers
    pub workers: usize,

    /// Random seed
    pub seed: u64,

    /// Fingerprint polynomial
    pub fingerprint: u64,

    /// Location of the running executable
    pub install: String,
}

impl ConfigSnapshot {
    /// Look up one field by name
    pub fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            keys::MODE => Value::Str(self.mode.clone()),
            keys::DEADLOCK => Value::Bool(self.deadlock),
            keys::WORKER => Value::count(self.workers as u64),
            keys::SEED => Value::Str(self.seed.to_string()),
            keys::FINGERPRINT => Value::Str(self.fingerprint.to_string()),
            keys::INSTALL => Value::Str(self.install.clone()),
            _ => return None,
        };
        Some(value)
    }

    /// The whole snapshot as a record
    pub fn to_value(&self) -> Value {
        record(
            &[
                keys::MODE,
                keys::DEADLOCK,
                keys::WORKER,
                keys::SEED,
                keys::FINGERPRINT,
                keys::INSTALL,
            ],
            |k| self.get(k),
        )
    }
}

/// Point-in-time exploration statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    /// States waiting to be explored
    pub queue: u64,

    /// Distinct states found
    pub distinct: u64,

    /// States generated, including duplicates
    pub generated: u64,

    /// Longest behavior explored so far
    pub diameter: u64,

    /// Seconds since the run started
    pub duration_secs: u64,

    /// Worker issuing the query (0 outside worker threads)
    pub worker: usize,
}

impl Statistics {
    /// Look up one field by name
    pub fn get(&self, name: &str) -> Option<Value> {
        let value = match name {
            keys::QUEUE => Value::count(self.queue),
            keys::DISTINCT => Value::count(self.distinct),
            keys::GENERATED => Value::count(self.generated),
            keys::DIAMETER => Value::count(self.diameter),
            keys::DURATION => Value::count(self.duration_secs),
            keys::WORKER => Value::count(self.worker as u64),
            _ => return None,
        };
        Some(value)
    }

    /// The whole snapshot as a record
    pub fn to_value(&self) -> Value {
        record(
            &[
                keys::QUEUE,
                keys::DISTINCT,
                keys::GENERATED,
                keys::DIAMETER,
                keys::DURATION,
                keys::WORKER,
            ],
            |k| self.get(k),
        )
    }

    /// Generated states per second
    pub fn states_per_second(&self) -> f64 {
        if self.duration_secs > 0 {
            self.generated as f64 / self.duration_secs as f64
        } else {
            0.0
        }
    }
}

fn record(names: &[&str], get: impl Fn(&str) -> Option<Value>) -> Value {
    Value::Record(
        names
            .iter()
            .filter_map(|name| get(name).map(|v| (name.to_string(), v)))
            .collect(),
    )
}

/// Read access to the run's telemetry
pub trait Introspect: Send + Sync {
    fn config_snapshot(&self) -> &ConfigSnapshot;

    fn statistics(&self) -> Statistics;
}
