//! Token passing with service requests
//!
//! Processes sit on a ring and a single token moves around it. Any process
//! may raise a request; only the token holder can serve its own request,
//! which hands the token to the next process. A holder with a request must
//! serve it before it may pass. The liveness goal is that a request raised
//! by process 0 is eventually served.
//!
//! With hoarding enabled the holder may also keep the token indefinitely,
//! which breaks the liveness goal.

use crate::error::{EvalError, EvalResult};
use crate::introspect::Value;
use crate::model::{EvalScope, Model, Successor};
use serde::{Deserialize, Serialize};

const REQUEST: usize = 0;
const SERVE: usize = 1;
const PASS: usize = 2;
const KEEP: usize = 3;

const ACTIONS: &[&str] = &["Request", "Serve", "Pass", "Keep"];

/// Local value slot holding the most simultaneous requests a worker saw
pub const PEAK_REQUESTS_SLOT: usize = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ring {
    pub holder: usize,
    pub requesting: Vec<bool>,
}

impl Ring {
    fn pending_requests(&self) -> usize {
        self.requesting.iter().filter(|r| **r).count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenRing {
    processes: usize,
    hoarding: bool,
}

impl TokenRing {
    pub fn new(processes: usize) -> Self {
        Self {
            processes,
            hoarding: false,
        }
    }

    /// Allow the holder to keep the token forever
    pub fn with_hoarding(mut self, hoarding: bool) -> Self {
        self.hoarding = hoarding;
        self
    }
}

impl Model for TokenRing {
    type State = Ring;

    fn name(&self) -> &str {
        "TokenRing"
    }

    fn actions(&self) -> &[&'static str] {
        ACTIONS
    }

    fn init_states(&self) -> EvalResult<Vec<Ring>> {
        if self.processes == 0 {
            return Err(EvalError::new("token ring needs at least one process"));
        }
        Ok(vec![Ring {
            holder: 0,
            requesting: vec![false; self.processes],
        }])
    }

    fn next_states(&self, s: &Ring, scope: &EvalScope<'_>) -> EvalResult<Vec<Successor<Ring>>> {
        let pending = s.pending_requests() as u64;
        let peak = scope.get(PEAK_REQUESTS_SLOT).and_then(|v| v.as_int()).unwrap_or(0);
        if pending as i64 > peak {
            scope.set(PEAK_REQUESTS_SLOT, Value::count(pending));
        }

        let mut next = Vec::new();
        for (p, requesting) in s.requesting.iter().enumerate() {
            if !requesting {
                let mut succ = s.clone();
                succ.requesting[p] = true;
                next.push(Successor::new(REQUEST, succ));
            }
        }
        let mut succ = Ring {
            holder: (s.holder + 1) % self.processes,
            requesting: s.requesting.clone(),
        };
        if s.requesting[s.holder] {
            succ.requesting[s.holder] = false;
            next.push(Successor::new(SERVE, succ));
        } else {
            next.push(Successor::new(PASS, succ));
        }
        if self.hoarding {
            next.push(Successor::new(KEEP, s.clone()));
        }
        Ok(next)
    }

    fn check_invariants(&self, s: &Ring) -> EvalResult<Option<String>> {
        let ok = s.holder < self.processes && s.requesting.len() == self.processes;
        Ok((!ok).then(|| "TokenInRing".to_string()))
    }

    fn has_liveness(&self) -> bool {
        true
    }

    fn liveness_pending(&self, s: &Ring) -> bool {
        s.requesting[0]
    }
}
