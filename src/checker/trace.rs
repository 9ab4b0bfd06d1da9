//! Parent pointers for counterexample reconstruction
//!
//! Every distinct state found by the exhaustive search is recorded with the
//! fingerprint of the state it was first reached from. Following those
//! pointers back to an initial state yields a shortest behavior, since the
//! search is breadth-first.

use crate::checkpoint::TraceRecord;
use crate::fingerprint::Fingerprint;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Number of lock stripes
const SHARDS: usize = 16;

/// One recorded state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry<S> {
    pub parent: Option<Fingerprint>,
    pub action: Option<usize>,
    pub state: S,
}

/// One step of a reconstructed behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep<S> {
    /// Action that produced the state; `None` for the initial state
    pub action: Option<&'static str>,

    /// The state reached
    pub state: S,
}

/// Concurrent map from fingerprint to trace entry
pub struct TraceStore<S> {
    shards: Vec<Mutex<HashMap<Fingerprint, TraceEntry<S>>>>,
}

impl<S: Clone> TraceStore<S> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, fp: Fingerprint) -> &Mutex<HashMap<Fingerprint, TraceEntry<S>>> {
        &self.shards[(fp.0 >> 60) as usize % SHARDS]
    }

    /// Record `state`; the first record for a fingerprint wins
    pub fn insert(
        &self,
        fp: Fingerprint,
        parent: Option<Fingerprint>,
        action: Option<usize>,
        state: S,
    ) {
        self.shard(fp)
            .lock()
            .entry(fp)
            .or_insert(TraceEntry { parent, action, state });
    }

    pub fn get(&self, fp: Fingerprint) -> Option<TraceEntry<S>> {
        self.shard(fp).lock().get(&fp).cloned()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Behavior from an initial state to `to`, optionally starting at `from`
    ///
    /// Returns an empty vector when `to` is unknown or `from` is not on the
    /// path leading to it.
    pub fn path(
        &self,
        from: Option<Fingerprint>,
        to: Fingerprint,
        actions: &[&'static str],
    ) -> Vec<TraceStep<S>> {
        let mut steps = Vec::new();
        let mut cursor = Some(to);
        let mut reached_from = from.is_none();
        let limit = self.len();

        while let Some(fp) = cursor {
            let Some(entry) = self.get(fp) else {
                return Vec::new();
            };
            steps.push(TraceStep {
                action: entry.action.and_then(|a| actions.get(a).copied()),
                state: entry.state,
            });
            if Some(fp) == from {
                reached_from = true;
                break;
            }
            cursor = entry.parent;
            // A malformed store must not loop forever
            if steps.len() > limit {
                return Vec::new();
            }
        }

        if !reached_from {
            return Vec::new();
        }
        steps.reverse();
        steps
    }

    /// Every entry, for checkpointing
    pub fn records(&self) -> Vec<TraceRecord<S>> {
        let mut records = Vec::new();
        for shard in &self.shards {
            records.extend(shard.lock().iter().map(|(fp, entry)| TraceRecord {
                fp: *fp,
                parent: entry.parent,
                action: entry.action,
                state: entry.state.clone(),
            }));
        }
        records
    }

    /// Refill from checkpointed entries
    pub fn restore(&self, records: Vec<TraceRecord<S>>) {
        for record in records {
            self.insert(record.fp, record.parent, record.action, record.state);
        }
    }
}

impl<S: Clone> Default for TraceStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIONS: &[&str] = &["Inc", "Dec"];

    fn chain() -> TraceStore<u32> {
        let store = TraceStore::new();
        store.insert(Fingerprint(10), None, None, 0);
        store.insert(Fingerprint(11), Some(Fingerprint(10)), Some(0), 1);
        store.insert(Fingerprint(12), Some(Fingerprint(11)), Some(0), 2);
        store.insert(Fingerprint(13), Some(Fingerprint(12)), Some(1), 1);
        store
    }

    #[test]
    fn test_first_insert_wins() {
        let store = chain();
        store.insert(Fingerprint(12), Some(Fingerprint(10)), Some(1), 99);
        assert_eq!(store.get(Fingerprint(12)).unwrap().state, 2);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_path_from_initial_state() {
        let store = chain();
        let path = store.path(None, Fingerprint(13), ACTIONS);
        let states: Vec<u32> = path.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![0, 1, 2, 1]);
        assert_eq!(path[0].action, None);
        assert_eq!(path[3].action, Some("Dec"));
    }

    #[test]
    fn test_path_between_states() {
        let store = chain();
        let path = store.path(Some(Fingerprint(11)), Fingerprint(13), ACTIONS);
        let states: Vec<u32> = path.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![1, 2, 1]);

        assert!(store.path(Some(Fingerprint(13)), Fingerprint(11), ACTIONS).is_empty());
        assert!(store.path(None, Fingerprint(99), ACTIONS).is_empty());
    }

    #[test]
    fn test_records_roundtrip_through_restore() {
        let store = chain();
        let copy = TraceStore::new();
        copy.restore(store.records());
        assert_eq!(copy.len(), 4);
        assert_eq!(copy.path(None, Fingerprint(13), ACTIONS).len(), 4);
    }
}
