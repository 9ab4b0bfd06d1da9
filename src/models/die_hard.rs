//! The water jug puzzle
//!
//! Two jugs of 5 and 3 gallons can be filled, emptied, or poured into each
//! other. The `NotSolved` invariant claims the big jug never holds exactly
//! 4 gallons; checking it finds the shortest solution.

use crate::error::EvalResult;
use crate::model::{EvalScope, Model, Successor};
use serde::{Deserialize, Serialize};

const BIG: u8 = 5;
const SMALL: u8 = 3;
const GOAL: u8 = 4;

const ACTIONS: &[&str] = &[
    "FillSmall",
    "FillBig",
    "EmptySmall",
    "EmptyBig",
    "SmallToBig",
    "BigToSmall",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jugs {
    pub big: u8,
    pub small: u8,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DieHard;

impl Model for DieHard {
    type State = Jugs;

    fn name(&self) -> &str {
        "DieHard"
    }

    fn actions(&self) -> &[&'static str] {
        ACTIONS
    }

    fn init_states(&self) -> EvalResult<Vec<Jugs>> {
        Ok(vec![Jugs { big: 0, small: 0 }])
    }

    fn next_states(&self, s: &Jugs, _scope: &EvalScope<'_>) -> EvalResult<Vec<Successor<Jugs>>> {
        let to_big = s.small.min(BIG - s.big);
        let to_small = s.big.min(SMALL - s.small);
        let next = [
            Jugs { small: SMALL, ..*s },
            Jugs { big: BIG, ..*s },
            Jugs { small: 0, ..*s },
            Jugs { big: 0, ..*s },
            Jugs {
                big: s.big + to_big,
                small: s.small - to_big,
            },
            Jugs {
                big: s.big - to_small,
                small: s.small + to_small,
            },
        ];
        Ok(next
            .into_iter()
            .enumerate()
            .map(|(action, state)| Successor::new(action, state))
            .collect())
    }

    fn check_invariants(&self, s: &Jugs) -> EvalResult<Option<String>> {
        Ok((s.big == GOAL).then(|| "NotSolved".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::worker::LocalValues;
    use crate::introspect::{ConfigSnapshot, Introspect, Statistics};

    struct Quiet(ConfigSnapshot);

    impl Introspect for Quiet {
        fn config_snapshot(&self) -> &ConfigSnapshot {
            &self.0
        }

        fn statistics(&self) -> Statistics {
            Statistics::default()
        }
    }

    fn successors(s: Jugs) -> Vec<Jugs> {
        let locals = LocalValues::default();
        let telemetry = Quiet(ConfigSnapshot {
            mode: "bfs".into(),
            deadlock: true,
            workers: 1,
            seed: 0,
            fingerprint: 0,
            install: String::new(),
        });
        let scope = EvalScope::new(0, &locals, &telemetry);
        DieHard
            .next_states(&s, &scope)
            .unwrap()
            .into_iter()
            .map(|succ| succ.state)
            .collect()
    }

    #[test]
    fn test_pouring_respects_capacity() {
        let next = successors(Jugs { big: 4, small: 3 });
        assert_eq!(next[4], Jugs { big: 5, small: 2 });
        assert_eq!(next[5], Jugs { big: 4, small: 3 });
    }

    #[test]
    fn test_every_action_enabled() {
        assert_eq!(successors(Jugs { big: 0, small: 0 }).len(), ACTIONS.len());
    }

    #[test]
    fn test_invariant() {
        assert_eq!(DieHard.check_invariants(&Jugs { big: 3, small: 1 }).unwrap(), None);
        assert_eq!(
            DieHard.check_invariants(&Jugs { big: 4, small: 0 }).unwrap().as_deref(),
            Some("NotSolved")
        );
    }
}
