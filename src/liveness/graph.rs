//! Behavior graph and pending-cycle search
//!
//! Nodes are states keyed by fingerprint; each node remembers whether the
//! liveness goal is still pending there. A counterexample is a cycle made
//! only of pending nodes: a behavior can loop on it forever without ever
//! reaching the goal.
//!
//! The search is Tarjan's strongly-connected-components algorithm, run
//! iteratively over the subgraph induced by pending nodes.
//!
//! A graph can be exported to a [`GraphSnapshot`] and rebuilt from one, which
//! is how it survives a checkpoint.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

struct Node<S> {
    fp: Fingerprint,
    state: S,
    pending: bool,
    succs: Vec<usize>,
}

/// A pending cycle, identified by the edge that closes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessViolation<S> {
    /// Source of the cycle-closing edge
    pub pred: S,

    /// Target of the cycle-closing edge
    pub state: S,

    /// Fingerprints of every state in the cycle's component
    pub cycle: Vec<Fingerprint>,
}

/// A node as stored in a checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode<S> {
    pub fp: Fingerprint,
    pub state: S,
    pub pending: bool,
}

/// Serializable copy of a behavior graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot<S> {
    pub nodes: Vec<SavedNode<S>>,
    pub edges: Vec<(Fingerprint, Fingerprint)>,
}

/// Graph of explored states and transitions
pub struct BehaviorGraph<S> {
    nodes: Vec<Node<S>>,
    index: HashMap<Fingerprint, usize>,
    edges: usize,
}

impl<S: Clone> BehaviorGraph<S> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: 0,
        }
    }

    /// Add a node; returns its index and whether it was new
    pub fn add_node(&mut self, fp: Fingerprint, state: &S, pending: bool) -> (usize, bool) {
        if let Some(&idx) = self.index.get(&fp) {
            return (idx, false);
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            fp,
            state: state.clone(),
            pending,
            succs: Vec::new(),
        });
        self.index.insert(fp, idx);
        (idx, true)
    }

    /// Add an edge between two existing nodes; returns false if either is unknown
    pub fn add_edge(&mut self, from: Fingerprint, to: Fingerprint) -> bool {
        match (self.index.get(&from), self.index.get(&to)) {
            (Some(&f), Some(&t)) => {
                if !self.nodes[f].succs.contains(&t) {
                    self.nodes[f].succs.push(t);
                    self.edges += 1;
                }
                true
            }
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// Copy every node and edge
    pub fn export(&self) -> GraphSnapshot<S> {
        let nodes = self
            .nodes
            .iter()
            .map(|node| SavedNode {
                fp: node.fp,
                state: node.state.clone(),
                pending: node.pending,
            })
            .collect();
        let edges = self
            .nodes
            .iter()
            .flat_map(|node| node.succs.iter().map(move |&t| (node.fp, self.nodes[t].fp)))
            .collect();
        GraphSnapshot { nodes, edges }
    }

    /// Merge a snapshot into this graph; returns the number of edges dropped
    /// because an endpoint was missing
    pub fn import(&mut self, snapshot: GraphSnapshot<S>) -> usize {
        for node in &snapshot.nodes {
            self.add_node(node.fp, &node.state, node.pending);
        }
        let mut dropped = 0;
        for (from, to) in snapshot.edges {
            if !self.add_edge(from, to) {
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of nodes per out-degree
    pub fn out_degree_histogram(&self) -> BTreeMap<usize, usize> {
        let mut histogram = BTreeMap::new();
        for node in &self.nodes {
            *histogram.entry(node.succs.len()).or_insert(0) += 1;
        }
        histogram
    }

    /// Find a cycle made only of pending nodes
    pub fn find_pending_cycle(&self) -> Option<LivenessViolation<S>> {
        let n = self.nodes.len();
        let mut index = vec![usize::MAX; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0usize;

        for root in 0..n {
            if index[root] != usize::MAX || !self.nodes[root].pending {
                continue;
            }

            // (node, position in its successor list)
            let mut call: Vec<(usize, usize)> = vec![(root, 0)];
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            while let Some(frame) = call.last_mut() {
                let v = frame.0;
                let succs = &self.nodes[v].succs;
                if frame.1 < succs.len() {
                    let w = succs[frame.1];
                    frame.1 += 1;
                    if !self.nodes[w].pending {
                        continue;
                    }
                    if index[w] == usize::MAX {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        call.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }

                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    if let Some(violation) = self.cycle_in(&component) {
                        return Some(violation);
                    }
                }
            }
        }
        None
    }

    /// The cycle-closing edge of a component, if it contains a cycle
    fn cycle_in(&self, component: &[usize]) -> Option<LivenessViolation<S>> {
        let edge = if component.len() == 1 {
            let v = component[0];
            self.nodes[v].succs.contains(&v).then_some((v, v))
        } else {
            let members: HashSet<usize> = component.iter().copied().collect();
            component.iter().find_map(|&u| {
                self.nodes[u]
                    .succs
                    .iter()
                    .find(|w| members.contains(w))
                    .map(|&w| (u, w))
            })
        }?;

        Some(LivenessViolation {
            pred: self.nodes[edge.0].state.clone(),
            state: self.nodes[edge.1].state.clone(),
            cycle: component.iter().map(|&i| self.nodes[i].fp).collect(),
        })
    }
}

impl<S: Clone> Default for BehaviorGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[(u64, bool)], edges: &[(u64, u64)]) -> BehaviorGraph<u64> {
        let mut g = BehaviorGraph::new();
        for &(id, pending) in nodes {
            g.add_node(Fingerprint(id), &id, pending);
        }
        for &(from, to) in edges {
            assert!(g.add_edge(Fingerprint(from), Fingerprint(to)));
        }
        g
    }

    #[test]
    fn test_acyclic_graph_has_no_violation() {
        let g = graph(&[(1, true), (2, true), (3, true)], &[(1, 2), (2, 3)]);
        assert!(g.find_pending_cycle().is_none());
    }

    #[test]
    fn test_pending_cycle_found() {
        let g = graph(
            &[(1, true), (2, true), (3, true), (4, false)],
            &[(1, 2), (2, 3), (3, 2), (3, 4)],
        );
        let violation = g.find_pending_cycle().unwrap();
        let mut cycle = violation.cycle.clone();
        cycle.sort();
        assert_eq!(cycle, vec![Fingerprint(2), Fingerprint(3)]);
        assert!([(2, 3), (3, 2)].contains(&(violation.pred, violation.state)));
    }

    #[test]
    fn test_cycle_through_goal_is_not_a_violation() {
        let g = graph(&[(1, true), (2, false)], &[(1, 2), (2, 1)]);
        assert!(g.find_pending_cycle().is_none());
    }

    #[test]
    fn test_self_loop() {
        let g = graph(&[(1, true), (2, true)], &[(1, 2), (2, 2)]);
        let violation = g.find_pending_cycle().unwrap();
        assert_eq!((violation.pred, violation.state), (2, 2));
    }

    #[test]
    fn test_duplicate_nodes_and_edges() {
        let mut g = graph(&[(1, true), (2, true)], &[(1, 2), (1, 2)]);
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.add_node(Fingerprint(1), &1, true), (0, false));
        assert!(!g.add_edge(Fingerprint(1), Fingerprint(9)));
    }

    #[test]
    fn test_export_import_keeps_pending_cycle() {
        let g = graph(
            &[(1, true), (2, true), (3, false)],
            &[(1, 2), (2, 1), (1, 3), (3, 3)],
        );
        let snapshot = g.export();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.edges.len(), 4);

        let mut restored = BehaviorGraph::new();
        assert_eq!(restored.import(snapshot), 0);
        assert_eq!(restored.node_count(), 3);
        assert_eq!(restored.edge_count(), 4);
        let mut cycle = restored.find_pending_cycle().unwrap().cycle;
        cycle.sort();
        assert_eq!(cycle, vec![Fingerprint(1), Fingerprint(2)]);

        // Edges arriving after the import attach to the restored nodes
        restored.add_node(Fingerprint(4), &4, false);
        assert!(restored.add_edge(Fingerprint(3), Fingerprint(4)));
    }

    #[test]
    fn test_import_drops_dangling_edges() {
        let mut g: BehaviorGraph<u64> = BehaviorGraph::new();
        let snapshot = GraphSnapshot {
            nodes: vec![SavedNode {
                fp: Fingerprint(1),
                state: 1,
                pending: true,
            }],
            edges: vec![(Fingerprint(1), Fingerprint(1)), (Fingerprint(1), Fingerprint(7))],
        };
        assert_eq!(g.import(snapshot), 1);
        assert_eq!(g.edge_count(), 1);
        assert!(g.find_pending_cycle().is_some());
    }

    #[test]
    fn test_out_degree_histogram() {
        let g = graph(&[(1, true), (2, true), (3, true)], &[(1, 2), (1, 3), (2, 3)]);
        let histogram = g.out_degree_histogram();
        assert_eq!(histogram.get(&0), Some(&1));
        assert_eq!(histogram.get(&1), Some(&1));
        assert_eq!(histogram.get(&2), Some(&1));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = 100_000u64;
        let nodes: Vec<_> = (0..n).map(|i| (i, true)).collect();
        let mut edges: Vec<_> = (0..n - 1).map(|i| (i, i + 1)).collect();
        edges.push((n - 1, 0));
        let g = graph(&nodes, &edges);
        assert_eq!(g.find_pending_cycle().unwrap().cycle.len(), n as usize);
    }
}
