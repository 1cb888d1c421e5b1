//! Wait-For Graph
//!
//! Tracks which module factories are currently suspended waiting on which
//! modules. An edge `A -> B` exists while A's factory awaits the resolution
//! of B.
//!
//! # Algorithm
//!
//! Before a factory starts waiting on a module, the edge is checked:
//!
//! 1. If the target can already reach the requester through existing edges
//!    (or is the requester), the new edge would close a cycle. The cycle is
//!    reported instead of added, so nothing ever waits on itself.
//! 2. Otherwise the edge is added and stays until the wait completes.
//!
//! Edges carry a multiplicity because one factory may wait on the same
//! module from several concurrent branches.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    /// Requester -> (target -> number of active waits).
    edges: HashMap<String, IndexMap<String, usize>>,
}

impl WaitGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record that `from` is waiting on `to`.
    ///
    /// Returns the cycle `[from, to, .., from]` if the edge would close one.
    pub(crate) fn add_edge(&mut self, from: &str, to: &str) -> Result<(), Vec<String>> {
        if let Some(path) = self.path(to, from) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(from.to_string());
            cycle.extend(path);
            return Err(cycle);
        }

        *self
            .edges
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_insert(0) += 1;
        tracing::trace!(from, to, "wait edge added");
        Ok(())
    }

    pub(crate) fn remove_edge(&mut self, from: &str, to: &str) {
        let Some(targets) = self.edges.get_mut(from) else {
            return;
        };
        if let Some(count) = targets.get_mut(to) {
            *count -= 1;
            if *count == 0 {
                targets.shift_remove(to);
            }
        }
        if targets.is_empty() {
            self.edges.remove(from);
        }
        tracing::trace!(from, to, "wait edge removed");
    }

    /// Shortest path `start -> .. -> goal` over current edges, inclusive.
    fn path(&self, start: &str, goal: &str) -> Option<Vec<String>> {
        if start == goal {
            return Some(vec![start.to_string()]);
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        // BFS from the start node
        while let Some(node) = queue.pop_front() {
            let Some(targets) = self.edges.get(node) else {
                continue;
            };
            for next in targets.keys() {
                let next = next.as_str();
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next, node);
                if next == goal {
                    let mut path = vec![goal.to_string()];
                    let mut current = goal;
                    while let Some(&parent) = parents.get(current) {
                        path.push(parent.to_string());
                        current = parent;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Modules `from` is currently waiting on.
    pub(crate) fn waiting_on(&self, from: &str) -> Vec<String> {
        self.edges
            .get(from)
            .map(|targets| targets.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn edge_count(&self) -> usize {
        self.edges.values().map(IndexMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_wait_is_a_cycle() {
        let mut graph = WaitGraph::new();
        assert_eq!(graph.add_edge("a", "a"), Err(vec!["a".into(), "a".into()]));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn closing_edge_reports_the_cycle() {
        let mut graph = WaitGraph::new();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("b", "c").unwrap();

        let cycle = graph.add_edge("c", "a").unwrap_err();
        assert_eq!(cycle, vec!["c", "a", "b", "c"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = WaitGraph::new();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "c").unwrap();
        graph.add_edge("b", "d").unwrap();
        graph.add_edge("c", "d").unwrap();
        assert_eq!(graph.waiting_on("a"), vec!["b", "c"]);
    }

    #[test]
    fn edges_are_counted() {
        let mut graph = WaitGraph::new();
        graph.add_edge("a", "b").unwrap();
        graph.add_edge("a", "b").unwrap();

        // One removal leaves the second wait in place
        graph.remove_edge("a", "b");
        assert!(graph.add_edge("b", "a").is_err());

        graph.remove_edge("a", "b");
        assert!(graph.add_edge("b", "a").is_ok());
    }
}
