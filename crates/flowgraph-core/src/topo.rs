//! Deterministic topological sorting with cycle extraction.
//!
//! [`TopologicalSorter`] works on dense integer node ids. Edges are collected
//! first; the first call to [`next`](TopologicalSorter::next) freezes the edge
//! set and starts a Kahn traversal that always releases the lowest ready id.
//! When no node is ready but some remain, the graph is cyclic and the sorter
//! extracts one cycle by depth-first search over the remaining edges.
//!
//! ```rust
//! use flowgraph_core::topo::{TopologicalSorter, Visit};
//!
//! let mut sorter = TopologicalSorter::new(3);
//! sorter.add_edge(2, 0).unwrap();
//! sorter.add_edge(0, 1).unwrap();
//! assert_eq!(sorter.next(), Visit::Node(2));
//! assert_eq!(sorter.next(), Visit::Node(0));
//! assert_eq!(sorter.next(), Visit::Node(1));
//! assert_eq!(sorter.next(), Visit::Done);
//! ```

use core::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;

/// Errors from misuse of the sorter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SortError {
    /// `add_edge` was called after traversal started.
    #[error("cannot add edge {from} -> {to}: traversal already started")]
    TraversalStarted {
        /// Source node.
        from: usize,
        /// Destination node.
        to: usize,
    },

    /// An endpoint is not below the node count.
    #[error("edge {from} -> {to} references a node outside 0..{num_nodes}")]
    NodeOutOfRange {
        /// Source node.
        from: usize,
        /// Destination node.
        to: usize,
        /// Node count fixed at construction.
        num_nodes: usize,
    },
}

/// Result of advancing the traversal by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    /// The next node in topological order.
    Node(usize),
    /// Every node has been emitted.
    Done,
    /// No node is ready; the contained ids form a cycle in edge order, each
    /// node having an edge to the next and the last one back to the first.
    Cycle(Vec<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AcceptingEdges,
    Iterating,
    Finished,
}

/// Single-use topological sorter over nodes `0..num_nodes`.
#[derive(Debug, Clone)]
pub struct TopologicalSorter {
    num_nodes: usize,
    adjacency: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
    ready: BinaryHeap<Reverse<usize>>,
    remaining: usize,
    state: State,
}

impl TopologicalSorter {
    /// Creates a sorter for `num_nodes` nodes and no edges.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            adjacency: vec![Vec::new(); num_nodes],
            in_degree: Vec::new(),
            ready: BinaryHeap::new(),
            remaining: num_nodes,
            state: State::AcceptingEdges,
        }
    }

    /// Number of nodes fixed at construction.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Adds the dependency `from -> to` (`from` is emitted before `to`).
    ///
    /// Parallel edges are allowed and collapse into one.
    pub fn add_edge(&mut self, from: usize, to: usize) -> Result<(), SortError> {
        if self.state != State::AcceptingEdges {
            return Err(SortError::TraversalStarted { from, to });
        }
        if from >= self.num_nodes || to >= self.num_nodes {
            return Err(SortError::NodeOutOfRange {
                from,
                to,
                num_nodes: self.num_nodes,
            });
        }
        self.adjacency[from].push(to);
        Ok(())
    }

    fn start_traversal(&mut self) {
        self.in_degree = vec![0; self.num_nodes];
        for targets in &mut self.adjacency {
            targets.sort_unstable();
            targets.dedup();
            for &to in targets.iter() {
                self.in_degree[to] += 1;
            }
        }
        self.ready = (0..self.num_nodes)
            .filter(|&node| self.in_degree[node] == 0)
            .map(Reverse)
            .collect();
        self.state = State::Iterating;
    }

    /// Advances the traversal.
    ///
    /// Once `Done` or `Cycle` has been returned, every further call returns
    /// `Done`.
    pub fn next(&mut self) -> Visit {
        match self.state {
            State::AcceptingEdges => self.start_traversal(),
            State::Iterating => {}
            State::Finished => return Visit::Done,
        }

        if self.remaining == 0 {
            self.state = State::Finished;
            return Visit::Done;
        }

        let Some(Reverse(node)) = self.ready.pop() else {
            self.state = State::Finished;
            let cycle = self.find_cycle();
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "topo_sort: {} nodes unsorted, cycle {cycle:?}",
                self.remaining
            );
            return Visit::Cycle(cycle);
        };

        self.remaining -= 1;
        for to in core::mem::take(&mut self.adjacency[node]) {
            self.in_degree[to] -= 1;
            if self.in_degree[to] == 0 {
                self.ready.push(Reverse(to));
            }
        }
        Visit::Node(node)
    }

    /// Searches the edges of not-yet-emitted nodes for a cycle.
    ///
    /// Iterative DFS with an explicit `(node, next child)` stack. The first
    /// edge that reaches a node on the current stack closes the cycle; the
    /// stack is unwound down to that node.
    fn find_cycle(&self) -> Vec<usize> {
        let mut exhausted = vec![false; self.num_nodes];
        let mut on_stack = vec![false; self.num_nodes];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.num_nodes {
            if exhausted[start] {
                continue;
            }
            stack.push((start, 0));
            on_stack[start] = true;

            while let Some(frame) = stack.last_mut() {
                let (node, next_child) = *frame;
                let Some(&child) = self.adjacency[node].get(next_child) else {
                    exhausted[node] = true;
                    on_stack[node] = false;
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                if on_stack[child] {
                    let mut cycle = Vec::new();
                    while let Some((member, _)) = stack.pop() {
                        cycle.push(member);
                        if member == child {
                            break;
                        }
                    }
                    cycle.reverse();
                    return cycle;
                }
                if !exhausted[child] {
                    stack.push((child, 0));
                    on_stack[child] = true;
                }
            }
        }
        Vec::new()
    }

    /// Runs the traversal to completion.
    ///
    /// Returns the full order, or the cycle found when the graph is not a DAG.
    pub fn sort(mut self) -> Result<Vec<usize>, Vec<usize>> {
        let mut order = Vec::with_capacity(self.num_nodes);
        loop {
            match self.next() {
                Visit::Node(node) => order.push(node),
                Visit::Done => return Ok(order),
                Visit::Cycle(cycle) => return Err(cycle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGES: [(usize, usize); 6] = [(4, 0), (4, 1), (4, 2), (0, 3), (1, 3), (3, 2)];

    fn sorter_with(edges: &[(usize, usize)]) -> TopologicalSorter {
        let mut sorter = TopologicalSorter::new(5);
        for &(from, to) in edges {
            sorter.add_edge(from, to).unwrap();
        }
        sorter
    }

    #[test]
    fn lowest_ready_id_first() {
        assert_eq!(sorter_with(&EDGES).sort(), Ok(vec![4, 0, 1, 3, 2]));
    }

    #[test]
    fn duplicate_edges_do_not_change_order() {
        let mut edges = EDGES.to_vec();
        edges.extend_from_slice(&EDGES[1..4]);
        edges.push((4, 0));
        assert_eq!(sorter_with(&edges).sort(), Ok(vec![4, 0, 1, 3, 2]));
    }

    #[test]
    fn cycle_is_reported_in_edge_order() {
        let mut edges = EDGES.to_vec();
        edges.push((2, 1));
        let mut sorter = sorter_with(&edges);
        assert_eq!(sorter.next(), Visit::Node(4));
        assert_eq!(sorter.next(), Visit::Node(0));
        assert_eq!(sorter.next(), Visit::Cycle(vec![1, 3, 2]));
        assert_eq!(sorter.next(), Visit::Done);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut sorter = TopologicalSorter::new(2);
        sorter.add_edge(1, 1).unwrap();
        assert_eq!(sorter.sort(), Err(vec![1]));
    }

    #[test]
    fn edges_rejected_after_traversal_starts() {
        let mut sorter = TopologicalSorter::new(2);
        assert_eq!(sorter.next(), Visit::Node(0));
        assert_eq!(
            sorter.add_edge(0, 1),
            Err(SortError::TraversalStarted { from: 0, to: 1 })
        );
    }

    #[test]
    fn out_of_range_edge() {
        let mut sorter = TopologicalSorter::new(2);
        assert!(matches!(
            sorter.add_edge(0, 2),
            Err(SortError::NodeOutOfRange { num_nodes: 2, .. })
        ));
    }

    #[test]
    fn empty_graph_is_done_immediately() {
        let mut sorter = TopologicalSorter::new(0);
        assert_eq!(sorter.next(), Visit::Done);
        assert_eq!(sorter.next(), Visit::Done);
    }
}
