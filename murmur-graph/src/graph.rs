// SPDX-License-Identifier: MIT OR Apache-2.0

//! The materialized trust graph.

use std::collections::HashMap;

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use murmur_core::{FeedRef, StoredRef};

/// Edge payload: follow edges weigh 1, block edges weigh infinity and are
/// never traversed when computing follow reachability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactEdge {
    pub weight: f64,
    pub is_block: bool,
}

impl ContactEdge {
    pub fn follow() -> Self {
        Self {
            weight: 1.0,
            is_block: false,
        }
    }

    pub fn block() -> Self {
        Self {
            weight: f64::INFINITY,
            is_block: true,
        }
    }
}

/// Weighted directed graph of authoritative contact states.
///
/// Invariants: no self-loops, at most one edge per ordered node pair, and
/// an edge exists iff the last contact message for that pair was a follow
/// or a block.
#[derive(Debug, Default)]
pub struct Graph {
    graph: DiGraph<FeedRef, ContactEdge>,
    lookup: HashMap<StoredRef, NodeIndex>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_edge(&mut self, from: FeedRef, to: FeedRef, edge: ContactEdge) {
        if from == to {
            return;
        }
        let from = self.intern(from);
        let to = self.intern(to);
        self.graph.update_edge(from, to, edge);
    }

    fn intern(&mut self, feed: FeedRef) -> NodeIndex {
        match self.lookup.get(&feed.stored()) {
            Some(index) => *index,
            None => {
                let index = self.graph.add_node(feed);
                self.lookup.insert(feed.stored(), index);
                index
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn edge(&self, from: &FeedRef, to: &FeedRef) -> Option<ContactEdge> {
        let from = *self.lookup.get(&from.stored())?;
        let to = *self.lookup.get(&to.stored())?;
        let edge = self.graph.find_edge(from, to)?;
        self.graph.edge_weight(edge).copied()
    }

    pub fn follows(&self, from: &FeedRef, to: &FeedRef) -> bool {
        self.edge(from, to).is_some_and(|edge| !edge.is_block)
    }

    pub fn blocks(&self, from: &FeedRef, to: &FeedRef) -> bool {
        self.edge(from, to).is_some_and(|edge| edge.is_block)
    }

    /// Shortest weighted path from `from` to `to`.
    ///
    /// Returns `None` when either node is unknown or no route exists at
    /// all; a returned distance of `+inf` means every route traverses a
    /// block.
    pub fn dist(&self, from: &FeedRef, to: &FeedRef) -> Option<(Vec<FeedRef>, f64)> {
        let from = *self.lookup.get(&from.stored())?;
        let to = *self.lookup.get(&to.stored())?;

        let (cost, path) = astar(
            &self.graph,
            from,
            |node| node == to,
            |edge| edge.weight().weight,
            |_| 0.0,
        )?;

        let path = path
            .into_iter()
            .map(|index| self.graph[index])
            .collect();
        Some((path, cost))
    }
}
