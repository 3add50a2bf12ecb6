//! Reference graph over symbol identifiers and bounded neighborhood traversal.
//!
//! Edges are directed (caller → callee, user → used type) but neighborhoods
//! are computed over both directions: a symbol's component includes what it
//! depends on and what depends on it.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use faultline_core::EdgeKind;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<String, EdgeKind>,
    index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: returns the existing index when the symbol is present.
    pub fn add_symbol(&mut self, symbol: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(symbol) {
            return idx;
        }
        let idx = self.graph.add_node(symbol.to_owned());
        self.index.insert(symbol.to_owned(), idx);
        idx
    }

    /// Adds a reference edge; both endpoints are created if absent. Parallel
    /// edges of the same kind collapse into one.
    pub fn add_reference(&mut self, source: &str, target: &str, kind: EdgeKind) {
        let source_idx = self.add_symbol(source);
        let target_idx = self.add_symbol(target);
        let exists = self
            .graph
            .edges_connecting(source_idx, target_idx)
            .any(|edge| *edge.weight() == kind);
        if !exists {
            self.graph.add_edge(source_idx, target_idx, kind);
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    pub fn symbol_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn reference_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn references_from(&self, symbol: &str) -> Vec<(&str, EdgeKind)> {
        self.directed_neighbors(symbol, Direction::Outgoing)
    }

    pub fn references_to(&self, symbol: &str) -> Vec<(&str, EdgeKind)> {
        self.directed_neighbors(symbol, Direction::Incoming)
    }

    /// Folds `other` into this graph; used to combine the before and after
    /// snapshots of a change, or several files of one commit.
    pub fn merge(&mut self, other: &ReferenceGraph) {
        for symbol in other.graph.node_weights() {
            self.add_symbol(symbol);
        }
        for edge in other.graph.edge_references() {
            let (Some(source), Some(target)) = (
                other.graph.node_weight(edge.source()),
                other.graph.node_weight(edge.target()),
            ) else {
                continue;
            };
            self.add_reference(source, target, *edge.weight());
        }
    }

    /// Shortest undirected hop count from the nearest root for every symbol
    /// within `max_depth`. Roots are always present at depth 0, even when the
    /// graph does not know them.
    pub fn hop_distances<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a str>,
        max_depth: usize,
    ) -> BTreeMap<String, usize> {
        let mut depth_by_symbol = BTreeMap::<String, usize>::new();
        let mut queue = VecDeque::<(NodeIndex, usize)>::new();

        for root in roots {
            if depth_by_symbol.contains_key(root) {
                continue;
            }
            depth_by_symbol.insert(root.to_owned(), 0);
            if let Some(&idx) = self.index.get(root) {
                queue.push_back((idx, 0));
            }
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for neighbor in self.graph.neighbors_undirected(current) {
                let Some(name) = self.graph.node_weight(neighbor) else {
                    continue;
                };
                if depth_by_symbol.contains_key(name.as_str()) {
                    continue;
                }
                let next_depth = depth + 1;
                depth_by_symbol.insert(name.clone(), next_depth);
                queue.push_back((neighbor, next_depth));
            }
        }

        depth_by_symbol
    }

    /// Every symbol within `k` hops of any root, in either edge direction.
    pub fn k_hop_neighborhood<'a>(
        &self,
        roots: impl IntoIterator<Item = &'a str>,
        k: usize,
    ) -> BTreeSet<String> {
        self.hop_distances(roots, k).into_keys().collect()
    }

    fn directed_neighbors(&self, symbol: &str, direction: Direction) -> Vec<(&str, EdgeKind)> {
        let Some(&idx) = self.index.get(symbol) else {
            return Vec::new();
        };
        let mut neighbors = self
            .graph
            .edges_directed(idx, direction)
            .filter_map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                self.graph
                    .node_weight(other)
                    .map(|name| (name.as_str(), *edge.weight()))
            })
            .collect::<Vec<_>>();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }
}
