//! A directed graph keyed by [`NodeId`], with node and edge payloads.
//!
//! Adjacency is kept both ways in `IndexMap`s, so lookups are O(1) and all
//! iteration follows insertion order. The stable order is load-bearing:
//! dispatch tie-breaking and every graph transformation are deterministic
//! because this container is.

use indexmap::{IndexMap, IndexSet};

use crate::node::NodeId;

/// A directed graph with node payloads `N` and edge payloads `E`.
///
/// Parallel edges are not supported (the dispatcher never needs them);
/// re-adding an edge replaces its payload.
#[derive(Clone, Debug)]
pub struct DiGraph<N, E> {
    nodes: IndexMap<NodeId, N>,
    succ: IndexMap<NodeId, IndexMap<NodeId, E>>,
    pred: IndexMap<NodeId, IndexSet<NodeId>>,
}

impl<N, E> Default for DiGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DiGraph<N, E> {
    /// Creates an empty graph.
    pub fn new() -> Self {
        DiGraph {
            nodes: IndexMap::new(),
            succ: IndexMap::new(),
            pred: IndexMap::new(),
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.succ.values().map(IndexMap::len).sum()
    }

    /// Returns `true` if the node exists.
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The payload of a node.
    pub fn node(&self, id: &NodeId) -> Option<&N> {
        self.nodes.get(id)
    }

    /// Mutable payload of a node.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut N> {
        self.nodes.get_mut(id)
    }

    /// Adds a node, replacing and returning any previous payload.
    pub fn add_node(&mut self, id: NodeId, weight: N) -> Option<N> {
        self.succ.entry(id.clone()).or_default();
        self.pred.entry(id.clone()).or_default();
        self.nodes.insert(id, weight)
    }

    /// Removes a node and all its incident edges.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<N> {
        let weight = self.nodes.shift_remove(id)?;
        if let Some(out) = self.succ.shift_remove(id) {
            for w in out.keys() {
                if let Some(p) = self.pred.get_mut(w) {
                    p.shift_remove(id);
                }
            }
        }
        if let Some(inc) = self.pred.shift_remove(id) {
            for u in &inc {
                if let Some(s) = self.succ.get_mut(u) {
                    s.shift_remove(id);
                }
            }
        }
        Some(weight)
    }

    /// Adds an edge `u -> v`, replacing and returning any previous payload.
    ///
    /// Both endpoints are expected to exist already; the builders and the
    /// engine guarantee this.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId, edge: E) -> Option<E> {
        debug_assert!(self.nodes.contains_key(&u) && self.nodes.contains_key(&v));
        self.pred.entry(v.clone()).or_default().insert(u.clone());
        self.succ.entry(u).or_default().insert(v, edge)
    }

    /// Removes the edge `u -> v`, returning its payload.
    pub fn remove_edge(&mut self, u: &NodeId, v: &NodeId) -> Option<E> {
        let edge = self.succ.get_mut(u)?.shift_remove(v)?;
        if let Some(p) = self.pred.get_mut(v) {
            p.shift_remove(u);
        }
        Some(edge)
    }

    /// Returns `true` if the edge `u -> v` exists.
    pub fn contains_edge(&self, u: &NodeId, v: &NodeId) -> bool {
        self.succ.get(u).map_or(false, |s| s.contains_key(v))
    }

    /// The payload of the edge `u -> v`.
    pub fn edge(&self, u: &NodeId, v: &NodeId) -> Option<&E> {
        self.succ.get(u)?.get(v)
    }

    /// Iterates node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Iterates `(id, payload)` pairs in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &N)> {
        self.nodes.iter()
    }

    /// Iterates every edge as `(source, target, payload)`.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &E)> {
        self.succ
            .iter()
            .flat_map(|(u, out)| out.iter().map(move |(v, e)| (u, v, e)))
    }

    /// Iterates the successors of `u`.
    pub fn successors<'a>(&'a self, u: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.succ.get(u).into_iter().flat_map(IndexMap::keys)
    }

    /// Iterates the predecessors of `v`.
    pub fn predecessors<'a>(&'a self, v: &NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.pred.get(v).into_iter().flatten()
    }

    /// Iterates the outgoing edges of `u` as `(target, payload)`.
    pub fn edges_from<'a>(&'a self, u: &NodeId) -> impl Iterator<Item = (&'a NodeId, &'a E)> + 'a {
        self.succ.get(u).into_iter().flat_map(IndexMap::iter)
    }

    /// Iterates the incoming edges of `v` as `(source, payload)`.
    pub fn in_edges<'a>(&'a self, v: &'a NodeId) -> impl Iterator<Item = (&'a NodeId, &'a E)> + 'a {
        self.pred
            .get(v)
            .into_iter()
            .flatten()
            .filter_map(move |u| self.edge(u, v).map(|e| (u, e)))
    }

    /// Number of incoming edges of `v`.
    pub fn in_degree(&self, v: &NodeId) -> usize {
        self.pred.get(v).map_or(0, IndexSet::len)
    }

    /// Number of outgoing edges of `u`.
    pub fn out_degree(&self, u: &NodeId) -> usize {
        self.succ.get(u).map_or(0, IndexMap::len)
    }

    /// Ids of nodes with no incident edges.
    pub fn isolates(&self) -> Vec<NodeId> {
        self.nodes
            .keys()
            .filter(|id| self.in_degree(id) == 0 && self.out_degree(id) == 0)
            .cloned()
            .collect()
    }
}

impl<N: Clone, E: Clone> DiGraph<N, E> {
    /// The subgraph induced by `keys`: the named nodes that exist, and
    /// every edge whose endpoints are both kept.
    pub fn subgraph(&self, keys: &IndexSet<NodeId>) -> Self {
        let mut sub = DiGraph::new();
        for (id, weight) in &self.nodes {
            if keys.contains(id) {
                sub.add_node(id.clone(), weight.clone());
            }
        }
        for (u, v, e) in self.edges() {
            if keys.contains(u) && keys.contains(v) {
                sub.add_edge(u.clone(), v.clone(), e.clone());
            }
        }
        sub
    }
}
