//! The traversal: a Dijkstra variant over the bipartite data/function
//! graph with readiness gates, wildcards, cutoff, and per-node estimation.

use std::collections::BinaryHeap;

use error_stack::{Report, Result};
use fxhash::FxBuildHasher;
use hashbrown::HashMap;
use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use super::{fringe::MinScored, Solution, WfNode, Workflow};
use crate::{
    dispatcher::Dispatcher,
    error::{CallError, DispatchError},
    node::{Callable, DataAttr, FunctionAttr, Node, NodeId},
    value::Value,
};

type FxHashMap<K, V> = HashMap<K, V, FxBuildHasher>;

/// Length of an edge: edge weight (unit by default) plus the weight of
/// the destination node.
fn edge_length<V>(edge: Option<&Option<f64>>, dst: &Node<V>) -> f64 {
    edge.copied().flatten().unwrap_or(1.0) + dst.weight()
}

/// The wait-in override map active during a run: the declared aggregating
/// data nodes and every output of a domain-guarded function are forced to
/// wait for all their predecessors, so a computed estimation is never
/// outrun by a seeded default.
fn base_wait_overrides<V>(dsp: &Dispatcher<V>) -> IndexMap<NodeId, bool> {
    let mut wait_in = IndexMap::new();
    for (id, node) in dsp.graph().nodes() {
        match node {
            Node::Function(attr) if attr.input_domain.is_some() => {
                for out in &attr.outputs {
                    wait_in.insert(out.clone(), true);
                }
            }
            Node::Data(attr) if attr.wait_inputs || attr.function.is_some() => {
                wait_in.insert(id.clone(), true);
            }
            _ => {}
        }
    }
    wait_in
}

/// Evaluates the cheapest workflow of `dsp` from the given initial
/// values. `overrides` adjusts the wait-in gate on top of the base map
/// (the shrink fixed point forces its current inputs to `false`).
pub(crate) fn run<V: Clone + 'static>(
    dsp: &Dispatcher<V>,
    initial: IndexMap<NodeId, Value<V>>,
    outputs: Option<&[NodeId]>,
    cutoff: Option<f64>,
    wildcards: IndexSet<NodeId>,
    overrides: IndexMap<NodeId, bool>,
    no_call: bool,
) -> Result<Solution<V>, DispatchError> {
    let mut wait_in = base_wait_overrides(dsp);
    wait_in.extend(overrides);

    let targets = match outputs {
        Some(out) if !out.is_empty() => Some(out.iter().cloned().collect::<IndexSet<_>>()),
        _ => None,
    };

    let mut state = Run {
        dsp,
        no_call,
        cutoff,
        targets,
        wildcards,
        wait_in,
        workflow: Workflow::new(),
        data_output: IndexMap::new(),
        dist: IndexMap::new(),
        seen: FxHashMap::default(),
        visited: IndexSet::new(),
        fringe: BinaryHeap::new(),
    };

    state.seed(&initial);
    state.traverse()?;
    state.sweep_unused_functions();

    Ok(Solution {
        workflow: state.workflow,
        data_output: state.data_output,
        dist: state.dist,
        visited: state.visited,
    })
}

struct Run<'a, V> {
    dsp: &'a Dispatcher<V>,
    no_call: bool,
    cutoff: Option<f64>,
    targets: Option<IndexSet<NodeId>>,
    wildcards: IndexSet<NodeId>,
    wait_in: IndexMap<NodeId, bool>,
    workflow: Workflow<V>,
    data_output: IndexMap<NodeId, Value<V>>,
    dist: IndexMap<NodeId, f64>,
    seen: FxHashMap<NodeId, f64>,
    visited: IndexSet<NodeId>,
    fringe: BinaryHeap<MinScored>,
}

impl<'a, V: Clone + 'static> Run<'a, V> {
    /// Seeds the fringe and the workflow from the initial values.
    fn seed(&mut self, initial: &IndexMap<NodeId, Value<V>>) {
        self.visited.insert(NodeId::Start);
        self.dist.insert(NodeId::Start, -1.0);
        self.seen.insert(NodeId::Start, -1.0);
        self.workflow.add_node(NodeId::Start, WfNode::Start);

        let dsp = self.dsp;
        for (id, value) in initial {
            let Some(node) = dsp.graph().node(id) else {
                continue;
            };
            let edge_value = self.edge_value(value);

            if *id == NodeId::Start {
                // Functions with no declared inputs hang off the virtual
                // start; feed them directly.
                let succ: Vec<(NodeId, f64)> = dsp
                    .graph()
                    .edges_from(id)
                    .map(|(w, e)| {
                        let d = edge_length(Some(e), dsp.graph().node(w).unwrap_or(node));
                        (w.clone(), d)
                    })
                    .collect();
                for (w, d) in succ {
                    self.wf_add_edge(NodeId::Start, w.clone(), edge_value.clone());
                    self.relax_seed(w, d, true);
                }
                continue;
            }

            self.wf_add_edge(NodeId::Start, id.clone(), edge_value.clone());

            if self.wildcards.contains(id) {
                // A wildcard input is consumed by its successors without
                // being recorded; the node itself settles only when some
                // function re-estimates it.
                self.visited.insert(id.clone());
                let succ: Vec<(NodeId, f64)> = dsp
                    .graph()
                    .edges_from(id)
                    .map(|(w, e)| {
                        let d = edge_length(Some(e), dsp.graph().node(w).unwrap_or(node));
                        (w.clone(), d)
                    })
                    .collect();
                for (w, d) in succ {
                    self.wf_add_edge(id.clone(), w.clone(), edge_value.clone());
                    self.relax_seed(w, d, true);
                }
                continue;
            }

            let wait = node.wait_inputs();
            if !self.wait_blocked(wait, id) {
                self.seen.insert(id.clone(), 0.0);
                self.fringe.push(MinScored {
                    dist: 0.0,
                    wait,
                    node: id.clone(),
                });
            }
        }
    }

    /// Pushes a successor reached straight from a seed value.
    fn relax_seed(&mut self, node: NodeId, dist: f64, wait: bool) {
        if let Some(c) = self.cutoff {
            if dist > c {
                return;
            }
        }
        if self.wait_blocked(wait, &node) {
            return;
        }
        if self.seen.get(&node).map_or(true, |&s| dist < s) {
            self.seen.insert(node.clone(), dist);
            self.fringe.push(MinScored { dist, wait, node });
        }
    }

    /// The main loop: settle the closest fringe node, estimate it, and
    /// relax its successors.
    fn traverse(&mut self) -> Result<(), DispatchError> {
        let dsp = self.dsp;
        while let Some(MinScored { dist: d, node: v, .. }) = self.fringe.pop() {
            if self.dist.contains_key(&v) {
                // A stale duplicate entry; the node settled at a shorter
                // distance already.
                continue;
            }
            self.dist.insert(v.clone(), d);
            self.visited.insert(v.clone());

            if !self.set_node_output(&v)? {
                continue;
            }

            if self.check_targets(&v) {
                break;
            }

            let relaxations: Vec<(NodeId, f64, bool)> = dsp
                .graph()
                .edges_from(&v)
                .filter_map(|(w, e)| {
                    let node = dsp.graph().node(w)?;
                    Some((w.clone(), d + edge_length(Some(e), node), node.wait_inputs()))
                })
                .collect();

            for (w, vw, wait) in relaxations {
                if let Some(c) = self.cutoff {
                    if vw > c {
                        continue;
                    }
                }
                if self.wait_blocked(wait, &w) {
                    continue;
                }
                if let Some(&dw) = self.dist.get(&w) {
                    if vw < dw {
                        return Err(Report::new(DispatchError::ContradictoryPaths));
                    }
                } else if self.seen.get(&w).map_or(true, |&s| vw < s) {
                    self.seen.insert(w.clone(), vw);
                    self.fringe.push(MinScored {
                        dist: vw,
                        wait,
                        node: w,
                    });
                }
            }
        }
        Ok(())
    }

    /// True when the node's (possibly overridden) wait flag holds it
    /// back because some predecessor has not settled yet.
    fn wait_blocked(&self, declared: bool, node: &NodeId) -> bool {
        let wait = self.wait_in.get(node).copied().unwrap_or(declared);
        wait
            && self
                .dsp
                .graph()
                .predecessors(node)
                .any(|p| !self.visited.contains(p))
    }

    /// Removes a settled node from the target set; true once the set is
    /// exhausted.
    fn check_targets(&mut self, v: &NodeId) -> bool {
        match &mut self.targets {
            Some(t) => {
                t.shift_remove(v);
                t.is_empty()
            }
            None => false,
        }
    }

    fn edge_value(&self, value: &Value<V>) -> Option<Value<V>> {
        if self.no_call {
            None
        } else {
            Some(value.clone())
        }
    }

    fn wf_add_edge(&mut self, u: NodeId, v: NodeId, value: Option<Value<V>>) {
        if !self.workflow.contains_node(&u) {
            self.workflow.add_node(u.clone(), WfNode::Plain);
        }
        if !self.workflow.contains_node(&v) {
            self.workflow.add_node(v.clone(), WfNode::Plain);
        }
        self.workflow.add_edge(u, v, value);
    }

    /// Estimates a settled node; false when the node could not produce
    /// an output (soft failure or rejected domain).
    fn set_node_output(&mut self, v: &NodeId) -> Result<bool, DispatchError> {
        match self.dsp.graph().node(v) {
            Some(Node::Data(_)) if *v == NodeId::Sink => Ok(true),
            Some(Node::Data(attr)) => {
                let attr = attr.clone();
                self.set_data_node_output(v, &attr)
            }
            Some(Node::Function(attr)) => {
                let attr = attr.clone();
                self.set_function_node_output(v, &attr)
            }
            None => Ok(false),
        }
    }

    /// Reports a soft failure, or promotes it to a hard error when the
    /// dispatcher raises.
    fn soft(
        &self,
        v: &NodeId,
        kind: &str,
        err: Report<CallError>,
    ) -> Result<bool, DispatchError> {
        if self.dsp.raises_flag() {
            Err(err.change_context(DispatchError::NodeError(v.clone())))
        } else {
            warn!("estimation error at {kind} node ({v}): {err:?}");
            Ok(false)
        }
    }

    fn set_data_node_output(
        &mut self,
        v: &NodeId,
        attr: &DataAttr<V>,
    ) -> Result<bool, DispatchError> {
        let mut est: Vec<(NodeId, Option<Value<V>>)> = self
            .workflow
            .in_edges(v)
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect();

        let wait = self.wait_in.get(v).copied().unwrap_or(attr.wait_inputs);
        if est.len() > 1 && !wait {
            // Keep the estimation along the shortest edge; the losing
            // workflow edges are dropped. The start edge never competes:
            // a seeded default only wins when nothing else reported.
            if let Some(winner) = self.shortest_estimation(v, attr, &est) {
                let losers: Vec<NodeId> = est
                    .iter()
                    .filter(|(k, _)| *k != NodeId::Start && *k != winner)
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in &losers {
                    self.workflow.remove_edge(k, v);
                }
                est.retain(|(k, _)| *k == winner);
            }
        }

        if self.no_call {
            self.data_output.insert(v.clone(), Value::None);
            self.propagate(v, None);
            return Ok(true);
        }

        let value = if let Some(function) = &attr.function {
            let kwargs: IndexMap<NodeId, Value<V>> = est
                .iter()
                .map(|(k, e)| (k.clone(), e.clone().flatten_value()))
                .collect();
            match function(&kwargs) {
                Ok(value) => value,
                Err(err) => return self.soft(v, "data", err),
            }
        } else if est.len() > 1 {
            // The wait gate held the node for all its predecessors but no
            // aggregator merges them; the computed estimation along the
            // shortest edge beats the seeded default.
            match self.shortest_estimation(v, attr, &est) {
                Some(winner) => est
                    .iter()
                    .find(|(k, _)| *k == winner)
                    .map(|(_, e)| e.clone().flatten_value())
                    .unwrap_or(Value::None),
                None => est[0].1.clone().flatten_value(),
            }
        } else {
            match est.first() {
                Some((_, e)) => e.clone().flatten_value(),
                None => {
                    return self.soft(
                        v,
                        "data",
                        Report::new(CallError).attach_printable("no estimations available"),
                    )
                }
            }
        };

        if let (Some(callback), Value::Val(x)) = (&attr.callback, &value) {
            if let Err(err) = callback(x) {
                // Callback failures never abort the dispatch.
                warn!("callback error at data node ({v}): {err:?}");
            }
        }

        if !value.is_none() {
            self.data_output.insert(v.clone(), value.clone());
        }
        self.propagate(v, Some(value));
        Ok(true)
    }

    /// The predecessor whose estimation travelled the shortest path,
    /// ignoring the virtual start; ties break on the smaller id.
    fn shortest_estimation(
        &self,
        v: &NodeId,
        attr: &DataAttr<V>,
        est: &[(NodeId, Option<Value<V>>)],
    ) -> Option<NodeId> {
        let node = Node::Data(attr.clone());
        let mut best: Option<(f64, NodeId)> = None;
        for (k, _) in est {
            if *k == NodeId::Start {
                continue;
            }
            let d = self.dist.get(k).copied().unwrap_or(0.0)
                + edge_length(self.dsp.graph().edge(k, v), &node);
            let better = match &best {
                None => true,
                Some((bd, bk)) => match d.total_cmp(bd) {
                    core::cmp::Ordering::Less => true,
                    core::cmp::Ordering::Greater => false,
                    core::cmp::Ordering::Equal => k < bk,
                },
            };
            if better {
                best = Some((d, k.clone()));
            }
        }
        best.map(|(_, k)| k)
    }

    /// Propagates an estimated value along the outgoing edges to the
    /// not-yet-visited successor functions.
    fn propagate(&mut self, v: &NodeId, value: Option<Value<V>>) {
        let succ: Vec<NodeId> = self
            .dsp
            .graph()
            .successors(v)
            .filter(|u| !self.visited.contains(*u))
            .cloned()
            .collect();
        for u in succ {
            self.wf_add_edge(v.clone(), u, value.clone());
        }
    }

    fn set_function_node_output(
        &mut self,
        v: &NodeId,
        attr: &FunctionAttr<V>,
    ) -> Result<bool, DispatchError> {
        let output_nodes: Vec<NodeId> = attr
            .outputs
            .iter()
            .filter(|u| !self.dist.contains_key(*u) && self.dsp.graph().contains_node(u))
            .cloned()
            .collect();

        if output_nodes.is_empty() {
            // Everything this function produces is already settled.
            self.workflow.remove_node(v);
            return Ok(false);
        }

        if self.no_call {
            for u in &output_nodes {
                self.wf_add_edge(v.clone(), u.clone(), None);
            }
            return Ok(true);
        }

        let mut args: Vec<V> = Vec::with_capacity(attr.inputs.len());
        for i in &attr.inputs {
            match self.workflow.edge(i, v) {
                Some(Some(Value::Val(x))) => args.push(x.clone()),
                Some(_) => {}
                None => {
                    let out = self.soft(
                        v,
                        "function",
                        Report::new(CallError)
                            .attach_printable(format!("missing estimation of input ({i})")),
                    );
                    self.reconsider_defaults(v);
                    return out;
                }
            }
        }

        if let Some(domain) = &attr.input_domain {
            if !domain(&args) {
                // Out of domain: not an error, the engine just tries
                // alternative paths into the successors.
                self.reconsider_defaults(v);
                return Ok(false);
            }
        }

        let res = match &attr.callable {
            Callable::Function(f) => f(&args),
            Callable::Sub(call) => match call(&args) {
                Ok((res, trace)) => {
                    if let Some(payload) = self.workflow.node_mut(v) {
                        *payload = WfNode::Sub(trace);
                    }
                    Ok(res)
                }
                Err(err) => Err(err),
            },
        };
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                let out = self.soft(v, "function", err);
                self.reconsider_defaults(v);
                return out;
            }
        };

        if res.len() != attr.outputs.len() {
            let out = self.soft(
                v,
                "function",
                Report::new(CallError).attach_printable(format!(
                    "expected {} outputs, the function returned {}",
                    attr.outputs.len(),
                    res.len()
                )),
            );
            self.reconsider_defaults(v);
            return out;
        }

        for (k, value) in attr.outputs.iter().zip(res) {
            if output_nodes.contains(k) {
                self.wf_add_edge(v.clone(), k.clone(), Some(Value::Val(value)));
            }
        }
        Ok(true)
    }

    /// When a function fails, its gated outputs may still hold a seeded
    /// default that nothing will relax any more; queue those so the
    /// default can settle. Wildcard nodes are excluded: their seed value
    /// must never become an output.
    fn reconsider_defaults(&mut self, v: &NodeId) {
        let candidates: Vec<(NodeId, bool)> = self
            .dsp
            .graph()
            .successors(v)
            .filter_map(|w| {
                let node = self.dsp.graph().node(w)?;
                Some((w.clone(), node.wait_inputs()))
            })
            .collect();
        for (w, declared) in candidates {
            if self.wildcards.contains(&w)
                || self.dist.contains_key(&w)
                || self.seen.contains_key(&w)
            {
                continue;
            }
            if self.workflow.in_degree(&w) == 0 {
                continue;
            }
            if self.wait_blocked(declared, &w) {
                continue;
            }
            // The only estimation left is the seed edge, so the node
            // settles at the seed distance.
            self.seen.insert(w.clone(), 0.0);
            self.fringe.push(MinScored {
                dist: 0.0,
                wait: declared,
                node: w,
            });
        }
    }

    /// Drops workflow function nodes that were touched but never
    /// executed; data nodes stay (the shrink fixed point reads them).
    fn sweep_unused_functions(&mut self) {
        let stale: Vec<NodeId> = self
            .workflow
            .node_ids()
            .filter(|n| {
                !self.visited.contains(*n)
                    && self.dsp.graph().node(n).map_or(false, Node::is_function)
            })
            .cloned()
            .collect();
        for n in &stale {
            self.workflow.remove_node(n);
        }
    }
}

/// Collapses a missing edge payload (no-call residue) into the valueless
/// sentinel.
trait FlattenValue<V> {
    fn flatten_value(self) -> Value<V>;
}

impl<V> FlattenValue<V> for Option<Value<V>> {
    fn flatten_value(self) -> Value<V> {
        self.unwrap_or(Value::None)
    }
}
