//! The dispatcher model: a bipartite graph of data and function nodes,
//! its builders, and the graph transformations.

use std::collections::VecDeque;

use error_stack::{Report, Result};
use indexmap::{IndexMap, IndexSet};

use crate::{
    dispatch::{run::run, DispatchArgs, Solution},
    error::{BuildError, DispatchError},
    graph::DiGraph,
    node::{
        CallResult, Callable, Callback, DataAttr, DataFunction, FunctionAttr, InputDomain, Node,
        NodeFunction, NodeId, SubCall,
    },
    sub::SubDispatchFunction,
    value::Value,
};

/// Builder for a data node, consumed by [`Dispatcher::add_data`].
///
/// ```
/// use flowgraph::Data;
///
/// let node: Data<f64> = Data::new("velocity").default_value(0.0).wait_inputs(true);
/// ```
pub struct Data<V> {
    id: Option<NodeId>,
    default: Option<Value<V>>,
    wait_inputs: bool,
    wildcard: Option<bool>,
    function: Option<DataFunction<V>>,
    callback: Option<Callback<V>>,
    weight: Option<f64>,
    extra: IndexMap<String, String>,
}

impl<V> Data<V> {
    /// A data node with the given id.
    pub fn new(id: impl Into<NodeId>) -> Self {
        Data {
            id: Some(id.into()),
            default: None,
            wait_inputs: false,
            wildcard: None,
            function: None,
            callback: None,
            weight: None,
            extra: IndexMap::new(),
        }
    }

    /// A data node whose id is generated (`unknown<N>` with the smallest
    /// unused `N`).
    pub fn anonymous() -> Self {
        Data {
            id: None,
            default: None,
            wait_inputs: false,
            wildcard: None,
            function: None,
            callback: None,
            weight: None,
            extra: IndexMap::new(),
        }
    }

    /// Default value, used as input whenever the node is not fed
    /// explicitly. Re-adding the node without a default clears any
    /// previous one.
    pub fn default_value(mut self, value: V) -> Self {
        self.default = Some(Value::Val(value));
        self
    }

    /// Defer estimation until every predecessor has settled.
    pub fn wait_inputs(mut self, wait: bool) -> Self {
        self.wait_inputs = wait;
        self
    }

    /// Explicit wildcard opt-in / opt-out; nodes left unset are eligible.
    pub fn wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = Some(wildcard);
        self
    }

    /// Aggregator merging the predecessor estimations into one value.
    pub fn function<F>(mut self, function: F) -> Self
    where
        F: Fn(&IndexMap<NodeId, Value<V>>) -> CallResult<Value<V>> + Send + Sync + 'static,
    {
        self.function = Some(std::sync::Arc::new(function));
        self
    }

    /// Callback invoked right after the node is estimated.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&V) -> CallResult<()> + Send + Sync + 'static,
    {
        self.callback = Some(std::sync::Arc::new(callback));
        self
    }

    /// Node weight, added to the length of every incoming edge.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Attaches a user metadata entry; the engine never reads these.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Builder for a function node, consumed by [`Dispatcher::add_function`].
///
/// Without an explicit id, the node is named after the callable's type
/// path (`core::any::type_name`), with a `<N>` suffix on collision.
pub struct Func<V> {
    id: Option<String>,
    name_hint: String,
    callable: Callable<V>,
    inputs: Option<Vec<NodeId>>,
    outputs: Option<Vec<NodeId>>,
    input_domain: Option<InputDomain<V>>,
    weight: Option<f64>,
    weight_from: IndexMap<NodeId, f64>,
    weight_to: IndexMap<NodeId, f64>,
    extra: IndexMap<String, String>,
}

impl<V> Func<V> {
    /// A function node around a plain callable.
    pub fn new<F>(function: F) -> Self
    where
        F: Fn(&[V]) -> CallResult<Vec<V>> + Send + Sync + 'static,
    {
        Func {
            id: None,
            name_hint: core::any::type_name::<F>().to_owned(),
            callable: Callable::Function(std::sync::Arc::new(function)),
            inputs: None,
            outputs: None,
            input_domain: None,
            weight: None,
            weight_from: IndexMap::new(),
            weight_to: IndexMap::new(),
            extra: IndexMap::new(),
        }
    }

    /// A function node around an already-built callable.
    pub fn from_function(function: NodeFunction<V>) -> Self {
        Func {
            id: None,
            name_hint: "function".to_owned(),
            callable: Callable::Function(function),
            inputs: None,
            outputs: None,
            input_domain: None,
            weight: None,
            weight_from: IndexMap::new(),
            weight_to: IndexMap::new(),
            extra: IndexMap::new(),
        }
    }

    pub(crate) fn from_sub_call(name: String, call: SubCall<V>) -> Self {
        Func {
            id: None,
            name_hint: name,
            callable: Callable::Sub(call),
            inputs: None,
            outputs: None,
            input_domain: None,
            weight: None,
            weight_from: IndexMap::new(),
            weight_to: IndexMap::new(),
            extra: IndexMap::new(),
        }
    }

    /// Explicit node id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Ordered input data nodes; missing ones are created. Omitted
    /// inputs bind the function to the virtual start.
    pub fn inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.inputs = Some(inputs.into_iter().map(Into::into).collect());
        self
    }

    /// Ordered output data nodes; missing ones are created. Omitted
    /// outputs bind the function to the sink.
    pub fn outputs<I>(mut self, outputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<NodeId>,
    {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Admissibility predicate over the gathered arguments; rejection
    /// makes the engine look for alternative paths.
    pub fn input_domain<F>(mut self, domain: F) -> Self
    where
        F: Fn(&[V]) -> bool + Send + Sync + 'static,
    {
        self.input_domain = Some(std::sync::Arc::new(domain));
        self
    }

    /// Node weight, added to the length of every incoming edge.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Weight of the edge from an input data node to this function.
    pub fn weight_from(mut self, input: impl Into<NodeId>, weight: f64) -> Self {
        self.weight_from.insert(input.into(), weight);
        self
    }

    /// Weight of the edge from this function to an output data node.
    pub fn weight_to(mut self, output: impl Into<NodeId>, weight: f64) -> Self {
        self.weight_to.insert(output.into(), weight);
        self
    }

    /// Attaches a user metadata entry; the engine never reads these.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A directed bipartite graph of data and function nodes that evaluates
/// the cheapest sub-workflow connecting given inputs to requested
/// outputs.
///
/// The graph and the default values are immutable during a dispatch;
/// every call to [`dispatch`](Self::dispatch) owns its whole run state
/// and returns it as a [`Solution`], so a `&Dispatcher` can be shared
/// freely.
#[derive(Clone, Debug)]
pub struct Dispatcher<V> {
    graph: DiGraph<Node<V>, Option<f64>>,
    default_values: IndexMap<NodeId, Value<V>>,
    name: String,
    raises: bool,
}

impl<V> Dispatcher<V> {
    /// An empty dispatcher.
    pub fn new(name: impl Into<String>) -> Self {
        Dispatcher {
            graph: DiGraph::new(),
            default_values: IndexMap::new(),
            name: name.into(),
            raises: false,
        }
    }

    /// Promotes every soft estimation failure to a hard error.
    pub fn raises(mut self, raises: bool) -> Self {
        self.raises = raises;
        self
    }

    /// The dispatcher's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying graph.
    pub fn graph(&self) -> &DiGraph<Node<V>, Option<f64>> {
        &self.graph
    }

    /// The default values, keyed by data node.
    pub fn default_values(&self) -> &IndexMap<NodeId, Value<V>> {
        &self.default_values
    }

    pub(crate) fn raises_flag(&self) -> bool {
        self.raises
    }

    /// Ids of all data nodes, in insertion order.
    pub fn data_node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.graph
            .nodes()
            .filter(|(_, n)| n.is_data())
            .map(|(id, _)| id)
    }

    /// Ids of all function nodes, in insertion order.
    pub fn function_node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.graph
            .nodes()
            .filter(|(_, n)| n.is_function())
            .map(|(id, _)| id)
    }

    fn unused_data_id(&self) -> NodeId {
        let mut n = 0usize;
        loop {
            let id = NodeId::from(format!("unknown<{n}>"));
            if !self.graph.contains_node(&id) {
                return id;
            }
            n += 1;
        }
    }
}

impl<V: Clone + 'static> Dispatcher<V> {
    /// Adds a single data node, returning the resolved id.
    ///
    /// Re-adding an existing data node replaces its attributes; the id
    /// of an existing function node is rejected.
    pub fn add_data(&mut self, data: Data<V>) -> Result<NodeId, BuildError> {
        let id = match data.id {
            Some(id) => {
                if self.graph.node(&id).map_or(false, Node::is_function) {
                    return Err(Report::new(BuildError::OverridesFunction(id)));
                }
                id
            }
            None => self.unused_data_id(),
        };

        match data.default {
            Some(value) => {
                self.default_values.insert(id.clone(), value);
            }
            None => {
                self.default_values.shift_remove(&id);
            }
        }

        let attr = DataAttr {
            wait_inputs: data.wait_inputs,
            wildcard: data.wildcard,
            function: data.function,
            callback: data.callback,
            weight: data.weight,
            extra: data.extra,
        };
        self.graph.add_node(id.clone(), Node::Data(attr));
        Ok(id)
    }

    /// Adds a single function node, returning the resolved id.
    ///
    /// Referenced data nodes are created on demand; a referenced key
    /// that exists as a function node rejects the call and removes the
    /// half-added node again.
    pub fn add_function(&mut self, func: Func<V>) -> Result<NodeId, BuildError> {
        let inputs = match func.inputs {
            Some(inputs) => inputs,
            None => {
                if !self.graph.contains_node(&NodeId::Start) {
                    self.graph
                        .add_node(NodeId::Start, Node::Data(DataAttr::default()));
                    self.default_values.insert(NodeId::Start, Value::None);
                }
                vec![NodeId::Start]
            }
        };
        let outputs = match func.outputs {
            Some(outputs) => outputs,
            None => {
                if !self.graph.contains_node(&NodeId::Sink) {
                    let attr = DataAttr {
                        wait_inputs: true,
                        ..DataAttr::default()
                    };
                    self.graph.add_node(NodeId::Sink, Node::Data(attr));
                }
                vec![NodeId::Sink]
            }
        };

        let stem = func.id.unwrap_or(func.name_hint);
        let mut fid = NodeId::from(stem.as_str());
        let mut n = 0usize;
        while self.graph.contains_node(&fid) {
            fid = NodeId::from(format!("{stem}<{n}>"));
            n += 1;
        }

        let attr = FunctionAttr {
            inputs: inputs.clone(),
            outputs: outputs.clone(),
            callable: func.callable,
            input_domain: func.input_domain,
            weight: func.weight,
            extra: func.extra,
        };
        self.graph.add_node(fid.clone(), Node::Function(attr));

        for u in &inputs {
            if self.graph.node(u).map_or(false, |n| !n.is_data()) {
                self.graph.remove_node(&fid);
                return Err(Report::new(BuildError::InvalidInput {
                    function: fid,
                    input: u.clone(),
                }));
            }
            if !self.graph.contains_node(u) {
                self.graph.add_node(u.clone(), Node::Data(DataAttr::default()));
            }
            self.graph
                .add_edge(u.clone(), fid.clone(), func.weight_from.get(u).copied());
        }

        for v in &outputs {
            if self.graph.node(v).map_or(false, |n| !n.is_data()) {
                self.graph.remove_node(&fid);
                return Err(Report::new(BuildError::InvalidOutput {
                    function: fid,
                    output: v.clone(),
                }));
            }
            if !self.graph.contains_node(v) {
                self.graph.add_node(v.clone(), Node::Data(DataAttr::default()));
            }
            self.graph
                .add_edge(fid.clone(), v.clone(), func.weight_to.get(v).copied());
        }

        Ok(fid)
    }

    /// Bulk-adds data and function nodes, returning the resolved id
    /// lists.
    pub fn add_from_lists(
        &mut self,
        data_list: Vec<Data<V>>,
        fun_list: Vec<Func<V>>,
    ) -> Result<(Vec<NodeId>, Vec<NodeId>), BuildError> {
        let mut data_ids = Vec::with_capacity(data_list.len());
        for data in data_list {
            data_ids.push(self.add_data(data)?);
        }
        let mut fun_ids = Vec::with_capacity(fun_list.len());
        for func in fun_list {
            fun_ids.push(self.add_function(func)?);
        }
        Ok((data_ids, fun_ids))
    }

    /// Sets (or, with `None`, clears) the default value of a data node.
    pub fn set_default_value(
        &mut self,
        id: impl Into<NodeId>,
        value: Option<V>,
    ) -> Result<(), BuildError> {
        let id = id.into();
        if !self.graph.node(&id).map_or(false, Node::is_data) {
            return Err(Report::new(BuildError::NotADataNode(id)));
        }
        match value {
            Some(v) => {
                self.default_values.insert(id, Value::Val(v));
            }
            None => {
                self.default_values.shift_remove(&id);
            }
        }
        Ok(())
    }

    /// Inlines a child dispatcher as a function node.
    ///
    /// `inputs_map` renames parent data nodes to child inputs,
    /// `outputs_map` renames child outputs back into the parent's
    /// namespace. The child is pre-shrunk to that signature; outputs the
    /// shrunk child cannot reach reject the call.
    pub fn add_dispatcher(
        &mut self,
        child: &Dispatcher<V>,
        dsp_id: Option<&str>,
        inputs_map: &IndexMap<NodeId, NodeId>,
        outputs_map: &IndexMap<NodeId, NodeId>,
        cutoff: Option<f64>,
    ) -> Result<NodeId, BuildError>
    where
        V: Send + Sync,
    {
        let name = dsp_id.unwrap_or_else(|| child.name()).to_owned();
        let child_inputs: Vec<NodeId> = inputs_map.values().cloned().collect();
        let child_outputs: Vec<NodeId> = outputs_map.keys().cloned().collect();
        let sub = SubDispatchFunction::new(child, name.as_str(), &child_inputs, &child_outputs, cutoff)
            .map_err(|err| err.change_context(BuildError::SubDispatcher(name.clone())))?;
        let func = sub
            .into_func()
            .id(name)
            .inputs(inputs_map.keys().cloned())
            .outputs(outputs_map.values().cloned());
        self.add_function(func)
    }

    /// The sub-dispatcher induced by `nodes_bunch`, minus `edges_bunch`.
    ///
    /// Function nodes whose declared inputs are not wholly inside the
    /// bunch are dropped, then functions left without outgoing edges,
    /// then isolated nodes. The relevant slice of the default values is
    /// carried over.
    pub fn get_sub_dsp(
        &self,
        nodes_bunch: &[NodeId],
        edges_bunch: &[(NodeId, NodeId)],
    ) -> Dispatcher<V> {
        let keys: IndexSet<NodeId> = nodes_bunch.iter().cloned().collect();
        let mut sub = Dispatcher {
            graph: self.graph.subgraph(&keys),
            default_values: IndexMap::new(),
            name: self.name.clone(),
            raises: self.raises,
        };

        for id in nodes_bunch {
            let incomplete = sub
                .graph
                .node(id)
                .and_then(Node::as_function)
                .map_or(false, |attr| {
                    !attr.inputs.iter().all(|i| keys.contains(i))
                });
            if incomplete {
                sub.graph.remove_node(id);
            }
        }

        for (u, v) in edges_bunch {
            sub.graph.remove_edge(u, v);
        }

        let childless: Vec<NodeId> = sub
            .graph
            .nodes()
            .filter(|(id, n)| n.is_function() && sub.graph.out_degree(id) == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &childless {
            sub.graph.remove_node(id);
        }

        for id in sub.graph.isolates() {
            sub.graph.remove_node(&id);
        }

        sub.default_values = self
            .default_values
            .iter()
            .filter(|(k, _)| sub.graph.contains_node(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        sub
    }

    /// The sub-dispatcher reachable from `sources` by breadth-first
    /// search on `graph` (typically a workflow).
    ///
    /// Forward walks admit a function only once every declared input has
    /// been admitted, which captures the full dependency closure; with
    /// `reverse` the walk follows predecessors and the completeness
    /// check is off.
    pub fn get_sub_dsp_from_workflow<N, E>(
        &self,
        sources: &[NodeId],
        graph: &DiGraph<N, E>,
        reverse: bool,
    ) -> Dispatcher<V> {
        let mut sub = Dispatcher {
            graph: DiGraph::new(),
            default_values: IndexMap::new(),
            name: self.name.clone(),
            raises: self.raises,
        };
        let mut family: IndexSet<NodeId> = IndexSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for s in sources {
            if self.graph.contains_node(s) && graph.contains_node(s) && !family.contains(s) {
                self.admit(&mut sub, &mut family, &mut queue, s);
            }
        }

        while let Some(parent) = queue.pop_front() {
            let children: Vec<NodeId> = if reverse {
                graph.predecessors(&parent).cloned().collect()
            } else {
                graph.successors(&parent).cloned().collect()
            };

            for child in children {
                if child == NodeId::Start || !self.graph.contains_node(&child) {
                    continue;
                }

                if !reverse {
                    if let Some(attr) =
                        self.graph.node(&child).and_then(Node::as_function)
                    {
                        if !family.contains(&child)
                            && attr.inputs.iter().all(|i| family.contains(i))
                        {
                            let wires: Vec<NodeId> = attr.inputs.clone();
                            self.admit(&mut sub, &mut family, &mut queue, &child);
                            for i in wires {
                                let e = self.graph.edge(&i, &child).copied().unwrap_or(None);
                                sub.graph.add_edge(i, child.clone(), e);
                            }
                        }
                        continue;
                    }
                }

                if !family.contains(&child) {
                    self.admit(&mut sub, &mut family, &mut queue, &child);
                }
                let (u, w) = if reverse {
                    (child, parent.clone())
                } else {
                    (parent.clone(), child)
                };
                let e = self.graph.edge(&u, &w).copied().unwrap_or(None);
                sub.graph.add_edge(u, w, e);
            }
        }

        sub
    }

    fn admit(
        &self,
        sub: &mut Dispatcher<V>,
        family: &mut IndexSet<NodeId>,
        queue: &mut VecDeque<NodeId>,
        id: &NodeId,
    ) {
        if let Some(node) = self.graph.node(id) {
            sub.graph.add_node(id.clone(), node.clone());
            if let Some(dv) = self.default_values.get(id) {
                sub.default_values.insert(id.clone(), dv.clone());
            }
            family.insert(id.clone());
            queue.push_back(id.clone());
        }
    }

    /// The sub-dispatcher that would actually fire for the given inputs
    /// and outputs, computed as the fixed point of a no-call dispatch.
    ///
    /// Without inputs the dispatcher map itself is walked backwards from
    /// the outputs; without outputs either, the result is empty.
    pub fn shrink_dsp(
        &self,
        inputs: Option<&[NodeId]>,
        outputs: Option<&[NodeId]>,
        cutoff: Option<f64>,
    ) -> Result<Dispatcher<V>, DispatchError> {
        let inputs = inputs.filter(|keys| !keys.is_empty());
        let outputs = outputs.filter(|keys| !keys.is_empty());

        let Some(input_keys) = inputs else {
            return Ok(match outputs {
                Some(outs) => self.get_sub_dsp_from_workflow(outs, &self.graph, true),
                None => Dispatcher::new(self.name.clone()).raises(self.raises),
            });
        };

        let mut current: IndexSet<NodeId> = input_keys.iter().cloned().collect();
        let mut edges: IndexSet<(NodeId, NodeId)> = IndexSet::new();
        let mut fallback_outputs: Vec<NodeId> = Vec::new();

        // Each round either discovers a data node the walk stalled on or
        // reaches the fixed point, so the data-node count bounds it.
        let rounds = self.data_node_ids().count() + 1;
        for _ in 0..rounds {
            let overrides: IndexMap<NodeId, bool> =
                current.iter().map(|k| (k.clone(), false)).collect();
            let mut initial: IndexMap<NodeId, Value<V>> = self
                .default_values
                .keys()
                .map(|k| (k.clone(), Value::None))
                .collect();
            for k in &current {
                initial.insert(k.clone(), Value::None);
            }
            let wildcards = self.compute_wildcards(initial.keys(), outputs);
            let sol = run(self, initial, outputs, cutoff, wildcards, overrides, true)?;

            for (u, v, _) in sol.workflow.edges() {
                edges.insert((u.clone(), v.clone()));
            }
            if outputs.is_none() {
                fallback_outputs = sol.data_output.keys().cloned().collect();
            }

            let stalled: Vec<NodeId> = sol
                .workflow
                .node_ids()
                .filter(|n| {
                    !sol.visited.contains(*n)
                        && self.graph.node(n).map_or(false, Node::is_data)
                })
                .cloned()
                .collect();
            if stalled.is_empty() {
                break;
            }
            current.extend(stalled);
        }

        let mut bfs: DiGraph<(), ()> = DiGraph::new();
        for (u, v) in &edges {
            if !bfs.contains_node(u) {
                bfs.add_node(u.clone(), ());
            }
            if !bfs.contains_node(v) {
                bfs.add_node(v.clone(), ());
            }
            bfs.add_edge(u.clone(), v.clone(), ());
        }

        let outs: Vec<NodeId> = match outputs {
            Some(outs) => outs.to_vec(),
            None => fallback_outputs,
        };
        if outs.is_empty() {
            return Ok(Dispatcher::new(self.name.clone()).raises(self.raises));
        }
        Ok(self.get_sub_dsp_from_workflow(&outs, &bfs, true))
    }

    /// A new dispatcher over the nodes reachable from `sources`, with
    /// every cycle-closing edge removed.
    ///
    /// The walk is depth-first in graph insertion order; whenever an
    /// edge leads back onto the active path, that edge is deleted. The
    /// choice is deterministic for every cycle shape, including cycles
    /// made only of waiting data nodes.
    pub fn remove_cycles(&self, sources: &[NodeId]) -> Dispatcher<V> {
        let mut reached: IndexSet<NodeId> = IndexSet::new();
        let mut on_path: IndexSet<NodeId> = IndexSet::new();
        let mut removed: Vec<(NodeId, NodeId)> = Vec::new();
        let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

        for s in sources {
            if !self.graph.contains_node(s) || reached.contains(s) {
                continue;
            }
            reached.insert(s.clone());
            on_path.insert(s.clone());
            stack.push((s.clone(), self.graph.successors(s).cloned().collect(), 0));

            while !stack.is_empty() {
                let (u, next) = {
                    let frame = stack.last_mut().expect("stack is non-empty");
                    if frame.2 < frame.1.len() {
                        let w = frame.1[frame.2].clone();
                        frame.2 += 1;
                        (frame.0.clone(), Some(w))
                    } else {
                        (frame.0.clone(), None)
                    }
                };
                match next {
                    Some(w) => {
                        if on_path.contains(&w) {
                            removed.push((u, w));
                        } else if !reached.contains(&w) {
                            reached.insert(w.clone());
                            on_path.insert(w.clone());
                            let succ = self.graph.successors(&w).cloned().collect();
                            stack.push((w, succ, 0));
                        }
                    }
                    None => {
                        on_path.shift_remove(&u);
                        stack.pop();
                    }
                }
            }
        }

        let nodes: Vec<NodeId> = reached.into_iter().collect();
        self.get_sub_dsp(&nodes, &removed)
    }

    /// Dispatches with plain inputs and optional output targets.
    pub fn dispatch<I, K>(
        &self,
        inputs: I,
        outputs: Option<&[NodeId]>,
    ) -> Result<Solution<V>, DispatchError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<NodeId>,
    {
        let mut args = DispatchArgs::new().inputs(inputs);
        if let Some(outs) = outputs {
            args = args.outputs(outs.iter().cloned());
        }
        self.dispatch_with(args)
    }

    /// Dispatches with full control over cutoff, wildcards, no-call mode
    /// and pre-shrinking; see [`DispatchArgs`].
    pub fn dispatch_with(&self, args: DispatchArgs<V>) -> Result<Solution<V>, DispatchError> {
        if args.shrink && !args.no_call {
            let keys: Vec<NodeId> = args.inputs.keys().cloned().collect();
            let shrunk = self.shrink_dsp(Some(&keys), args.outputs.as_deref(), args.cutoff)?;
            let args = DispatchArgs {
                shrink: false,
                ..args
            };
            return shrunk.dispatch_with(args);
        }

        let mut initial: IndexMap<NodeId, Value<V>> = if args.no_call {
            self.default_values
                .keys()
                .map(|k| (k.clone(), Value::None))
                .collect()
        } else {
            self.default_values.clone()
        };
        for (k, v) in &args.inputs {
            let value = if args.no_call { Value::None } else { v.clone() };
            initial.insert(k.clone(), value);
        }

        let wildcards = if args.wildcard {
            self.compute_wildcards(initial.keys(), args.outputs.as_deref())
        } else {
            IndexSet::new()
        };

        let mut sol = run(
            self,
            initial.clone(),
            args.outputs.as_deref(),
            args.cutoff,
            wildcards,
            IndexMap::new(),
            args.no_call,
        )?;

        // Input keys outside the dispatcher pass through untouched.
        for (k, v) in initial {
            if !self.graph.contains_node(&k) {
                sol.data_output.insert(k, v);
            }
        }
        Ok(sol)
    }

    /// The wildcard set: input keys that are also outputs and did not
    /// opt out.
    pub(crate) fn compute_wildcards<'k>(
        &self,
        keys: impl Iterator<Item = &'k NodeId>,
        outputs: Option<&[NodeId]>,
    ) -> IndexSet<NodeId> {
        let mut wildcards = IndexSet::new();
        let Some(outputs) = outputs else {
            return wildcards;
        };
        if outputs.is_empty() {
            return wildcards;
        }
        for k in keys {
            if !outputs.contains(k) {
                continue;
            }
            if let Some(Node::Data(attr)) = self.graph.node(k) {
                if attr.wildcard != Some(false) {
                    wildcards.insert(k.clone());
                }
            }
        }
        wildcards
    }
}
