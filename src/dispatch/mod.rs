//! The dispatch engine: arguments, results, and the traversal itself.

mod fringe;
pub(crate) mod run;

use indexmap::{IndexMap, IndexSet};

use crate::{
    graph::DiGraph,
    node::NodeId,
    value::Value,
};

/// Payload of a workflow node.
#[derive(Clone)]
pub enum WfNode<V> {
    /// The virtual source.
    Start,
    /// An ordinary node.
    Plain,
    /// A function node backed by a nested dispatcher, carrying the
    /// nested solution for introspection.
    Sub(Box<Solution<V>>),
}

impl<V> core::fmt::Debug for WfNode<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WfNode::Start => f.write_str("Start"),
            WfNode::Plain => f.write_str("Plain"),
            WfNode::Sub(_) => f.write_str("Sub(..)"),
        }
    }
}

/// The DAG of edges that actually carried a value during one dispatch.
/// Edge payloads are the carried values; they are absent in no-call mode.
pub type Workflow<V> = DiGraph<WfNode<V>, Option<Value<V>>>;

/// The result of one dispatch: the workflow, the estimated values, and
/// the distance of every settled node from the virtual start.
#[derive(Clone, Debug)]
pub struct Solution<V> {
    /// The edges that fired, as a DAG rooted at `NodeId::Start`.
    pub workflow: Workflow<V>,
    /// Every estimated data node, plus passthrough input keys that were
    /// not dispatcher nodes. In no-call mode all entries are
    /// `Value::None`.
    pub data_output: IndexMap<NodeId, Value<V>>,
    /// Cumulative cost from the virtual start, per settled node.
    pub dist: IndexMap<NodeId, f64>,
    pub(crate) visited: IndexSet<NodeId>,
}

impl<V> Solution<V> {
    /// The estimated value of a data node, if it carries one.
    pub fn value(&self, id: &NodeId) -> Option<&V> {
        self.data_output.get(id).and_then(Value::val)
    }
}

/// Arguments of [`Dispatcher::dispatch_with`](crate::Dispatcher::dispatch_with).
///
/// ```
/// use flowgraph::DispatchArgs;
///
/// let args = DispatchArgs::new()
///     .input("a", 3.0)
///     .outputs(["c"])
///     .cutoff(10.0);
/// # let _: DispatchArgs<f64> = args;
/// ```
#[derive(Clone, Debug)]
pub struct DispatchArgs<V> {
    pub(crate) inputs: IndexMap<NodeId, Value<V>>,
    pub(crate) outputs: Option<Vec<NodeId>>,
    pub(crate) cutoff: Option<f64>,
    pub(crate) wildcard: bool,
    pub(crate) no_call: bool,
    pub(crate) shrink: bool,
}

impl<V> Default for DispatchArgs<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DispatchArgs<V> {
    /// No inputs, no outputs: dispatching with these arguments runs from
    /// the default values alone.
    pub fn new() -> Self {
        DispatchArgs {
            inputs: IndexMap::new(),
            outputs: None,
            cutoff: None,
            wildcard: false,
            no_call: false,
            shrink: false,
        }
    }

    /// Adds one input value.
    pub fn input(mut self, id: impl Into<NodeId>, value: V) -> Self {
        self.inputs.insert(id.into(), Value::Val(value));
        self
    }

    /// Adds several input values.
    pub fn inputs<I, K>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<NodeId>,
    {
        for (k, v) in inputs {
            self.inputs.insert(k.into(), Value::Val(v));
        }
        self
    }

    /// Adds input keys without values; mostly useful with
    /// [`no_call`](Self::no_call).
    pub fn input_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<NodeId>,
    {
        for k in keys {
            self.inputs.insert(k.into(), Value::None);
        }
        self
    }

    /// Sets the ending data nodes; the traversal stops once all of them
    /// are settled.
    pub fn outputs<I, K>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<NodeId>,
    {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Discards any relaxation whose cumulative distance exceeds `cutoff`.
    pub fn cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    /// Enables wildcards: an input key that is also an output feeds its
    /// successors but is only recorded once re-estimated by a function.
    pub fn wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = wildcard;
        self
    }

    /// Builds the workflow without invoking any user callable; every
    /// estimation becomes `Value::None`.
    pub fn no_call(mut self, no_call: bool) -> Self {
        self.no_call = no_call;
        self
    }

    /// Shrinks the dispatcher to the inputs/outputs before dispatching.
    pub fn shrink(mut self, shrink: bool) -> Self {
        self.shrink = shrink;
        self
    }
}
