//! Node identifiers and node attribute records.

use core::fmt;
use std::sync::Arc;

use error_stack::Report;
use indexmap::IndexMap;

use crate::{dispatch::Solution, error::CallError, value::Value};

/// Identifier of a node in a dispatcher graph.
///
/// `Start` and `Sink` are the virtual endpoints of every dispatch: `Start`
/// is the source every provided input flows from, `Sink` absorbs outputs
/// the client declared no destination for. They are enum variants rather
/// than reserved strings, so they can never collide with user keys.
///
/// The derived `Ord` (`Start < Sink < Key`, keys lexicographic) is what
/// makes fringe tie-breaking deterministic.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    /// Virtual source of all inputs.
    Start,
    /// Virtual destination absorbing unrequested outputs.
    Sink,
    /// A user key.
    Key(Arc<str>),
}

impl NodeId {
    /// The key as a string slice; the virtual endpoints render as
    /// `"start"` and `"sink"`.
    pub fn as_str(&self) -> &str {
        match self {
            NodeId::Start => "start",
            NodeId::Sink => "sink",
            NodeId::Key(s) => s,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId::Key(Arc::from(s))
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::Key(Arc::from(s.as_str()))
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

/// Result type for user-supplied callables.
pub type CallResult<T> = Result<T, Report<CallError>>;

/// A function-node callable: positional arguments in the declared input
/// order (valueless estimations filtered out), one returned value per
/// declared output.
pub type NodeFunction<V> = Arc<dyn Fn(&[V]) -> CallResult<Vec<V>> + Send + Sync>;

/// A data-node aggregator: merges the estimations reported by the node's
/// predecessors (keyed by predecessor id, `Start` included when a default
/// or input seeded the node) into the node's single value.
pub type DataFunction<V> =
    Arc<dyn Fn(&IndexMap<NodeId, Value<V>>) -> CallResult<Value<V>> + Send + Sync>;

/// A data-node callback, invoked right after the node is estimated.
/// Failures are logged and never abort the dispatch.
pub type Callback<V> = Arc<dyn Fn(&V) -> CallResult<()> + Send + Sync>;

/// A function-node input domain: decides whether the gathered arguments
/// are admissible. Rejection is not an error; the engine backtracks and
/// tries alternative paths.
pub type InputDomain<V> = Arc<dyn Fn(&[V]) -> bool + Send + Sync>;

/// A type-erased sub-dispatch call: returns the shaped outputs together
/// with the nested solution, which the engine attaches to the workflow
/// node for introspection.
pub type SubCall<V> =
    Arc<dyn Fn(&[V]) -> Result<(Vec<V>, Box<Solution<V>>), Report<CallError>> + Send + Sync>;

/// The payload of a function node.
#[derive(Clone)]
pub enum Callable<V> {
    /// A plain callable.
    Function(NodeFunction<V>),
    /// A nested dispatcher exposed as a callable; the engine records its
    /// trace on the workflow node.
    Sub(SubCall<V>),
}

/// Attributes of a data node.
#[derive(Clone)]
pub struct DataAttr<V> {
    /// Defer estimation until every predecessor has settled.
    pub wait_inputs: bool,
    /// Wildcard opt-out / opt-in; `None` leaves the node eligible.
    pub wildcard: Option<bool>,
    /// Aggregator merging multiple estimations into one value.
    pub function: Option<DataFunction<V>>,
    /// Invoked after estimation.
    pub callback: Option<Callback<V>>,
    /// Node weight added to the length of every incoming edge.
    pub weight: Option<f64>,
    /// User metadata; never read by the engine.
    pub extra: IndexMap<String, String>,
}

impl<V> Default for DataAttr<V> {
    fn default() -> Self {
        DataAttr {
            wait_inputs: false,
            wildcard: None,
            function: None,
            callback: None,
            weight: None,
            extra: IndexMap::new(),
        }
    }
}

/// Attributes of a function node.
#[derive(Clone)]
pub struct FunctionAttr<V> {
    /// Data nodes read as positional arguments, in order.
    pub inputs: Vec<NodeId>,
    /// Data nodes the returned values are distributed to, in order.
    pub outputs: Vec<NodeId>,
    /// The computation.
    pub callable: Callable<V>,
    /// Admissibility predicate over the gathered arguments.
    pub input_domain: Option<InputDomain<V>>,
    /// Node weight added to the length of every incoming edge.
    pub weight: Option<f64>,
    /// User metadata; never read by the engine.
    pub extra: IndexMap<String, String>,
}

/// A node of the dispatcher graph: either a named value or a computation.
#[derive(Clone)]
pub enum Node<V> {
    /// A data node.
    Data(DataAttr<V>),
    /// A function node.
    Function(FunctionAttr<V>),
}

impl<V> Node<V> {
    /// Returns `true` for data nodes.
    pub fn is_data(&self) -> bool {
        matches!(self, Node::Data(_))
    }

    /// Returns `true` for function nodes.
    pub fn is_function(&self) -> bool {
        matches!(self, Node::Function(_))
    }

    /// The data attributes, if this is a data node.
    pub fn as_data(&self) -> Option<&DataAttr<V>> {
        match self {
            Node::Data(attr) => Some(attr),
            Node::Function(_) => None,
        }
    }

    /// The function attributes, if this is a function node.
    pub fn as_function(&self) -> Option<&FunctionAttr<V>> {
        match self {
            Node::Function(attr) => Some(attr),
            Node::Data(_) => None,
        }
    }

    /// The declared wait-inputs flag; function nodes always wait.
    pub fn wait_inputs(&self) -> bool {
        match self {
            Node::Data(attr) => attr.wait_inputs,
            Node::Function(_) => true,
        }
    }

    /// The node weight contribution to incoming edge lengths.
    pub fn weight(&self) -> f64 {
        match self {
            Node::Data(attr) => attr.weight.unwrap_or(0.0),
            Node::Function(attr) => attr.weight.unwrap_or(0.0),
        }
    }
}

impl<V> fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Data(attr) => f
                .debug_struct("Data")
                .field("wait_inputs", &attr.wait_inputs)
                .field("wildcard", &attr.wildcard)
                .field("function", &attr.function.is_some())
                .field("callback", &attr.callback.is_some())
                .field("weight", &attr.weight)
                .finish(),
            Node::Function(attr) => f
                .debug_struct("Function")
                .field("inputs", &attr.inputs)
                .field("outputs", &attr.outputs)
                .field("input_domain", &attr.input_domain.is_some())
                .field("weight", &attr.weight)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NodeId;

    #[test]
    fn sentinel_ids_never_collide_with_keys() {
        assert_ne!(NodeId::Start, NodeId::from("start"));
        assert_ne!(NodeId::Sink, NodeId::from("sink"));
        assert_eq!(NodeId::from("a"), NodeId::from("a"));
    }

    #[test]
    fn ordering_is_total_and_stable() {
        let mut ids = vec![
            NodeId::from("b"),
            NodeId::Sink,
            NodeId::from("a"),
            NodeId::Start,
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![NodeId::Start, NodeId::Sink, NodeId::from("a"), NodeId::from("b")]
        );
    }
}
