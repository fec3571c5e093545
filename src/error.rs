//! Error contexts for construction, dispatch, and user callables.

use core::fmt::{self, Display, Formatter};

use error_stack::Context;

use crate::node::NodeId;

/// A graph-construction error. These are always hard: the builders leave
/// the dispatcher unchanged (or restore it) when they fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `add_data` would override an existing function node.
    OverridesFunction(NodeId),
    /// The target of `set_default_value` is not a data node.
    NotADataNode(NodeId),
    /// A function declared an input that exists as a function node.
    InvalidInput {
        /// The function being added.
        function: NodeId,
        /// The offending input key.
        input: NodeId,
    },
    /// A function declared an output that exists as a function node.
    InvalidOutput {
        /// The function being added.
        function: NodeId,
        /// The offending output key.
        output: NodeId,
    },
    /// A child dispatcher could not be inlined as a function node.
    SubDispatcher(String),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverridesFunction(id) => {
                write!(f, "invalid data id: {id} overrides a function node")
            }
            Self::NotADataNode(id) => write!(f, "input error: {id} is not a data node"),
            Self::InvalidInput { function, input } => {
                write!(f, "invalid input id for {function}: {input} is not a data node")
            }
            Self::InvalidOutput { function, output } => {
                write!(f, "invalid output id for {function}: {output} is not a data node")
            }
            Self::SubDispatcher(name) => {
                write!(f, "cannot inline sub-dispatcher {name}")
            }
        }
    }
}

impl Context for BuildError {}

/// A hard dispatch error. Soft failures (a function raising, a rejected
/// domain, a wrong arity) are logged and skipped instead, unless the
/// dispatcher was built with `raises`, which promotes them to
/// [`DispatchError::NodeError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A relaxation reached an already-settled node with a strictly
    /// smaller distance.
    ContradictoryPaths,
    /// A node failed to estimate and the dispatcher raises on failure.
    NodeError(NodeId),
    /// Declared output targets cannot be reached.
    UnreachableOutputs(Vec<NodeId>),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContradictoryPaths => {
                f.write_str("contradictory paths found: negative weights?")
            }
            Self::NodeError(id) => write!(f, "estimation error at node ({id})"),
            Self::UnreachableOutputs(targets) => {
                write!(f, "unreachable output-targets: {{")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Context for DispatchError {}

/// The context for failures raised by user-supplied callables (function
/// nodes, aggregators, callbacks). Attach the actual cause with
/// `Report::new(CallError).attach_printable(..)` or by changing context
/// from a richer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallError;

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("callable failed")
    }
}

impl Context for CallError {}
